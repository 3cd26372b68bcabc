use inkwell::context::Context;
use waotc::compiler::{self, CompilerOptions, OptLevel};
use waotc::traps::TrapCode;
use waotc::HeapSettings;

fn compile_wat(wat: &str, opts: &CompilerOptions) -> compiler::CompiledModule<'static> {
    let wasm = wat::parse_str(wat).expect("parsing wat");
    let ctx = Box::leak(Box::new(Context::create()));
    compiler::compile(ctx, &wasm, "test", opts).expect("compiling module")
}

fn sandboxed_opts() -> CompilerOptions {
    CompilerOptions {
        sandboxed: true,
        opt_level: OptLevel::None,
        heap_settings: HeapSettings::default(),
        aux_stack_check: false,
    }
}

fn no_sandbox_opts() -> CompilerOptions {
    CompilerOptions {
        sandboxed: false,
        opt_level: OptLevel::None,
        heap_settings: HeapSettings::default(),
        aux_stack_check: false,
    }
}

#[test]
fn add1() {
    let wat = r#"
        (module
            (func (export "add1") (param i32) (result i32)
                local.get 0
                i32.const 1
                i32.add))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("add"));
    assert_eq!(compiled.function_traps.len(), 1);
    assert!(compiled.function_traps[0].1.is_empty());
}

#[test]
fn oob_trap() {
    let wat = r#"
        (module
            (memory 1)
            (func (export "bad_load") (result i32)
                i32.const -1
                i32.load))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("oob_trap"));
    assert!(ir.contains("icmp ugt"));
    let sites = &compiled.function_traps[0].1;
    assert!(sites.iter().any(|s| s.code == TrapCode::OutOfBoundsMemoryAccess));
}

#[test]
fn br_table_dispatch() {
    let wat = r#"
        (module
            (func (export "dispatch") (param i32) (result i32)
                block
                    block
                        block
                            local.get 0
                            br_table 0 1 2
                        end
                        i32.const 10
                        return
                    end
                    i32.const 20
                    return
                end
                i32.const 30))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("switch"));
}

#[test]
fn multi_result_call() {
    let wat = r#"
        (module
            (func $pair (result i32 i64)
                i32.const 1
                i64.const 2)
            (func (export "caller") (result i32)
                call $pair
                drop))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    // the callee takes an extra pointer-typed out-parameter for its second result
    assert!(ir.contains("i64*"));
}

#[test]
fn indirect_call_type_mismatch_emits_check() {
    let wat = r#"
        (module
            (type $i2i (func (result i32)))
            (func $f (result i32) i32.const 0)
            (table funcref (elem $f))
            (func (export "call_it") (result i32)
                i32.const 0
                call_indirect (type $i2i)))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("bad_sig"));
    assert!(ir.contains("table_slot_sig") || ir.contains("slot_sig"));
}

#[test]
fn heap_settings_respected() {
    let wat = r#"(module (memory 2 10))"#;
    let wasm = wat::parse_str(wat).unwrap();
    let ctx = Context::create();
    let mut opts = sandboxed_opts();
    opts.heap_settings.min_reserved_size = 8 * 1024 * 1024;
    let compiled = compiler::compile(&ctx, &wasm, "heapmod", &opts).unwrap();
    let heap = compiled.heap.expect("module declares memory");
    assert_eq!(heap.reserved_size, 8 * 1024 * 1024);
    assert_eq!(heap.initial_size, 2 * 64 * 1024);
    assert_eq!(heap.max_size, Some(10 * 64 * 1024));
}

#[test]
fn no_sandbox_mode_compiles_without_bounds_checks() {
    let wat = r#"
        (module
            (memory 1)
            (func (export "raw_load") (param i32) (result i32)
                local.get 0
                i32.load))
    "#;
    let compiled = compile_wat(wat, &no_sandbox_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(!ir.contains("oob_trap"));
    assert!(compiled.function_traps[0].1.is_empty());
}

#[test]
fn aux_stack_check_emits_overflow_trap() {
    let wat = r#"
        (module
            (global $sp (mut i32) (i32.const 1024))
            (global (export "__heap_base") i32 (i32.const 512))
            (export "__stack_pointer" (global $sp))
            (func (export "push") (param i32)
                local.get 0
                global.set $sp))
    "#;
    let mut opts = sandboxed_opts();
    opts.aux_stack_check = true;
    let compiled = compile_wat(wat, &opts);
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("aux_stack_overflow"));
    let sites = &compiled.function_traps[0].1;
    assert!(sites.iter().any(|s| s.code == TrapCode::StackOverflow));
}

#[test]
fn aux_stack_check_disabled_by_default() {
    let wat = r#"
        (module
            (global $sp (mut i32) (i32.const 1024))
            (global (export "__heap_base") i32 (i32.const 512))
            (export "__stack_pointer" (global $sp))
            (func (export "push") (param i32)
                local.get 0
                global.set $sp))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(!ir.contains("aux_stack_overflow"));
}

#[test]
fn call_to_import_indirects_through_import_func_ptrs_and_checks_null() {
    let wat = r#"
        (module
            (import "env" "host_fn" (func $host_fn (result i32)))
            (func (export "call_host") (result i32)
                call $host_fn))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("import_func_ptrs"));
    assert!(ir.contains("unlinked_import"));
    let sites = &compiled.function_traps[0].1;
    assert!(sites.iter().any(|s| s.code == TrapCode::CallUnlinkedImportFunc));
}

#[test]
fn call_to_import_skips_null_check_in_no_sandbox_mode() {
    let wat = r#"
        (module
            (import "env" "host_fn" (func $host_fn (result i32)))
            (func (export "call_host") (result i32)
                call $host_fn))
    "#;
    let compiled = compile_wat(wat, &no_sandbox_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("import_func_ptrs"));
    assert!(!ir.contains("unlinked_import"));
}

#[test]
fn exported_function_gets_a_wrapper_under_its_export_name() {
    let wat = r#"
        (module
            (func $impl (result i32) i32.const 7)
            (export "get_seven" (func $impl)))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let ir = compiled.llvm_module.print_to_string().to_string();
    assert!(ir.contains("@get_seven"));
    assert!(ir.contains("wrapped_call"));
}

#[test]
fn unreachable_function_compiles_to_trap_block() {
    let wat = r#"
        (module
            (func (export "boom")
                unreachable))
    "#;
    let compiled = compile_wat(wat, &sandboxed_opts());
    let sites = &compiled.function_traps[0].1;
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].code, TrapCode::Unreachable);
}
