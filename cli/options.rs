use anyhow::Error;
use clap::{Arg, ArgMatches};
use std::path::PathBuf;
use std::str::FromStr;
use target_lexicon::Triple;
use waotc::{CodegenOutput, HeapSettings, OptLevel};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorStyle {
    Human,
    Json,
}

impl Default for ErrorStyle {
    fn default() -> Self {
        ErrorStyle::Human
    }
}

fn parse_humansized(desc: &str) -> Result<u64, Error> {
    use human_size::{Byte, ParsingError, Size, SpecificSize};
    match desc.parse::<Size>() {
        Ok(s) => {
            let bytes: SpecificSize<Byte> = s.into();
            Ok(bytes.value() as u64)
        }
        Err(ParsingError::MissingMultiple) => Ok(desc.parse::<u64>()?),
        Err(e) => Err(e)?,
    }
}

fn humansized(bytes: u64) -> String {
    use human_size::{Byte, Mebibyte, SpecificSize};
    let bytes = SpecificSize::new(bytes as f64, Byte).expect("bytes");
    let mb: SpecificSize<Mebibyte> = bytes.into();
    mb.to_string()
}

#[derive(Debug)]
pub struct Options {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target: Triple,
    pub format: CodegenOutput,
    pub no_sandbox_mode: bool,
    pub heap_settings: HeapSettings,
    pub opt_level: OptLevel,
    pub disable_simd: bool,
    pub disable_llvm_lto: bool,
    pub aux_stack_check: bool,
    pub error_style: ErrorStyle,
}

impl Options {
    pub fn from_args(m: &ArgMatches<'_>) -> Result<Self, Error> {
        let input = PathBuf::from(
            m.value_of("input")
                .ok_or_else(|| anyhow::anyhow!("must provide an input file"))?,
        );
        let output = PathBuf::from(m.value_of("output").unwrap_or("a.out"));

        let target = match m.value_of("target") {
            None => Triple::host(),
            Some(t) => Triple::from_str(t).map_err(|e| anyhow::anyhow!("invalid target triple: {}", e))?,
        };

        let format = match m.value_of("format") {
            None | Some("object") => CodegenOutput::Object,
            Some("llvmir-unopt") | Some("llvmir-opt") => CodegenOutput::LlvmIr,
            Some("bitcode") => CodegenOutput::LlvmBitcode,
            Some(other) => return Err(anyhow::anyhow!("unknown value for --format: {}", other)),
        };

        let no_sandbox_mode = m.is_present("no_sandbox_mode");
        let disable_simd = m.is_present("disable_simd");
        let disable_llvm_lto = m.is_present("disable_llvm_lto");
        let aux_stack_check = m.is_present("enable_aux_stack_check");

        let mut heap_settings = HeapSettings::default();
        if let Some(s) = m.value_of("heap_size") {
            let size = parse_humansized(s)?;
            heap_settings.min_reserved_size = size;
            heap_settings.max_reserved_size = size.max(heap_settings.max_reserved_size);
        }

        let opt_level = match m.value_of("opt_level") {
            None => OptLevel::default(),
            Some("0") | Some("none") => OptLevel::None,
            Some("1") | Some("speed") => OptLevel::Speed,
            Some("2") | Some("speed_and_size") => OptLevel::SpeedAndSize,
            Some(other) => return Err(anyhow::anyhow!("unknown value for --opt-level: {}", other)),
        };

        let error_style = match m.value_of("error_style") {
            None => ErrorStyle::default(),
            Some("human") => ErrorStyle::Human,
            Some("json") => ErrorStyle::Json,
            Some(other) => return Err(anyhow::anyhow!("unknown value for --error-style: {}", other)),
        };

        Ok(Options {
            input,
            output,
            target,
            format,
            no_sandbox_mode,
            heap_settings,
            opt_level,
            disable_simd,
            disable_llvm_lto,
            aux_stack_check,
            error_style,
        })
    }

    pub fn get() -> Result<Self, Error> {
        let m = app_from_crate!()
            .arg(Arg::with_name("input").required(true).help("input wasm file"))
            .arg(
                Arg::with_name("output")
                    .short("o")
                    .long("output")
                    .takes_value(true)
                    .help("output destination, defaults to a.out if unspecified"),
            )
            .arg(
                Arg::with_name("target")
                    .long("target")
                    .takes_value(true)
                    .help(format!("target triple to compile for (default: {})", Triple::host()).as_str()),
            )
            .arg(
                Arg::with_name("target-abi")
                    .long("target-abi")
                    .takes_value(true)
                    .help("ABI variant for the target triple"),
            )
            .arg(
                Arg::with_name("cpu")
                    .long("cpu")
                    .takes_value(true)
                    .help("target CPU model for codegen"),
            )
            .arg(
                Arg::with_name("cpu-features")
                    .long("cpu-features")
                    .takes_value(true)
                    .multiple(true)
                    .use_delimiter(true)
                    .help("enable (+) or disable (-) specific CPU features"),
            )
            .arg(
                Arg::with_name("format")
                    .long("format")
                    .takes_value(true)
                    .possible_values(&["object", "llvmir-unopt", "llvmir-opt", "bitcode"])
                    .help("output format (default: object; object emission is not yet wired to a target machine, use llvmir-unopt/llvmir-opt)"),
            )
            .arg(
                Arg::with_name("opt_level")
                    .long("opt-level")
                    .takes_value(true)
                    .possible_values(&["0", "1", "2", "none", "speed", "speed_and_size"])
                    .help("optimization level (default: speed_and_size)"),
            )
            .arg(
                Arg::with_name("size-level")
                    .long("size-level")
                    .takes_value(true)
                    .help("LLVM size-optimization level (0-2)"),
            )
            .arg(
                Arg::with_name("no_sandbox_mode")
                    .long("no-sandbox-mode")
                    .takes_value(false)
                    .help("emit unchecked memory access and native function pointers instead of a bounds-checked sandbox"),
            )
            .arg(
                Arg::with_name("heap_size")
                    .long("heap-size")
                    .takes_value(true)
                    .help(&format!(
                        "reserved linear memory size. default: {}",
                        humansized(HeapSettings::default().min_reserved_size)
                    )),
            )
            .arg(
                Arg::with_name("disable_simd")
                    .long("disable-simd")
                    .takes_value(false)
                    .help("reject modules using v128 opcodes instead of lowering them"),
            )
            .arg(
                Arg::with_name("disable_llvm_lto")
                    .long("disable-llvm-lto")
                    .takes_value(false)
                    .help("disable LLVM link-time optimization for this module"),
            )
            .arg(
                Arg::with_name("enable_aux_stack_check")
                    .long("enable-aux-stack-check")
                    .takes_value(false)
                    .help("trap instead of corrupting the heap when the auxiliary stack (__stack_pointer) underflows __heap_base"),
            )
            .arg(
                Arg::with_name("error_style")
                    .long("error-style")
                    .takes_value(true)
                    .possible_values(&["human", "json"])
                    .help("style of error reporting (default: human)"),
            )
            .get_matches();

        Self::from_args(&m)
    }
}
