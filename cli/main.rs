#[macro_use]
extern crate clap;

mod options;

use options::{ErrorStyle, Options};
use serde::Serialize;
use std::process;
use waotc::{Error, Waotc};

#[derive(Serialize)]
struct SerializedWaotcError {
    message: String,
}

fn main() {
    env_logger::init();

    let opts = match Options::get() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}\n", e);
            process::exit(1);
        }
    };

    let error_style = opts.error_style;
    if let Err(e) = run(&opts) {
        print_error(&e, error_style);
        process::exit(1);
    }
}

fn print_error(e: &Error, style: ErrorStyle) {
    match style {
        ErrorStyle::Human => eprintln!("Error: {}\n", e),
        ErrorStyle::Json => {
            let serialized = SerializedWaotcError { message: e.to_string() };
            match serde_json::to_string(&serialized) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}\n", e),
            }
        }
    }
}

fn run(opts: &Options) -> Result<(), Error> {
    log::debug!("reading wasm input from {}", opts.input.display());
    let wasm = std::fs::read(&opts.input).map_err(Error::from)?;

    let module_name = opts
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("guest")
        .to_owned();

    let waotc = Waotc::new()
        .with_sandboxed(!opts.no_sandbox_mode)
        .with_opt_level(opts.opt_level)
        .with_heap_settings(opts.heap_settings.clone())
        .with_aux_stack_check(opts.aux_stack_check)
        .with_module_name(module_name);

    waotc.compile_file(&wasm, opts.format, &opts.output)
}
