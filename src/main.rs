//! solisp CLI: run a script file or start the REPL.

use std::env;
use std::fs;
use std::process;

use solisp::error::SolispError;
use solisp::{repl, run, Engine};

fn print_usage() {
    eprintln!("Usage: solisp [options] [script]");
    eprintln!();
    eprintln!("With no script, starts an interactive REPL.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --engine=<vm|eval>  Select the execution engine (default: vm)");
    eprintln!("  --help, -h          Show this help message");
}

struct Options {
    engine: Engine,
    file: Option<String>,
}

fn parse_args() -> Options {
    let mut options = Options {
        engine: Engine::Vm,
        file: None,
    };

    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--engine" => {
                let Some(value) = args.next() else {
                    eprintln!("--engine requires a value");
                    print_usage();
                    process::exit(64);
                };
                options.engine = parse_engine(&value);
            }
            _ if arg.starts_with("--engine=") => {
                options.engine = parse_engine(&arg["--engine=".len()..]);
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                print_usage();
                process::exit(64);
            }
            _ => {
                if options.file.is_some() {
                    eprintln!("expected only 1 filename");
                    print_usage();
                    process::exit(64);
                }
                options.file = Some(arg);
            }
        }
    }

    options
}

fn parse_engine(value: &str) -> Engine {
    match value {
        "vm" => Engine::Vm,
        "eval" => Engine::Eval,
        other => {
            eprintln!("Unknown engine '{}': enter 'vm' or 'eval'", other);
            process::exit(64);
        }
    }
}

fn main() {
    let options = parse_args();

    let Some(file) = options.file else {
        repl::start(options.engine);
        return;
    };

    let source = match fs::read_to_string(&file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("could not read {}: {}", file, err);
            process::exit(66);
        }
    };

    match run(&source, options.engine) {
        Ok(result) => println!("{}", result),
        Err(err @ SolispError::Runtime(_)) => {
            eprintln!("{}", err);
            process::exit(70);
        }
        Err(err) => {
            eprintln!("{}", err);
            process::exit(65);
        }
    }
}
