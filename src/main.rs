mod bytecode;
mod frontend;
mod lang;
mod runtime;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info, warn};

use crate::bytecode::disasm::disassemble_user_words;
use crate::bytecode::image;
use crate::frontend::interpreter::{Interpreter, ReplConfig};
use crate::lang::dictionary::Dictionary;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm::{Vm, VmConfig};

const ENV_FILTER: &str = "WEAKFORTH_LOG";

/// A tiny dictionary-threaded Forth. Reads words from stdin.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Do not print `> ` / `...> ` prompts.
    #[clap(short, long)]
    quiet: bool,

    /// Deepest allowed nesting of compiled word calls.
    #[clap(long, value_name = "N")]
    max_call_depth: Option<usize>,

    /// Stop with an error after this many instructions.
    #[clap(long, value_name = "N")]
    max_steps: Option<usize>,

    /// Start from a dictionary image written by `--save-image`.
    #[clap(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Write the dictionary to PATH once input is exhausted or `exit` runs.
    #[clap(long, value_name = "PATH")]
    save_image: Option<PathBuf>,

    /// Print the disassembly of every user-defined word on exit.
    #[clap(long)]
    dump: bool,
}

fn setup_tracing() {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_env(ENV_FILTER)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .init();
}

fn main() {
    let args = Args::parse();
    setup_tracing();

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), RuntimeError> {
    let config = VmConfig {
        max_call_depth: args.max_call_depth,
        max_steps: args.max_steps,
    };

    let dictionary = match &args.image {
        Some(path) => {
            let bytes = fs::read(path)?;
            let dict = image::decode(&bytes)?;
            info!(path = %path.display(), words = dict.len(), "loaded dictionary image");
            dict
        }
        None => Dictionary::bootstrap(),
    };

    let vm = Vm::with_dictionary(dictionary, config);
    let repl = ReplConfig {
        prompts: !args.quiet,
    };

    let stdin = io::stdin();
    let mut interpreter = Interpreter::with_config(vm, stdin.lock(), io::stdout(), repl);
    interpreter.run()?;

    if let Some(id) = interpreter.compiling() {
        warn!(
            word = interpreter.vm().dictionary().name_of(id),
            "input ended inside a definition"
        );
    }
    debug!(
        stack = ?interpreter.vm().stack(),
        return_depth = interpreter.vm().return_depth(),
        "interpreter stopped"
    );
    let (vm, mut out) = interpreter.into_parts();

    if let Some(path) = &args.save_image {
        let bytes = image::encode(vm.dictionary())?;
        fs::write(path, bytes)?;
        info!(path = %path.display(), "saved dictionary image");
    }

    if args.dump {
        writeln!(out)?;
        write!(out, "{}", disassemble_user_words(vm.dictionary()))?;
    }
    out.flush()?;

    Ok(())
}
