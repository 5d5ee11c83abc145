#![forbid(unsafe_code)]
#![allow(unused_parens)]

use std::io;

use structopt::StructOpt;

use crate::cli::Opt;
use crate::machine::Machine;

pub mod term;
pub mod reduction;
pub mod bits;
pub mod machine;
pub mod parser;
pub mod pretty;
pub mod errors;
pub mod cli;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

fn main() {
    let opt = Opt::from_args();

    if opt.debug {
        println!("CLI returned these arguments : {:#?}", opt);
    }

    if opt.files.is_empty() {
        errors::usage_err()
    }

    let bundle = match opt.try_read_files() {
        Ok(bundle) => bundle,
        Err((path, e)) => errors::file_read_err(&path, e)
    };

    let program = match parser::parse_program(&bundle.text, opt.minimal) {
        Ok(program) => program,
        Err(e) => {
            let (file, local) = bundle.locate(e.offset);
            errors::parse_err(file, local, &e.kind, bundle.snippet(e.offset))
        }
    };

    if opt.debug {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = pretty::dump_term(&program, &mut handle);
        let _ = io::Write::write_all(&mut handle, b"\n");
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut machine = Machine::new(stdin.lock(), stdout.lock(), stderr.lock());

    match machine.run(program) {
        Ok(()) => (),
        Err(e) => {
            // the machine has already released the program DAG on its
            // way out; all that is left is to report
            std::mem::drop(machine);
            errors::runtime_err(&e)
        }
    }
}
