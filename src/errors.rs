use std::fmt::Display;
use std::io;
use std::path::Path;

/// The runtime error taxonomy. Every one of these is fatal; the machine
/// returns the first it hits and `main` reports it on stderr with a
/// non-zero exit. There is nothing to retry or recover.
#[derive(Debug)]
pub enum RunErr {
    /// `$err` reached the top level.
    ErrAtTop,
    /// The top level reduced to something that is not an IO action.
    Irreducible,
    /// An IO head with the wrong number of arguments. Carries the atom's
    /// name and the arity it wanted.
    Arity(&'static str, usize),
    /// A `$put`/`$eput` argument reduced to neither boolean sentinel.
    Malformed(&'static str),
    /// A `$put`/`$eput` argument reduced to `$err`.
    ErrInArg(&'static str),
    /// The operating system failed a read or write under us.
    Io(io::Error),
}

pub type RunResult<T> = Result<T, RunErr>;

impl From<io::Error> for RunErr {
    fn from(err : io::Error) -> RunErr {
        RunErr::Io(err)
    }
}

impl Display for RunErr {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RunErr::ErrAtTop => write!(f, "err at top level"),
            RunErr::Irreducible => write!(f, "top level is irreducible"),
            RunErr::Arity(name, 1) => write!(f, "{} expects 1 argument", name),
            RunErr::Arity(name, n) => write!(f, "{} expects {} arguments", name, n),
            RunErr::Malformed(op) => write!(f, "{} argument is malformed", op),
            RunErr::ErrInArg(op) => write!(f, "err in {} argument", op),
            RunErr::Io(err) => write!(f, "program io failed : {}", err),
        }
    }
}

pub fn usage_err() -> ! {
    eprintln!("usage : ramuda <file> [<file> ...]");
    std::process::exit(1)
}

pub fn file_read_err(path : &Path, err : io::Error) -> ! {
    eprintln!("failed to read program file {} : {}", path.display(), err);
    std::process::exit(1)
}

/// Parse errors print the file the offset landed in, the offset within
/// that file, and a snippet of what the parser was looking at.
pub fn parse_err<T : Display>(file : &Path, offset : usize, err : &T, snippet : &str) -> ! {
    eprintln!("parse error : {} at {} byte {} near '{}'", err, file.display(), offset, snippet);
    std::process::exit(1)
}

pub fn runtime_err(err : &RunErr) -> ! {
    eprintln!("runtime error : {}", err);
    std::process::exit(1)
}

#[cfg(test)]
mod errors_tests {
    use super::*;

    #[test]
    fn messages_match_the_taxonomy() {
        assert_eq!(format!("{}", RunErr::ErrAtTop), "err at top level");
        assert_eq!(format!("{}", RunErr::Irreducible), "top level is irreducible");
        assert_eq!(format!("{}", RunErr::Arity("$get", 1)), "$get expects 1 argument");
        assert_eq!(format!("{}", RunErr::Arity("$put", 2)), "$put expects 2 arguments");
        assert_eq!(format!("{}", RunErr::Arity("$exit", 0)), "$exit expects 0 arguments");
        assert_eq!(format!("{}", RunErr::Malformed("put")), "put argument is malformed");
        assert_eq!(format!("{}", RunErr::ErrInArg("eput")), "err in eput argument");
    }
}
