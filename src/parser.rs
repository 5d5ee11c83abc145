use hashbrown::HashMap;
use fxhash::FxBuildHasher;
use once_cell::sync::Lazy;

use crate::term::{ Term, IoKind, mk_app, mk_lam, mk_var_named, mk_io };

use ParseErrKind::*;

pub type ParseResult<T> = std::result::Result<T, ParseErr>;

const RED_ZONE : usize = 64 * 1024;
const STACK_CHUNK : usize = 1024 * 1024;

/// パースエラーはいつも、連結されたソースの中のバイト・オフセットを
/// 持っています。どのファイルに当たるかを調べるのは cli モジュールの
/// 仕事です。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseErr {
    pub kind : ParseErrKind,
    pub offset : usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrKind {
    ExpectedTerm,
    ExpectedVar,
    UnboundVar,
    UnterminatedComment,
    TrailingChars,
}

impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExpectedTerm => write!(f, "expected term"),
            ExpectedVar => write!(f, "expected var"),
            UnboundVar => write!(f, "unbound variable"),
            UnterminatedComment => write!(f, "unterminated comment"),
            TrailingChars => write!(f, "trailing characters"),
        }
    }
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.kind, self.offset)
    }
}

type IoTable = HashMap<&'static str, IoKind, FxBuildHasher>;

/// The full IO name table. Name resolution tries in-scope binders first,
/// so every one of these is shadowable.
static IO_NAMES : Lazy<IoTable> = Lazy::new(|| {
    let mut table = IoTable::with_capacity_and_hasher(8, FxBuildHasher::default());
    table.insert("$exit", IoKind::Exit);
    table.insert("$err", IoKind::Err);
    table.insert("$get", IoKind::Get);
    table.insert("$put", IoKind::Put);
    table.insert("$eput", IoKind::EPut);
    table.insert("$dump", IoKind::Dump);
    table
});

/// 接頭辞記法の文法です（関数が先）：
///
/// ```text
/// term ::= '.' term term          -- application
///        | '\' name term          -- abstraction
///        | '#' ... '\n' term      -- comment, then the term
///        | name                   -- variable or IO atom
/// ```
///
/// A name is a maximal run of graphic bytes, so `.`, `\` and `#` only
/// dispatch at the head of a token and may appear inside names. Scope is
/// lexical, innermost binder first.
pub struct Parser<'s> {
    src : &'s [u8],
    pos : usize,
    scope : Vec<(&'s str, Term)>,
    minimal : bool,
}

/// Parses a whole program: one term, nothing but whitespace after it.
/// With `minimal` set the IO table is restricted to the core
/// `$exit`/`$err`/`$get`/`$put`; the extended atoms then resolve like any
/// other unbound name.
pub fn parse_program(src : &str, minimal : bool) -> ParseResult<Term> {
    let mut parser = Parser {
        src : src.as_bytes(),
        pos : 0,
        scope : Vec::with_capacity(64),
        minimal,
    };

    parser.skip_ws();
    let term = parser.parse_term()?;

    if parser.pos < parser.src.len() {
        return Err(ParseErr { kind : TrailingChars, offset : parser.pos });
    }

    Ok(term)
}

impl<'s> Parser<'s> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Consumes a maximal run of graphic bytes plus trailing whitespace,
    /// returning the token.
    fn parse_name(&mut self) -> ParseResult<&'s str> {
        let src = self.src;
        let start = self.pos;
        while self.pos < src.len() && src[self.pos].is_ascii_graphic() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseErr { kind : ExpectedVar, offset : start });
        }
        let name = std::str::from_utf8(&src[start..self.pos])
            .map_err(|_| ParseErr { kind : ExpectedVar, offset : start })?;
        self.skip_ws();
        Ok(name)
    }

    fn parse_term(&mut self) -> ParseResult<Term> {
        stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || self.parse_term_step())
    }

    fn parse_term_step(&mut self) -> ParseResult<Term> {
        if self.pos >= self.src.len() {
            return Err(ParseErr { kind : ExpectedTerm, offset : self.pos });
        }

        match self.src[self.pos] {
            b'.' => {
                self.pos += 1;
                self.skip_ws();
                let fun = self.parse_term()?;
                let arg = self.parse_term()?;
                Ok(mk_app(fun, arg))
            },
            b'\\' => {
                self.pos += 1;
                self.skip_ws();
                let name = self.parse_name()?;
                let var = mk_var_named(name);
                self.scope.push((name, var.clone()));
                let body = self.parse_term();
                self.scope.pop();
                Ok(mk_lam(var, body?))
            },
            b'#' => {
                let opened = self.pos;
                match self.src[self.pos..].iter().position(|b| *b == b'\n') {
                    Some(nl) => {
                        self.pos += nl + 1;
                        self.skip_ws();
                        self.parse_term()
                    },
                    None => Err(ParseErr { kind : UnterminatedComment, offset : opened }),
                }
            },
            _ => {
                let start = self.pos;
                let name = self.parse_name()?;

                // binders shadow the IO table
                for (n, var) in self.scope.iter().rev() {
                    if *n == name {
                        return Ok(var.clone());
                    }
                }

                match IO_NAMES.get(name) {
                    Some(kind) if !(self.minimal && kind.is_extension()) => Ok(mk_io(*kind)),
                    _ => Err(ParseErr { kind : UnboundVar, offset : start }),
                }
            },
        }
    }
}
