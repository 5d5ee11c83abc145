use std::io::{ self, Write };

use indexmap::IndexSet;
use fxhash::FxBuildHasher;

use crate::term::{ Term, Shape };

const RED_ZONE : usize = 64 * 1024;
const STACK_CHUNK : usize = 1024 * 1024;

/// Prints a term in the same prefix syntax the parser reads, so a dump
/// re-parses: `.` then function then argument, `\` then binder then body,
/// a space after every name. Variables the parser created print their
/// source spelling; machine-made ones get `v0`, `v1`, … in order of first
/// appearance, stable for the duration of one dump.
pub struct Dumper {
    anon : IndexSet<usize, FxBuildHasher>,
}

impl Dumper {
    pub fn new() -> Self {
        Dumper {
            anon : IndexSet::with_capacity_and_hasher(16, FxBuildHasher::default()),
        }
    }

    pub fn dump<W : Write>(&mut self, t : &Term, out : &mut W) -> io::Result<()> {
        stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || self.dump_step(t, out))
    }

    fn dump_step<W : Write>(&mut self, t : &Term, out : &mut W) -> io::Result<()> {
        enum Node {
            PApp(Term, Term),
            PLam(Term, Term),
            Done,
        }
        let node = match &*t.shape() {
            Shape::App { fun, arg } => Node::PApp(fun.clone(), arg.clone()),
            Shape::Lam { var, body } => Node::PLam(var.clone(), body.clone()),
            Shape::Var { name } => {
                match name {
                    Some(n) => write!(out, "{} ", n)?,
                    None => {
                        let tag = self.anon_tag(t);
                        write!(out, "v{} ", tag)?
                    },
                }
                Node::Done
            },
            Shape::Io(kind) => {
                write!(out, "{} ", kind.name())?;
                Node::Done
            },
            Shape::Probe(bit) => {
                write!(out, "{} ", if *bit { "$true" } else { "$false" })?;
                Node::Done
            },
            Shape::Hole => unreachable!("dump reached a node mid-rewrite"),
        };

        match node {
            Node::PApp(fun, arg) => {
                out.write_all(b".")?;
                self.dump(&fun, out)?;
                self.dump(&arg, out)
            },
            Node::PLam(var, body) => {
                out.write_all(b"\\")?;
                self.dump(&var, out)?;
                self.dump(&body, out)
            },
            Node::Done => Ok(()),
        }
    }

    fn anon_tag(&mut self, var : &Term) -> usize {
        match self.anon.get_full(&var.addr()) {
            Some((idx, _)) => idx,
            None => {
                self.anon.insert(var.addr());
                self.anon.len() - 1
            },
        }
    }
}

/// One-shot dump with a fresh anonymous-variable table.
pub fn dump_term<W : Write>(t : &Term, out : &mut W) -> io::Result<()> {
    Dumper::new().dump(t, out)
}
