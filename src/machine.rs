use std::io::{ Read, Write };

use crate::bits::{ BitReader, BitWriter };
use crate::errors::{ RunErr, RunResult };
use crate::pretty;
use crate::reduction::{ whnf, norm };
use crate::term::{ Term, Shape, IoKind, mk_app, mk_lam, mk_var, mk_probe };

/// IOループの駆動装置です。プログラムのトップレベルの項を WHNF まで
/// 簡約して、先頭のIOアトムが選ぶ効果を一つ実行して、継続の項を組み立てて、
/// また繰り返します。ループは絶対に再帰しないので、いくら長く走っている
/// プログラムでもドライバーのスタックは伸びません。
///
/// 効果と効果の間、DAGはルートにおいて完全にWHNFまで簡約されています。
/// 観測できる副作用はプログラムが要求した順のビットの読み書きだけです。
pub struct Machine<R, W, E> {
    input : BitReader<R>,
    output : BitWriter<W>,
    errput : BitWriter<E>,
}

/// Leftmost spine of a term: the non-`App` head and the number of `App`
/// layers above it.
fn spine(t : &Term) -> (Term, usize) {
    let mut head = t.clone();
    let mut args = 0usize;
    loop {
        let next = match &*head.shape() {
            Shape::App { fun, .. } => Some(fun.clone()),
            _ => None,
        };
        match next {
            Some(fun) => {
                head = fun;
                args += 1;
            },
            None => return (head, args),
        }
    }
}

fn fun_of(t : &Term) -> Term {
    match &*t.shape() {
        Shape::App { fun, .. } => fun.clone(),
        _ => unreachable!("spine arity was checked"),
    }
}

fn arg_of(t : &Term) -> Term {
    match &*t.shape() {
        Shape::App { arg, .. } => arg.clone(),
        _ => unreachable!("spine arity was checked"),
    }
}

impl<R : Read, W : Write, E : Write> Machine<R, W, E> {
    pub fn new(input : R, output : W, errput : E) -> Self {
        Machine {
            input : BitReader::new(input),
            output : BitWriter::new(output),
            errput : BitWriter::new(errput),
        }
    }

    /// Runs a program to completion. Every path out of here has released
    /// the whole term DAG: the happy exit drops it, and error returns
    /// drop the handles on the way out.
    pub fn run(&mut self, mut top : Term) -> RunResult<()> {
        loop {
            whnf(&top);

            let (head, args) = spine(&top);
            let kind = match &*head.shape() {
                Shape::Io(kind) => *kind,
                _ => return Err(RunErr::Irreducible),
            };
            drop(head);

            let cont = match kind {
                IoKind::Exit => {
                    if args != 0 {
                        return Err(RunErr::Arity("$exit", 0));
                    }
                    drop(top);
                    return Ok(());
                },
                IoKind::Err => return Err(RunErr::ErrAtTop),
                IoKind::Get => {
                    if args != 1 {
                        return Err(RunErr::Arity("$get", 1));
                    }
                    let option = self.read_option()?;
                    mk_app(arg_of(&top), option)
                },
                IoKind::Put => {
                    if args != 2 {
                        return Err(RunErr::Arity("$put", 2));
                    }
                    let bit = force_bool(arg_of(&fun_of(&top)), "put")?;
                    self.output.write_bit(bit)?;
                    arg_of(&top)
                },
                IoKind::EPut => {
                    if args != 2 {
                        return Err(RunErr::Arity("$eput", 2));
                    }
                    let bit = force_bool(arg_of(&fun_of(&top)), "eput")?;
                    self.errput.write_bit(bit)?;
                    arg_of(&top)
                },
                IoKind::Dump => {
                    if args != 2 {
                        return Err(RunErr::Arity("$dump", 2));
                    }
                    let subject = arg_of(&fun_of(&top));
                    norm(&subject);
                    pretty::dump_term(&subject, self.errput.writer_mut())?;
                    self.errput.writer_mut().write_all(b"\n")?;
                    arg_of(&top)
                },
            };

            top = cont;
        }
    }

    /// `$get` の継続に渡す Scott エンコードされた `Option<Bool>` を
    /// 組み立てます。入力が尽きたら `\s \n n`、ビット b が読めたら
    /// `\s \n .s \t \f (t|f)` です。
    fn read_option(&mut self) -> RunResult<Term> {
        let bit = self.input.read_bit()?;

        let some = mk_var();
        let none = mk_var();
        let inner = match bit {
            None => none.clone(),
            Some(b) => {
                let t = mk_var();
                let f = mk_var();
                let body = if b { t.clone() } else { f.clone() };
                let boolean = mk_lam(t, mk_lam(f, body));
                mk_app(some.clone(), boolean)
            },
        };

        Ok(mk_lam(some, mk_lam(none, inner)))
    }
}

/// Forces a `$put`/`$eput` argument by applying it to the two boolean
/// probes and reducing to WHNF; the surviving probe tag is the bit. The
/// argument is never fully normalized, weak head is as far as this
/// looks.
fn force_bool(subject : Term, op : &'static str) -> RunResult<bool> {
    let probed = mk_app(mk_app(subject, mk_probe(true)), mk_probe(false));
    whnf(&probed);

    if let Shape::Probe(bit) = &*probed.shape() {
        return Ok(*bit);
    }

    let (head, _) = spine(&probed);
    let result = match &*head.shape() {
        Shape::Io(IoKind::Err) => Err(RunErr::ErrInArg(op)),
        _ => Err(RunErr::Malformed(op)),
    };
    result
}
