use std::cell::{ Cell, Ref, RefCell };
use std::rc::{ Rc, Weak };
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

use Shape::*;

/// Globally visible monotonic counter validating the per-node beta caches.
/// A node's cached substitution result is only honored while the node's
/// `visited` stamp equals the live epoch; bumping the epoch before each
/// substitution pass therefore invalidates every cache at once, with no
/// separate unmark walk over the graph.
pub static EPOCH : AtomicU64 = AtomicU64::new(0);

pub fn bump_epoch() -> u64 {
    EPOCH.fetch_add(1, Relaxed) + 1
}

/// 簡約から見れば、IOアトムはただの不透明な定数です。トップレベルの項が
/// WHNFまで簡約された時、先頭に立っているアトムがどの効果を実行するかを
/// 選ぶものです（machine モジュール参照）。
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IoKind {
    Exit,
    Err,
    Get,
    Put,
    EPut,
    Dump,
}

impl IoKind {
    pub fn name(self) -> &'static str {
        match self {
            IoKind::Exit => "$exit",
            IoKind::Err  => "$err",
            IoKind::Get  => "$get",
            IoKind::Put  => "$put",
            IoKind::EPut => "$eput",
            IoKind::Dump => "$dump",
        }
    }

    /// The extended atoms; resolved by the parser only when the CLI
    /// leaves the full table enabled.
    pub fn is_extension(self) -> bool {
        match self {
            IoKind::EPut | IoKind::Dump => true,
            _ => false,
        }
    }
}

/// The four term shapes of the calculus, plus two internal ones.
///
/// `Var` is a leaf whose identity is the node's address; it carries no
/// payload the evaluator looks at (the optional `name` exists for the
/// dumper only). A `Lam` holds an edge to the variable node it binds, and
/// several `Lam`s may bind the same node; those are alpha-equivalent
/// copies sharing their subterms.
///
/// `Probe` is the tagged sentinel `$put` applies its argument to, and
/// `Hole` is the transient state of a redex node while `whnf` rebuilds it.
/// Neither can be produced by the parser.
pub enum Shape {
    App { fun : Term, arg : Term },
    Lam { var : Term, body : Term },
    Var { name : Option<String> },
    Io(IoKind),
    Probe(bool),
    Hole,
}

/// 項のノード。`shape` は RefCell に入っています。なぜなら、`whnf` が
/// 簡約結果をノードの中身に上書きすることで、全ての親が一斉に簡約済みの
/// 値を見えるようになるからです（これが共有性の核心だ）。
///
/// `bindcount` はこのノードを束縛する抽象の個数で、変数ノード以外は常に
/// 0 です。`visited`・`beta` は置換パスのメモ化のヘッダーです。`beta` は
/// 弱い参照であって、参照カウントには一切寄与しません。エポックが合う間
/// しか upgrade されないから、パスの間に宙ぶらりんになっても安全です。
pub struct InnerTerm {
    pub(crate) shape : RefCell<Shape>,
    pub(crate) bindcount : Cell<u32>,
    pub(crate) visited : Cell<u64>,
    pub(crate) beta : RefCell<Weak<InnerTerm>>,
}

impl Drop for InnerTerm {
    fn drop(&mut self) {
        // a dying abstraction releases its binding before the variable
        // edge itself goes away
        if let Lam { var, .. } = &*self.shape.borrow() {
            var.dec_bind();
        }
    }
}

/// Rc wrapper around `InnerTerm`. Cloning a handle is `incref`, dropping
/// one is `decref`; the last drop releases child edges recursively. The
/// graph is acyclic by construction (a `Lam` points at its variable, the
/// variable never points back), so plain reference counting reclaims
/// everything.
#[derive(Clone)]
pub struct Term(Rc<InnerTerm>);

fn alloc(shape : Shape) -> Term {
    Term(Rc::new(InnerTerm {
        shape : RefCell::new(shape),
        bindcount : Cell::new(0),
        visited : Cell::new(0),
        beta : RefCell::new(Weak::new()),
    }))
}

pub fn mk_app(fun : Term, arg : Term) -> Term {
    alloc(App { fun, arg })
}

/// Makes an abstraction binding `var`, bumping the variable's bindcount.
/// The binding edge also holds a strong handle, so `bindcount(v)` can
/// never exceed `refcount(v)`.
pub fn mk_lam(var : Term, body : Term) -> Term {
    var.inc_bind();
    alloc(Lam { var, body })
}

/// 新しい変数ノード。変数の同一性はポインターの同一性なので、これを
/// 呼ぶたびに別の変数が生まれます。
pub fn mk_var() -> Term {
    alloc(Var { name : None })
}

/// A variable that remembers its source spelling for the dumper.
pub fn mk_var_named(name : impl Into<String>) -> Term {
    alloc(Var { name : Some(name.into()) })
}

pub fn mk_io(kind : IoKind) -> Term {
    alloc(Io(kind))
}

pub fn mk_probe(bit : bool) -> Term {
    alloc(Probe(bit))
}

impl Term {
    pub fn ptr_eq(a : &Term, b : &Term) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Total in-edges plus outstanding handles.
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn bindcount(&self) -> u32 {
        self.0.bindcount.get()
    }

    pub(crate) fn inc_bind(&self) {
        self.0.bindcount.set(self.0.bindcount.get() + 1);
    }

    pub(crate) fn dec_bind(&self) {
        self.0.bindcount.set(self.0.bindcount.get() - 1);
    }

    pub fn shape(&self) -> Ref<Shape> {
        self.0.shape.borrow()
    }

    /// Swaps this node's content, returning the old shape. The caller is
    /// responsible for bindcount adjustments when an abstraction shape is
    /// installed or removed this way.
    pub(crate) fn set_shape(&self, shape : Shape) -> Shape {
        self.0.shape.replace(shape)
    }

    pub fn is_app(&self) -> bool {
        match &*self.shape() {
            App { .. } => true,
            _ => false,
        }
    }

    pub fn is_lam(&self) -> bool {
        match &*self.shape() {
            Lam { .. } => true,
            _ => false,
        }
    }

    /// このノードがユニークに所有されているかどうか。所有者が一人しか
    /// いないノードは、新しいノードを割り当てる代わりに直接書き換えても
    /// 観測されません。これは最適化だけで、正しさの条件ではありません。
    pub(crate) fn uniquely_owned(&self) -> bool {
        Rc::strong_count(&self.0) == 1
    }

    /// Substitution memo lookup; `Some` only when this node was already
    /// visited under the live epoch. The upgrade is the `incref` of the
    /// cached result.
    pub(crate) fn cached_beta(&self, epoch : u64) -> Option<Term> {
        if self.0.visited.get() == epoch {
            self.0.beta.borrow().upgrade().map(Term)
        } else {
            None
        }
    }

    pub(crate) fn record_beta(&self, epoch : u64, result : &Term) {
        self.0.visited.set(epoch);
        *self.0.beta.borrow_mut() = Rc::downgrade(&result.0);
    }

    /// Weak handle for tests that watch a node get freed.
    pub fn watch(&self) -> Weak<InnerTerm> {
        Rc::downgrade(&self.0)
    }

    /// Node address; the dumper keys its table of anonymous variables on
    /// this.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl std::fmt::Debug for Term {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match &*self.shape() {
            App { .. } => write!(f, "<app {:p}>", Rc::as_ptr(&self.0)),
            Lam { .. } => write!(f, "<lam {:p}>", Rc::as_ptr(&self.0)),
            Var { name : Some(n) } => write!(f, "<var {}>", n),
            Var { name : None } => write!(f, "<var {:p}>", Rc::as_ptr(&self.0)),
            Io(kind) => write!(f, "<{}>", kind.name()),
            Probe(bit) => write!(f, "<probe {}>", bit),
            Hole => write!(f, "<hole>"),
        }
    }
}

#[cfg(test)]
mod term_tests {
    use super::*;

    #[test]
    fn binding_counts() {
        let v = mk_var();
        assert_eq!(v.bindcount(), 0);
        let lam1 = mk_lam(v.clone(), v.clone());
        let lam2 = mk_lam(v.clone(), v.clone());
        assert_eq!(v.bindcount(), 2);
        std::mem::drop(lam1);
        assert_eq!(v.bindcount(), 1);
        std::mem::drop(lam2);
        assert_eq!(v.bindcount(), 0);
    }

    #[test]
    fn drop_frees_subterms() {
        let v = mk_var();
        let body = mk_app(v.clone(), v.clone());
        let lam = mk_lam(v.clone(), body.clone());
        let watch_body = body.watch();
        std::mem::drop(body);
        std::mem::drop(v);
        assert!(watch_body.upgrade().is_some());
        std::mem::drop(lam);
        assert!(watch_body.upgrade().is_none());
    }

    #[test]
    fn refcount_counts_edges_and_handles() {
        let v = mk_var();
        assert_eq!(v.refcount(), 1);
        let app = mk_app(v.clone(), v.clone());
        assert_eq!(v.refcount(), 3);
        let lam = mk_lam(v.clone(), app.clone());
        assert_eq!(v.refcount(), 4);
        assert!(v.bindcount() as usize <= v.refcount());
        std::mem::drop(app);
        std::mem::drop(lam);
        assert_eq!(v.refcount(), 1);
    }

    #[test]
    fn beta_cache_is_a_borrow() {
        let v = mk_var();
        let arg = mk_io(IoKind::Exit);
        let before = arg.refcount();
        v.record_beta(7, &arg);
        assert_eq!(arg.refcount(), before);
        assert!(v.cached_beta(7).is_some());
        assert!(v.cached_beta(8).is_none());
    }

    #[test]
    fn stale_cache_is_never_upgraded() {
        let v = mk_var();
        let arg = mk_app(mk_var(), mk_var());
        v.record_beta(3, &arg);
        std::mem::drop(arg);
        // the weak pointer now dangles; a matching epoch shrugs it off
        // and a stale epoch never looks
        assert!(v.cached_beta(3).is_none());
        assert!(v.cached_beta(4).is_none());
    }
}
