use crate::term::{ Term, Shape, bump_epoch, mk_app, mk_lam, mk_var };

use Shape::*;

/// Red zone + growth sizes for `stacker::maybe_grow`. Reduction, like the
/// program it runs, recurses as deep as the term is tall, so every entry
/// point below grows the stack in chunks instead of trusting whatever the
/// OS handed us.
const RED_ZONE : usize = 64 * 1024;
const STACK_CHUNK : usize = 1024 * 1024;

enum Decomp {
    IsApp(Term, Term),
    IsLam(Term, Term),
    OwnApp,
    OwnLam,
    IsVar,
    IsLeaf,
    Shadowed,
}

/// ベータ置換 `term[var ↦ arg]` です。所有権の契約：
///   - `term` への参照を一つ消費する
///   - `var`・`arg` は借用するだけ（`arg` は閉じた項でなければならない）
///   - 返り値は所有された参照
///
/// ノードごとのメモ化があるので、同じパスの中で二回訪問されたノードは
/// キャッシュされた結果を（incref して）返します。これで共有された部分項
/// は共有されたまま、置換は `var` の推移的な親の個数について線形です。
pub fn beta(term : Term, var : &Term, arg : &Term, epoch : u64) -> Term {
    stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || beta_step(term, var, arg, epoch))
}

fn beta_step(term : Term, var : &Term, arg : &Term, epoch : u64) -> Term {
    if let Some(hit) = term.cached_beta(epoch) {
        return hit;
    }

    // Uniquely owned interior nodes donate their edges to the recursion
    // and are rewritten in place; shared ones recurse on cloned handles
    // and allocate only when a child actually changed.
    let unique = term.uniquely_owned();

    let decomp = match &*term.shape() {
        App { fun, arg : x } => {
            if unique {
                Decomp::OwnApp
            } else {
                Decomp::IsApp(fun.clone(), x.clone())
            }
        },
        Lam { var : v, body } => {
            if Term::ptr_eq(v, var) {
                // an inner binder on the same variable node shadows the
                // substitution; recursion stops at its boundary
                Decomp::Shadowed
            } else if unique {
                Decomp::OwnLam
            } else {
                Decomp::IsLam(v.clone(), body.clone())
            }
        },
        Var { .. } => Decomp::IsVar,
        Io(_) | Probe(_) => Decomp::IsLeaf,
        Hole => unreachable!("beta reached a node mid-rewrite"),
    };

    let result = match decomp {
        Decomp::OwnApp => {
            let (fun, x) = match term.set_shape(Hole) {
                App { fun, arg } => (fun, arg),
                _ => unreachable!(),
            };
            let new_fun = beta(fun, var, arg, epoch);
            let new_x = beta(x, var, arg, epoch);
            term.set_shape(App { fun : new_fun, arg : new_x });
            term.clone()
        },
        Decomp::IsApp(fun, x) => {
            let new_fun = beta(fun.clone(), var, arg, epoch);
            let new_x = beta(x.clone(), var, arg, epoch);
            if Term::ptr_eq(&new_fun, &fun) && Term::ptr_eq(&new_x, &x) {
                term.clone()
            } else {
                mk_app(new_fun, new_x)
            }
        },
        Decomp::OwnLam => {
            let (bound, old_body) = match term.set_shape(Hole) {
                Lam { var : bound, body } => (bound, body),
                _ => unreachable!(),
            };
            // the taken-apart shape no longer binds the variable; the
            // rebuilt one below does
            bound.dec_bind();
            let new_body = beta(old_body, var, arg, epoch);
            bound.inc_bind();
            term.set_shape(Lam { var : bound, body : new_body });
            term.clone()
        },
        Decomp::IsLam(v, body) => {
            let new_body = beta(body.clone(), var, arg, epoch);
            if Term::ptr_eq(&new_body, &body) {
                term.clone()
            } else {
                mk_lam(v, new_body)
            }
        },
        Decomp::IsVar => {
            if Term::ptr_eq(&term, var) {
                arg.clone()
            } else {
                term.clone()
            }
        },
        Decomp::IsLeaf | Decomp::Shadowed => term.clone(),
    };

    term.record_beta(epoch, &result);
    result
}

/// 正規順序で `t` をWHNFまで簡約します。簡約された値はノードの中身に
/// 上書きされるので、`t` を指している親が全員、追加の仕事をせずに
/// 簡約済みの値を見えます。二回目以降の要求は O(1) です。
///
/// The returned handle is the reduced value. It is `t` itself in every
/// case but one: a redex contracting to a bare variable cannot have the
/// variable's shape copied over it (identity *is* the address), so the
/// variable handle is returned and `t` is left as a trivial redex that
/// re-derives it. That case only arises when `norm` reduces under a
/// binder; top-level terms are closed.
pub fn whnf(t : &Term) -> Term {
    stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || whnf_step(t))
}

fn whnf_step(t : &Term) -> Term {
    loop {
        let fun = match &*t.shape() {
            App { fun, .. } => fun.clone(),
            _ => return t.clone(),
        };

        let head = whnf(&fun);
        if !Term::ptr_eq(&head, &fun) {
            // the function edge collapsed to a bare variable; relink
            let arg = match &*t.shape() {
                App { arg, .. } => arg.clone(),
                _ => unreachable!(),
            };
            t.set_shape(App { fun : head.clone(), arg });
        }
        if !head.is_lam() {
            return t.clone();
        }
        drop(head);
        drop(fun);

        // detach the redex: owned handles to the abstraction's variable
        // and body and to the argument, with t's own edges released
        let (lam, arg) = match t.set_shape(Hole) {
            App { fun, arg } => (fun, arg),
            _ => unreachable!(),
        };
        let (var, body) = match &*lam.shape() {
            Lam { var, body } => (var.clone(), body.clone()),
            _ => unreachable!(),
        };
        // this may free the abstraction, dropping one binding of var
        drop(lam);

        let reduced = if Term::ptr_eq(&body, &var) {
            // identity redex: the body is the bound variable itself
            drop(body);
            drop(var);
            arg
        } else if var.refcount() == 1 {
            // the variable occurs nowhere in the body (uses and binding
            // edges both count), so substitution would be a no-op
            drop(arg);
            drop(var);
            body
        } else {
            let out = beta(body, &var, &arg, bump_epoch());
            drop(arg);
            drop(var);
            out
        };

        // overwrite t with the result's shape so every parent sees it
        let copy = match &*reduced.shape() {
            App { fun, arg } => Some(App { fun : fun.clone(), arg : arg.clone() }),
            Lam { var, body } => {
                // rebind: t becomes one more abstraction on this variable
                var.inc_bind();
                Some(Lam { var : var.clone(), body : body.clone() })
            },
            Io(kind) => Some(Io(*kind)),
            Probe(bit) => Some(Probe(*bit)),
            Var { .. } => None,
            Hole => unreachable!("reduction produced a hole"),
        };
        match copy {
            Some(shape) => {
                t.set_shape(shape);
            },
            None => {
                // a bare variable: leave t as a redex that re-derives it
                // and hand the variable itself back
                let z = mk_var();
                let identity = mk_lam(z.clone(), z);
                t.set_shape(App { fun : identity, arg : reduced.clone() });
                return reduced;
            },
        }
    }
}

/// Full normal form, used only by `$dump`: WHNF at every level, recursing
/// into both children of an application and into an abstraction's body.
/// Children that normalized to a different node are relinked in place, so
/// normalizing twice returns the very same nodes.
pub fn norm(t : &Term) -> Term {
    stacker::maybe_grow(RED_ZONE, STACK_CHUNK, || norm_step(t))
}

fn norm_step(t : &Term) -> Term {
    let r = whnf(t);

    let decomp = match &*r.shape() {
        App { fun, arg } => Decomp::IsApp(fun.clone(), arg.clone()),
        Lam { var, body } => Decomp::IsLam(var.clone(), body.clone()),
        _ => Decomp::IsLeaf,
    };

    match decomp {
        Decomp::IsApp(fun, arg) => {
            let new_fun = norm(&fun);
            let new_arg = norm(&arg);
            if !Term::ptr_eq(&new_fun, &fun) || !Term::ptr_eq(&new_arg, &arg) {
                r.set_shape(App { fun : new_fun, arg : new_arg });
            }
            r
        },
        Decomp::IsLam(var, body) => {
            let new_body = norm(&body);
            if !Term::ptr_eq(&new_body, &body) {
                // same variable stays bound by the same node, so the
                // binding count is untouched by the shape swap
                r.set_shape(Lam { var, body : new_body });
            }
            r
        },
        _ => r,
    }
}

#[cfg(test)]
mod reduction_tests {
    use super::*;
    use crate::term::{ mk_io, IoKind };

    fn identity() -> Term {
        let x = mk_var();
        mk_lam(x.clone(), x)
    }

    #[test]
    fn identity_redex_contracts() {
        let t = mk_app(identity(), mk_io(IoKind::Exit));
        let r = whnf(&t);
        assert!(Term::ptr_eq(&r, &t));
        match &*t.shape() {
            Shape::Io(IoKind::Exit) => (),
            _ => panic!("redex did not contract to $exit"),
        };
    }

    #[test]
    fn parents_share_the_reduction() {
        let redex = mk_app(identity(), mk_io(IoKind::Exit));
        let p1 = mk_app(redex.clone(), mk_var());
        let p2 = mk_app(redex.clone(), mk_var());
        whnf(&redex);
        // both parents now hold an already-reduced head
        for p in &[p1, p2] {
            match &*p.shape() {
                Shape::App { fun, .. } => {
                    assert!(Term::ptr_eq(fun, &redex));
                    assert!(!fun.is_app());
                },
                _ => panic!("parent lost its application"),
            }
        }
    }

    #[test]
    fn shadowing_stops_substitution() {
        // \v \v v : substituting for the outer binding must not touch
        // the inner abstraction
        let v = mk_var();
        let inner = mk_lam(v.clone(), v.clone());
        let arg = mk_io(IoKind::Err);
        let out = beta(inner.clone(), &v, &arg, bump_epoch());
        assert!(Term::ptr_eq(&out, &inner));
        match &*out.shape() {
            Shape::Lam { body, .. } => assert!(Term::ptr_eq(body, &v)),
            _ => panic!("inner abstraction was rewritten"),
        };
    }

    #[test]
    fn memoization_preserves_sharing() {
        let v = mk_var();
        let shared = mk_app(v.clone(), v.clone());
        let term = mk_app(shared.clone(), shared.clone());
        let arg = mk_io(IoKind::Get);
        let out = beta(term, &v, &arg, bump_epoch());
        match &*out.shape() {
            Shape::App { fun, arg : x } => {
                assert!(Term::ptr_eq(fun, x));
                assert!(!Term::ptr_eq(fun, &shared));
            },
            _ => panic!("substitution lost the application"),
        };
    }

    #[test]
    fn unchanged_subterms_are_not_copied() {
        let v = mk_var();
        let constant = mk_app(mk_io(IoKind::Put), mk_io(IoKind::Get));
        let term = mk_app(constant.clone(), v.clone());
        let arg = mk_io(IoKind::Exit);
        let out = beta(term, &v, &arg, bump_epoch());
        match &*out.shape() {
            Shape::App { fun, arg : x } => {
                assert!(Term::ptr_eq(fun, &constant));
                assert!(Term::ptr_eq(x, &arg));
            },
            _ => panic!("substitution lost the application"),
        };
    }

    #[test]
    fn unique_owner_rewrites_in_place() {
        let v = mk_var();
        let term = mk_app(v.clone(), mk_io(IoKind::Put));
        let watch = term.watch();
        let arg = mk_io(IoKind::Exit);
        let out = beta(term, &v, &arg, bump_epoch());
        // no fresh node: the uniquely owned application was mutated
        assert!(std::rc::Weak::ptr_eq(&watch, &out.watch()));
        match &*out.shape() {
            Shape::App { fun, .. } => assert!(Term::ptr_eq(fun, &arg)),
            _ => panic!("substitution lost the application"),
        };
    }

    #[test]
    fn whnf_of_open_redex_returns_the_variable() {
        let x = mk_var();
        let t = mk_app(identity(), x.clone());
        let r = whnf(&t);
        assert!(Term::ptr_eq(&r, &x));
        // t stays a working redex: a second demand re-derives the same
        // variable
        let r2 = whnf(&t);
        assert!(Term::ptr_eq(&r2, &x));
    }

    #[test]
    fn norm_contracts_under_binders() {
        let x = mk_var();
        let body = mk_app(identity(), x.clone());
        let lam = mk_lam(x.clone(), body);
        let r = norm(&lam);
        assert!(Term::ptr_eq(&r, &lam));
        match &*lam.shape() {
            Shape::Lam { body, .. } => assert!(Term::ptr_eq(body, &x)),
            _ => panic!("normalization lost the abstraction"),
        };
    }

    #[test]
    fn norm_is_idempotent() {
        let x = mk_var();
        let lam = mk_lam(x.clone(), mk_app(mk_app(identity(), x.clone()), x.clone()));
        let once = norm(&lam);
        let body_once = match &*once.shape() {
            Shape::Lam { body, .. } => body.clone(),
            _ => panic!("not an abstraction"),
        };
        let twice = norm(&once);
        assert!(Term::ptr_eq(&once, &twice));
        match &*twice.shape() {
            Shape::Lam { body, .. } => assert!(Term::ptr_eq(body, &body_once)),
            _ => panic!("not an abstraction"),
        };
    }

    #[test]
    fn reduction_leaves_no_garbage() {
        let inner = mk_app(identity(), mk_io(IoKind::Exit));
        let t = mk_app(identity(), inner.clone());
        let watches = vec![t.watch(), inner.watch()];
        whnf(&t);
        drop(inner);
        drop(t);
        for w in watches {
            assert!(w.upgrade().is_none());
        }
    }
}
