//! State shared by the two tree walkers.
//!
//! Both the SQL translator and the value extractor descend the same grammar
//!  and need the same bookkeeping: which model each lambda parameter is bound
//!  to, which member accesses are waiting to be resolved against a terminal,
//!  whether the current subtree sits under an odd number of `!`s, and (for
//!  diagnostics) the chain of operators above the current node.
//!
//! Every push has its pop in the same helper on the [Walker] trait, so callers
//!  can't unbalance a stack by returning early with `?`.

use crate::{
    ast::{Expression, LambdaParam},
    error::{Error, Result},
    translate::Operator,
};

#[derive(Debug, Default)]
pub struct WalkContext<'e> {
    /// (parameter name, model name), innermost lambda last
    models: Vec<(&'e str, &'e str)>,
    operators: Vec<Operator>,
    /// Pending member names; the one nearest the terminal is last
    members: Vec<&'e str>,
    invert: u32,
}

impl<'e> WalkContext<'e> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model bound to `param` by the innermost enclosing lambda.
    pub fn model_for(&self, param: &str) -> Option<&'e str> {
        self.models
            .iter()
            .rev()
            .find(|(name, _)| *name == param)
            .map(|(_, model)| *model)
    }

    pub fn is_inverted(&self) -> bool {
        self.invert % 2 == 1
    }

    pub fn has_pending_members(&self) -> bool {
        !self.members.is_empty()
    }

    /// Pending members in resolution order: the member applied directly to
    ///  the terminal comes first.
    pub fn pending_members(&self) -> impl Iterator<Item = &'e str> + '_ {
        self.members.iter().rev().copied()
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }
}

/// Undoes one scope's change to the context when dropped, so the context is
///  restored even if the walk unwinds.
struct Scope<'w, 'e, W: Walker<'e>, F: FnOnce(&mut WalkContext<'e>)> {
    walker: &'w mut W,
    restore: Option<F>,
    _marker: std::marker::PhantomData<&'e ()>,
}

impl<'e, W: Walker<'e>, F: FnOnce(&mut WalkContext<'e>)> Drop for Scope<'_, 'e, W, F> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore(self.walker.context());
        }
    }
}

pub(crate) trait Walker<'e>: Sized {
    fn context(&mut self) -> &mut WalkContext<'e>;

    /// Applies `enter` to the context, runs `f`, then applies `restore`.
    fn scoped<R>(
        &mut self,
        enter: impl FnOnce(&mut WalkContext<'e>),
        restore: impl FnOnce(&mut WalkContext<'e>),
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        enter(self.context());
        let scope = Scope {
            walker: self,
            restore: Some(restore),
            _marker: std::marker::PhantomData,
        };
        f(&mut *scope.walker)
    }

    fn with_member<R>(&mut self, member: &'e str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scoped(
            |cx| cx.members.push(member),
            |cx| {
                cx.members.pop();
            },
            f,
        )
    }

    fn with_operator<R>(&mut self, op: Operator, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scoped(
            |cx| cx.operators.push(op),
            |cx| {
                cx.operators.pop();
            },
            f,
        )
    }

    /// Walks `f` under one more logical NOT.
    fn inverted<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scoped(|cx| cx.invert += 1, |cx| cx.invert -= 1, f)
    }

    /// Walks `f` as if no NOT were above it. Comparison operands and
    ///  conditional tests are values, not predicates, and must not be flipped.
    fn neutral<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.context().invert;
        self.scoped(|cx| cx.invert = 0, move |cx| cx.invert = saved, f)
    }

    /// Walks `f` with no pending members; a member chain never reaches across
    ///  a node that isn't a member access.
    fn isolated<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::take(&mut self.context().members);
        self.scoped(|_| {}, move |cx| cx.members = saved, f)
    }

    /// Binds the single parameter of a lambda for the duration of `f`.
    fn with_lambda<R>(
        &mut self,
        params: &'e [LambdaParam],
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let [param] = params else {
            return Err(Error::LambdaArity(params.len()));
        };
        self.scoped(
            |cx| cx.models.push((param.name.as_str(), param.ty.as_str())),
            |cx| {
                cx.models.pop();
            },
            |s| s.with_operator(Operator::Lambda, f),
        )
    }
}

/// Splits a top level lambda into its parameter list and body. Bare bodies
///  (no lambda) are accepted only if they never mention a parameter, which
///  the walk will discover on its own.
pub(crate) fn lambda_parts(expr: &Expression) -> Option<(&[LambdaParam], &Expression)> {
    match expr {
        Expression::Lambda { params, body } => Some((params, body)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder<'e>(WalkContext<'e>);

    impl<'e> Walker<'e> for Recorder<'e> {
        fn context(&mut self) -> &mut WalkContext<'e> {
            &mut self.0
        }
    }

    #[test]
    fn scopes_release_on_error_paths() {
        let mut walker = Recorder(WalkContext::new());
        let res: Result<()> = walker.inverted(|p| {
            p.with_member("Name", |p| {
                assert!(p.0.is_inverted());
                assert!(p.0.has_pending_members());
                Err(Error::UnsupportedNode("Test"))
            })
        });
        assert!(res.is_err());
        assert!(!walker.0.is_inverted());
        assert!(!walker.0.has_pending_members());
    }

    #[test]
    fn scopes_release_on_unwind() {
        let mut walker = Recorder(WalkContext::new());
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            walker.inverted(|p| p.with_member("Name", |_| -> () { panic!("walk aborted") }))
        }));
        assert!(res.is_err());
        assert!(!walker.0.is_inverted());
        assert!(!walker.0.has_pending_members());
    }

    #[test]
    fn pending_members_resolve_innermost_first() {
        let mut walker = Recorder(WalkContext::new());
        // p.Manager.Name pushes Name first, then Manager
        walker.with_member("Name", |p| {
            p.with_member("Manager", |p| {
                let members: Vec<_> = p.0.pending_members().collect();
                assert_eq!(members, ["Manager", "Name"]);
            })
        });
    }

    #[test]
    fn neutral_and_isolated_restore() {
        let mut walker = Recorder(WalkContext::new());
        walker.inverted(|p| {
            p.with_member("Id", |p| {
                p.neutral(|p| p.isolated(|p| {
                    assert!(!p.0.is_inverted());
                    assert!(!p.0.has_pending_members());
                }));
                assert!(p.0.is_inverted());
                assert!(p.0.has_pending_members());
            })
        });
    }

    #[test]
    fn lambda_arity_is_checked() {
        let params = vec![
            LambdaParam {
                name: "a".into(),
                ty: "Person".into(),
            },
            LambdaParam {
                name: "b".into(),
                ty: "Person".into(),
            },
        ];
        let mut walker = Recorder(WalkContext::new());
        let res = walker.with_lambda(&params, |_| Ok(()));
        assert_eq!(res, Err(Error::LambdaArity(2)));

        let res = walker.with_lambda(&params[..1], |p| {
            Ok(p.0.model_for("a").map(str::to_string))
        });
        assert_eq!(res, Ok(Some("Person".to_string())));
        assert_eq!(walker.0.model_for("a"), None);
    }
}
