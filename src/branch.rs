//! Symbolic branch / SMT suspension protocol (§4.H, §5).
//!
//! When a conditional (`JUMPI`, or any opcode that must know whether an
//! `Expr` is zero) cannot be decided from its literal form alone, the
//! driver loop suspends with `VMError::Query(PleaseAskSMT)` rather than
//! guessing. The embedding resolves the query by calling back into
//! [`crate::vm::VM::resume_branch`] with the solver's verdict.

use crate::errors::{Choose, Query, VMError, VMResultT};
use crate::expr::Expr;

/// The three ways a path condition can resolve once the solver answers
/// (§4.H): provably true, provably false, or undecidable within the
/// solver's resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchVerdict {
    True,
    False,
    Unknown,
}

/// Try to decide `condition` without consulting the solver: a literal
/// collapses immediately, anything else must suspend.
pub fn decide(condition: &Expr) -> Option<bool> {
    condition.as_lit().map(|v| !v.is_zero())
}

/// Build the suspension error the driver raises when `condition` isn't
/// decidable locally (§4.H `PleaseAskSMT`).
pub fn suspend(condition: Expr, path_constraints: Vec<Expr>) -> VMError {
    VMError::Query(Box::new(Query::PleaseAskSmt {
        condition,
        path_constraints,
    }))
}

/// Having received `verdict` for a previously suspended `condition`,
/// decide which way(s) execution must now fork (§4.H, §5 "branch").
///
/// - `True`/`False` resume exactly one path: the caller appends
///   `condition` (or its negation) to the path constraint set and
///   continues.
/// - `Unknown` cannot be resumed unilaterally — the driver must present
///   `Choose::PleaseChoosePath` back to the embedding and let it pick,
///   since continuing down both paths without doing so would silently
///   explore a path the solver couldn't actually prove reachable.
pub fn resolve(condition: Expr, verdict: BranchVerdict) -> VMResultT<bool> {
    match verdict {
        BranchVerdict::True => Ok(true),
        BranchVerdict::False => Ok(false),
        BranchVerdict::Unknown => Err(VMError::Choose(Box::new(Choose::PleaseChoosePath {
            condition,
        }))),
    }
}

/// `forceConcrete`-style helper (§4.H): demand a literal or suspend. Used
/// anywhere the step function needs a concrete `usize`/`u64` (memory
/// offsets, jump targets, call gas) rather than a branch condition.
pub fn force_concrete(value: &Expr) -> VMResultT<ethereum_types::U256> {
    value.as_lit().ok_or_else(|| {
        VMError::UnexpectedSymbolicArg {
            pc: 0,
            msg: "expected a concrete word, got a symbolic expression".to_string(),
            exprs: vec![value.clone()],
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::U256;

    #[test]
    fn decide_collapses_literal_conditions() {
        assert_eq!(decide(&Expr::lit(U256::one())), Some(true));
        assert_eq!(decide(&Expr::lit(U256::zero())), Some(false));
    }

    #[test]
    fn decide_defers_symbolic_conditions() {
        assert_eq!(decide(&Expr::Abstract("cond".into())), None);
    }

    #[test]
    fn resolve_unknown_asks_the_embedding_to_choose() {
        let result = resolve(Expr::Abstract("cond".into()), BranchVerdict::Unknown);
        assert!(matches!(result, Err(VMError::Choose(_))));
    }
}
