//! Build-time conditionals.
//!
//! The predicate is evaluated while the workflow is built. Conditions that
//! must be checked at run time belong in a leaf returning
//! [`exit_if`](crate::exit_if).

use crate::action::Action;

/// `act` when `predicate` holds, [`Action::Nop`] otherwise.
pub fn if_then(predicate: bool, act: Action) -> Action {
    if predicate {
        act
    } else {
        Action::Nop
    }
}

/// `then` when `predicate` holds, `otherwise` otherwise.
pub fn if_else(predicate: bool, then: Action, otherwise: Action) -> Action {
    if predicate {
        then
    } else {
        otherwise
    }
}
