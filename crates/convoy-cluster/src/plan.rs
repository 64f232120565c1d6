//! Top-level action selection for one reconcile

use convoy_common::types::{DesiredSpec, ObservedState};

use crate::saga::pending_mutations;

/// What a reconcile must do to converge
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    /// Nothing exists yet
    Create,
    /// A replace-only field changed; delete then create
    Replace {
        /// Replace-only fields that differ
        fields: Vec<&'static str>,
    },
    /// In-place changes are pending
    Update,
    /// Already converged
    NoOp,
}

/// Decide how to move from `prior` to `desired`
pub fn plan(desired: &DesiredSpec, prior: Option<&ObservedState>) -> Plan {
    let Some(prior) = prior else {
        return Plan::Create;
    };

    let fields = prior.replacement_fields(desired);
    if !fields.is_empty() {
        return Plan::Replace { fields };
    }

    if pending_mutations(desired, prior).is_empty() {
        Plan::NoOp
    } else {
        Plan::Update
    }
}
