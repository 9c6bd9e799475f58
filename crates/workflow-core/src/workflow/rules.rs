//! Transition rule evaluation

use std::collections::BTreeSet;

use super::approval_types::ActorId;
use super::definition::TransitionRule;

/// Whether the approvals collected at a step satisfy its rule.
///
/// `approved` holds the nominal approvers that approved the step, `eligible`
/// the step's full approver set. An empty eligible set never satisfies
/// `all-approve`.
pub fn is_satisfied(
    rule: TransitionRule,
    eligible: &BTreeSet<ActorId>,
    approved: &BTreeSet<ActorId>,
) -> bool {
    match rule {
        TransitionRule::AllApprove => !eligible.is_empty() && eligible.is_subset(approved),
        TransitionRule::AnyApprove => !approved.is_empty(),
        TransitionRule::Threshold(n) => approved.len() >= n as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<ActorId> {
        ids.iter().map(|id| ActorId::new(*id)).collect()
    }

    #[test]
    fn test_all_approve_needs_every_eligible_approver() {
        let eligible = set(&["a", "b"]);
        assert!(!is_satisfied(TransitionRule::AllApprove, &eligible, &set(&[])));
        assert!(!is_satisfied(TransitionRule::AllApprove, &eligible, &set(&["a"])));
        assert!(is_satisfied(TransitionRule::AllApprove, &eligible, &set(&["a", "b"])));
    }

    #[test]
    fn test_all_approve_with_empty_role_never_passes() {
        assert!(!is_satisfied(TransitionRule::AllApprove, &set(&[]), &set(&["x"])));
    }

    #[test]
    fn test_any_approve() {
        let eligible = set(&["a", "b", "c"]);
        assert!(!is_satisfied(TransitionRule::AnyApprove, &eligible, &set(&[])));
        assert!(is_satisfied(TransitionRule::AnyApprove, &eligible, &set(&["c"])));
    }

    #[test]
    fn test_threshold() {
        let eligible = set(&["a", "b", "c"]);
        assert!(!is_satisfied(TransitionRule::Threshold(2), &eligible, &set(&["a"])));
        assert!(is_satisfied(TransitionRule::Threshold(2), &eligible, &set(&["a", "c"])));
        assert!(is_satisfied(TransitionRule::Threshold(2), &eligible, &set(&["a", "b", "c"])));
    }
}
