//! Resolving who an acting user may decide for

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use super::approval_types::{ActorId, Delegation};
use super::definition::Step;
use super::traits::Directory;

/// Effective actor set for one nominal approver of a step:
/// the approver, the step's static substitute, and every delegate whose
/// range covers `now`.
pub fn effective_actors(
    approver: &ActorId,
    step: &Step,
    delegations: &[Delegation],
    now: DateTime<Utc>,
) -> BTreeSet<ActorId> {
    let mut actors = BTreeSet::from([approver.clone()]);

    if let Some(substitute) = &step.delegate_to {
        actors.insert(substitute.clone());
    }

    actors.extend(
        delegations
            .iter()
            .filter(|d| &d.approver == approver && d.is_active_at(now))
            .map(|d| d.delegate.clone()),
    );

    actors
}

/// Nominal approver that `actor` decides for at `step`, if any.
///
/// A nominal approver whose own slot is still open decides for themselves.
/// Otherwise the actor is assigned the first approver they represent (in id
/// order) that has not yet approved the step. When every slot the actor could
/// fill is taken, their own slot (or the first represented one) is returned so
/// the caller can report the duplicate.
pub fn resolve_authority(
    actor: &ActorId,
    step: &Step,
    directory: &dyn Directory,
    delegations: &[Delegation],
    already_approved: &BTreeSet<ActorId>,
    now: DateTime<Utc>,
) -> Option<ActorId> {
    let nominal = step.approvers.includes(actor, directory);
    if nominal && !already_approved.contains(actor) {
        return Some(actor.clone());
    }

    let represented: Vec<ActorId> = step
        .approvers
        .eligible(directory)
        .into_iter()
        .filter(|approver| approver != actor)
        .filter(|approver| effective_actors(approver, step, delegations, now).contains(actor))
        .collect();

    represented
        .iter()
        .find(|approver| !already_approved.contains(*approver))
        .cloned()
        .or_else(|| {
            if nominal {
                Some(actor.clone())
            } else {
                represented.first().cloned()
            }
        })
}
