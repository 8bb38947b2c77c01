//! Review workflow: draft -> pending -> accepted | rejected.
//!
//! Guards run once per submission, before anything is compiled. A refused
//! transition is a `PermissionDenied` and no statement gets built.

use inventory_common::{InventoryError, Result, ReviewStatus, UserRole};

use crate::predicate::Predicate;

/// Status of a fresh submission. `accept` asks for immediate acceptance.
pub fn initial_status(role: UserRole, accept: bool) -> Result<ReviewStatus> {
    if role < UserRole::Contributor {
        return Err(InventoryError::PermissionDenied(
            "anonymous users cannot submit entries".to_string(),
        ));
    }
    if !accept {
        return Ok(ReviewStatus::Pending);
    }
    if role >= UserRole::Reviewer {
        Ok(ReviewStatus::Accepted)
    } else {
        Err(InventoryError::PermissionDenied(format!(
            "{role} cannot accept entries"
        )))
    }
}

/// Satellite entities created alongside a submission start out as drafts.
pub fn stub_status() -> ReviewStatus {
    ReviewStatus::Draft
}

/// Lowest role that may move an entry from `from` to `to`.
pub fn required_role(from: ReviewStatus, to: ReviewStatus) -> UserRole {
    use ReviewStatus::*;

    match (from, to) {
        (Draft, Draft | Pending) => UserRole::Contributor,
        (Draft | Pending, Accepted | Rejected) => UserRole::Reviewer,
        (Pending, Pending) => UserRole::Contributor,
        (Pending, Draft) => UserRole::Admin,
        (from, to) if from == to => UserRole::Contributor,
        // re-opening a decided entry
        _ => UserRole::Admin,
    }
}

pub fn transition(from: ReviewStatus, to: ReviewStatus, role: UserRole) -> Result<ReviewStatus> {
    let needed = required_role(from, to);
    if role >= needed {
        Ok(to)
    } else {
        Err(InventoryError::PermissionDenied(format!(
            "{from} -> {to} requires {needed}, got {role}"
        )))
    }
}

/// Reviewers may edit any entry, everyone else only their own.
pub fn check_edit_access(role: UserRole, is_owner: bool) -> Result<()> {
    if role >= UserRole::Reviewer || (is_owner && role >= UserRole::Contributor) {
        Ok(())
    } else {
        Err(InventoryError::PermissionDenied(
            "only the submitter or a reviewer can edit this entry".to_string(),
        ))
    }
}

/// Whether `role` may set `predicate` on a new entry.
pub fn writable_on_new(predicate: &Predicate, role: UserRole) -> bool {
    !predicate.read_only && role >= predicate.permission_new
}

/// Whether `role` may change `predicate` on an entry in `status`. Once an
/// entry has left draft only predicates flagged `edit` stay open.
pub fn writable_on_edit(predicate: &Predicate, status: ReviewStatus, role: UserRole) -> bool {
    !predicate.read_only
        && role >= predicate.permission_edit
        && (predicate.edit || status == ReviewStatus::Draft)
}
