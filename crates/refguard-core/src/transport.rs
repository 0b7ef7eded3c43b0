//! Synchronization between repository copies
//!
//! Transfers are object-first: every object missing on the receiving side is
//! copied before any reference there moves, so a reference never points at an
//! absent object. Reference moves use the receiver's compare-and-swap.

use crate::backend::Repository;
use crate::errors::Result;
use crate::hash::ObjectId;

/// Copy every object `to` lacks; returns how many were transferred
pub fn copy_objects<A, B>(from: &A, to: &B) -> Result<usize>
where
    A: Repository + ?Sized,
    B: Repository + ?Sized,
{
    let mut copied = 0;
    for id in from.object_ids()? {
        if !to.has_object(&id)? {
            let bytes = from.get_object(&id)?;
            to.put_object(&bytes)?;
            copied += 1;
        }
    }
    tracing::debug!(copied, "objects transferred");
    Ok(copied)
}

/// Populate `to` with every object and reference of `from`
pub fn clone_repository<A, B>(from: &A, to: &B) -> Result<()>
where
    A: Repository + ?Sized,
    B: Repository + ?Sized,
{
    copy_objects(from, to)?;
    for (name, target) in from.list_refs()? {
        let current = to.read_ref(&name)?;
        to.update_ref(&name, target, current)?;
    }
    tracing::info!("repository cloned");
    Ok(())
}

/// Move `name` on `to` to `target`, provided `to` still holds `expected`
///
/// Objects are transferred first. Fails with `RefConflict` if the receiving
/// reference moved in the meantime.
pub fn transfer_ref<A, B>(
    from: &A,
    to: &B,
    name: &str,
    target: ObjectId,
    expected: Option<ObjectId>,
) -> Result<()>
where
    A: Repository + ?Sized,
    B: Repository + ?Sized,
{
    copy_objects(from, to)?;
    to.update_ref(name, target, expected)?;
    tracing::debug!(reference = name, target = %target.short(), "reference transferred");
    Ok(())
}
