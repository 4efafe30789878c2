//! Conflict resolution decisions.

use std::fmt;

/// How to reconcile a remote item with a conflicting local one.
///
/// Produced once per conflicting pair by a conflict resolver and applied
/// by the entity processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution<E> {
    /// Persist the remote item, keeping the local identity and client-only flags.
    UseTheirs,
    /// Keep the local item; the remote one is not written.
    UseMine,
    /// Persist the remote item, discarding client-only flags of the local one.
    IgnoreMine,
    /// Persist the given replacement for the local item under a fresh
    /// identity, then persist the remote item.
    MoveMine(E),
}

impl<E> ConflictResolution<E> {
    /// Returns the variant name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConflictResolution::UseTheirs => "use-theirs",
            ConflictResolution::UseMine => "use-mine",
            ConflictResolution::IgnoreMine => "ignore-mine",
            ConflictResolution::MoveMine(_) => "move-mine",
        }
    }

    /// Returns true if the remote item gets written.
    pub fn writes_theirs(&self) -> bool {
        !matches!(self, ConflictResolution::UseMine)
    }

    /// Maps the replacement payload.
    pub fn map<F, T>(self, f: F) -> ConflictResolution<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ConflictResolution::UseTheirs => ConflictResolution::UseTheirs,
            ConflictResolution::UseMine => ConflictResolution::UseMine,
            ConflictResolution::IgnoreMine => ConflictResolution::IgnoreMine,
            ConflictResolution::MoveMine(replacement) => {
                ConflictResolution::MoveMine(f(replacement))
            }
        }
    }
}

impl<E> fmt::Display for ConflictResolution<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
