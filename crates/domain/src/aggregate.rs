//! Core aggregate trait.

use record_store::Version;

/// Trait for aggregates backed by versioned rows.
///
/// An aggregate is a cluster of rows that is loaded, changed and committed
/// as a single unit. Decision methods never mutate the aggregate: they
/// return the row-level changes to commit. Once the store accepted a
/// commit, the same changes are applied to the in-memory aggregate so it
/// mirrors the stored state without a reload.
pub trait Aggregate: Send + Sync + Sized {
    /// The row-level change this aggregate produces and consumes.
    type Change: Clone + Send + Sync;

    /// Returns the aggregate type name, used in logs.
    fn aggregate_type() -> &'static str;

    /// Returns the stored version of the aggregate.
    ///
    /// Version 0 means nothing has been committed yet.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called after a commit is accepted.
    fn set_version(&mut self, version: Version);

    /// Applies a change to the aggregate.
    ///
    /// This method must be pure and deterministic and must not fail: the
    /// change was already accepted by the store.
    fn apply(&mut self, change: Self::Change);

    /// Applies multiple changes in sequence.
    fn apply_all(&mut self, changes: impl IntoIterator<Item = Self::Change>) {
        for change in changes {
            self.apply(change);
        }
    }

    /// Returns true if the aggregate has been committed at least once.
    fn is_persisted(&self) -> bool {
        !self.version().is_initial()
    }
}
