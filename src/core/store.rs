//! The kernel rule-table boundary
//!
//! The packet-filter kernel module is an external, effectful dependency
//! reached only through the narrow call set below. A [`TableHandle`] is
//! an open, stateful session over one table's rule set: mutations stay
//! pending inside the handle until [`TableHandle::commit`], and any
//! commit attempt — successful or not — invalidates the handle, so the
//! backend recreates all of its handles after every commit pass.
//!
//! Failures carry the store's own error text as
//! [`StoreError`](crate::core::error::StoreError) values; freeing a
//! handle is `Drop`.

use crate::core::error::StoreError;
use crate::core::record::RuleRecord;

/// One open session over a single table's rule set.
pub trait TableHandle: Send + std::fmt::Debug {
    /// Chain names in the store's enumeration order (not sorted).
    fn chain_names(&self) -> Vec<String>;

    /// The chain's rule records, head first.
    ///
    /// # Errors
    ///
    /// Fails for an unknown chain or an invalidated handle.
    fn rules(&self, chain: &str) -> Result<Vec<RuleRecord>, StoreError>;

    /// Creates an empty user chain.
    ///
    /// # Errors
    ///
    /// Fails for a duplicate chain name or an invalidated handle.
    fn create_chain(&mut self, chain: &str) -> Result<(), StoreError>;

    /// Deletes a user chain.
    ///
    /// # Errors
    ///
    /// Fails for an unknown chain, a built-in chain, or an invalidated
    /// handle.
    fn delete_chain(&mut self, chain: &str) -> Result<(), StoreError>;

    /// Inserts a rule record before the rule currently at `position`.
    ///
    /// # Errors
    ///
    /// Fails when `position` exceeds the chain length, for an unknown
    /// chain, or an invalidated handle.
    fn insert_entry(
        &mut self,
        chain: &str,
        record: &RuleRecord,
        position: usize,
    ) -> Result<(), StoreError>;

    /// Appends a rule record at the chain tail.
    ///
    /// # Errors
    ///
    /// Fails for an unknown chain or an invalidated handle.
    fn append_entry(&mut self, chain: &str, record: &RuleRecord) -> Result<(), StoreError>;

    /// Replaces the rule at `position` with `record`.
    ///
    /// # Errors
    ///
    /// Fails when `position` is out of range, for an unknown chain, or
    /// an invalidated handle.
    fn replace_entry(
        &mut self,
        chain: &str,
        record: &RuleRecord,
        position: usize,
    ) -> Result<(), StoreError>;

    /// Deletes the rule at `position`.
    ///
    /// # Errors
    ///
    /// Fails when `position` is out of range, for an unknown chain, or
    /// an invalidated handle.
    fn delete_entry(&mut self, chain: &str, position: usize) -> Result<(), StoreError>;

    /// Publishes every pending mutation. The handle is invalid
    /// afterwards whether or not the commit succeeded.
    ///
    /// # Errors
    ///
    /// Fails when the store rejects the pending rule set.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// The target name of a record owned by this handle's table, empty
    /// when the record carries no named target.
    fn target_name(&self, record: &RuleRecord) -> String;
}

/// Opens table sessions. The backend holds one implementation for its
/// whole lifetime and reopens handles through it after every commit.
pub trait RuleStore: Send + Sync {
    /// Opens a fresh session over `table`.
    ///
    /// # Errors
    ///
    /// Fails for a table name the store does not know.
    fn open(&self, table: &str) -> Result<Box<dyn TableHandle>, StoreError>;
}
