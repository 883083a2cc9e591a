//! Firewall backend: per-table handles, traversal and mutation
//!
//! The backend owns one open [`TableHandle`] per static table name and
//! resolves every navigation context to the right handle. Expected
//! failures never unwind: mutating operations return `false` with the
//! store's error text recorded on the context, and reads soft-fail the
//! same way. The only fatal condition is failing to open a table handle
//! at construction — a backend with a partially-open table set cannot
//! be trusted for count-based insert/append decisions.
//!
//! Committing goes through [`FirewallBackend::apply`], which hands back
//! a deferred [`CommitAction`]: running it commits every table handle
//! in turn and then unconditionally tears down and reopens all handles,
//! because the store invalidates a handle on any commit attempt.
//! Callers may not assume handles survive an apply, whether it
//! succeeded or failed.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditLog, EventType};
use crate::core::catalog;
use crate::core::context::{FirewallContext, FirewallLevel, FwCtx};
use crate::core::error::{Error, Result, StoreError};
use crate::core::request::{ChainRequest, RuleRequest};
use crate::core::store::{RuleStore, TableHandle};
use crate::validators;

type HandleMap = HashMap<String, Box<dyn TableHandle>>;

/// Rule manager over one rule store, holding one open handle per table.
pub struct FirewallBackend {
    store: Arc<dyn RuleStore>,
    handles: Arc<Mutex<HandleMap>>,
    audit: Option<AuditLog>,
}

impl FirewallBackend {
    /// Opens a handle for every static table name.
    ///
    /// # Errors
    ///
    /// Fails when any table cannot be opened; the backend is unusable
    /// with a partial table set, so construction is all-or-nothing.
    pub fn new(store: Arc<dyn RuleStore>) -> Result<Self> {
        let handles = open_all(store.as_ref())?;
        info!(tables = catalog::TABLE_NAMES.len(), "rule-table handles open");

        Ok(Self {
            store,
            handles: Arc::new(Mutex::new(handles)),
            audit: None,
        })
    }

    /// Like [`FirewallBackend::new`], with mutations recorded to `audit`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`FirewallBackend::new`].
    pub fn with_audit(store: Arc<dyn RuleStore>, audit: AuditLog) -> Result<Self> {
        let mut backend = Self::new(store)?;
        backend.audit = Some(audit);
        Ok(backend)
    }

    /// The static table list.
    pub fn table_names() -> &'static [&'static str] {
        catalog::TABLE_NAMES
    }

    /// Descends one level from `current`; see
    /// [`FirewallContext::descend`] for the chain-level soft-failure.
    pub fn create_context(current: &FwCtx, name: &str) -> FwCtx {
        FirewallContext::descend(current, name)
    }

    fn lock_handles(&self) -> MutexGuard<'_, HandleMap> {
        self.handles.lock().expect("handle map lock poisoned")
    }

    fn record_audit(&self, event_type: EventType, success: bool, context: &FirewallContext, error: Option<String>) {
        let Some(audit) = &self.audit else { return };

        let details = json!({
            "table": context.table(),
            "chain": context.chain(),
        });
        if let Err(err) = audit.log(&AuditEvent::new(event_type, success, details, error)) {
            warn!("audit write failed: {err}");
        }
    }

    /// Lists the items one level below `context`: table names at the
    /// top, chain names inside a table, one summary line per rule
    /// inside a chain. Always re-derived from the live handle state.
    pub fn children(&self, context: &FwCtx) -> Vec<String> {
        match context.level() {
            FirewallLevel::Overall => catalog::TABLE_NAMES
                .iter()
                .map(ToString::to_string)
                .collect(),
            FirewallLevel::Table => {
                let handles = self.lock_handles();
                match handles.get(context.table()) {
                    Some(handle) => handle.chain_names(),
                    None => {
                        context
                            .set_last_error(StoreError::NoSuchTable(context.table().to_string()).to_string());
                        Vec::new()
                    }
                }
            }
            FirewallLevel::Chain => {
                let handles = self.lock_handles();
                let Some(handle) = handles.get(context.table()) else {
                    context.set_last_error(
                        StoreError::NoSuchTable(context.table().to_string()).to_string(),
                    );
                    return Vec::new();
                };

                let records = match handle.rules(context.chain()) {
                    Ok(records) => records,
                    Err(err) => {
                        context.set_last_error(err.to_string());
                        return Vec::new();
                    }
                };

                let mut lines = Vec::with_capacity(records.len());
                for (index, record) in records.iter().enumerate() {
                    match RuleRequest::decode(handle.as_ref(), record, index) {
                        Ok(request) => lines.push(request.summary()),
                        Err(err) => {
                            warn!("undecodable rule {index} in {}: {err}", context.describe());
                            context.set_last_error(err.to_string());
                        }
                    }
                }
                lines
            }
        }
    }

    /// Verbose multi-line dump of the rule at `index`, walking the
    /// chain's rule list from its head.
    pub fn rule_details(&self, context: &FwCtx, index: usize) -> Option<String> {
        if context.level() != FirewallLevel::Chain {
            context.set_last_error("Rule details need a chain-level context.");
            return None;
        }

        let handles = self.lock_handles();
        let Some(handle) = handles.get(context.table()) else {
            context.set_last_error(StoreError::NoSuchTable(context.table().to_string()).to_string());
            return None;
        };
        let records = match handle.rules(context.chain()) {
            Ok(records) => records,
            Err(err) => {
                context.set_last_error(err.to_string());
                return None;
            }
        };

        let Some(record) = records.into_iter().nth(index) else {
            context.set_last_error(format!(
                "No rule #{index} in chain {}.",
                context.chain()
            ));
            return None;
        };

        let mut out = String::new();
        let _ = writeln!(out, "Source IP: {}", record.src());
        let _ = writeln!(out, "Destination IP: {}", record.dst());
        let _ = writeln!(out, "Source Mask: {}", record.src_mask());
        let _ = writeln!(out, "Destination Mask: {}", record.dst_mask());
        let _ = writeln!(
            out,
            "Protocol: {}",
            u8::try_from(record.proto())
                .ok()
                .map_or("UNKNOWN", catalog::proto_display)
        );
        let _ = writeln!(out, "Flags: {}", record.flags());
        let _ = writeln!(out, "Inverse Flags: {}", record.invflags());
        let _ = writeln!(
            out,
            "Input Interface: {}",
            record.in_iface().unwrap_or_default()
        );
        let _ = writeln!(
            out,
            "Output Interface: {}",
            record.out_iface().unwrap_or_default()
        );
        let _ = writeln!(out, "Target Offset: {}", record.target_offset());
        let _ = writeln!(out, "Next Offset: {}", record.next_offset());
        let _ = writeln!(out, "Packet Count: {}", record.packet_count());
        let _ = writeln!(out, "Byte Count: {}", record.byte_count());

        if let Ok(blocks) = record.match_blocks() {
            if let Some(block) = blocks.first() {
                let _ = writeln!(
                    out,
                    "Source Ports: {}:{}",
                    block.src_ports.0, block.src_ports.1
                );
                let _ = writeln!(
                    out,
                    "Destination Ports: {}:{}",
                    block.dst_ports.0, block.dst_ports.1
                );
            }
        }

        if record.has_target() {
            let _ = writeln!(out, "Target: {}", handle.target_name(&record));
        }

        Some(out)
    }

    /// Decodes the rule at `index` into an editable request.
    pub fn get_rule(&self, context: &FwCtx, index: usize) -> Option<RuleRequest> {
        if context.level() != FirewallLevel::Chain {
            context.set_last_error("Rules live below a chain-level context.");
            return None;
        }

        let handles = self.lock_handles();
        let Some(handle) = handles.get(context.table()) else {
            context.set_last_error(StoreError::NoSuchTable(context.table().to_string()).to_string());
            return None;
        };
        let records = match handle.rules(context.chain()) {
            Ok(records) => records,
            Err(err) => {
                context.set_last_error(err.to_string());
                return None;
            }
        };

        let len = records.len();
        let Some(record) = records.into_iter().nth(index) else {
            context.set_last_error(
                StoreError::BadPosition {
                    chain: context.chain().to_string(),
                    position: index,
                    len,
                }
                .to_string(),
            );
            return None;
        };

        match RuleRequest::decode(handle.as_ref(), &record, index) {
            Ok(request) => Some(request),
            Err(err) => {
                context.set_last_error(err.to_string());
                None
            }
        }
    }

    /// Creates the chain named by `request` in the context's table.
    pub fn insert_chain(&self, context: &FwCtx, request: &ChainRequest) -> bool {
        if context.level() != FirewallLevel::Table {
            context.set_last_error("Chains are created from a table-level context.");
            return false;
        }

        if let Err(err) = validators::validate_chain_name(&request.chain_name) {
            context.set_last_error(err.clone());
            self.record_audit(EventType::InsertChain, false, context, Some(err));
            return false;
        }

        let outcome = {
            let mut handles = self.lock_handles();
            match handles.get_mut(context.table()) {
                Some(handle) => handle.create_chain(&request.chain_name),
                None => Err(StoreError::NoSuchTable(context.table().to_string())),
            }
        };

        self.finish_mutation(EventType::InsertChain, context, outcome)
    }

    /// Removes the chain this context points at.
    pub fn remove_chain(&self, context: &FwCtx) -> bool {
        if context.level() != FirewallLevel::Chain {
            context.set_last_error("Chain removal needs a chain-level context.");
            return false;
        }

        let outcome = {
            let mut handles = self.lock_handles();
            match handles.get_mut(context.table()) {
                Some(handle) => handle.delete_chain(context.chain()),
                None => Err(StoreError::NoSuchTable(context.table().to_string())),
            }
        };

        self.finish_mutation(EventType::RemoveChain, context, outcome)
    }

    /// Encodes `request` and places it in the context's chain: a
    /// positional insert before the rule currently at `request.index`,
    /// or an append when the index is at or past the live rule count
    /// (fetched from the handle at call time, never cached).
    pub fn insert_rule(&self, context: &FwCtx, request: &RuleRequest) -> bool {
        if context.level() != FirewallLevel::Chain {
            context.set_last_error("Rules are inserted from a chain-level context.");
            return false;
        }

        let record = match request.encode() {
            Ok(record) => record,
            Err(err) => {
                debug!("rule encode failed: {err}");
                context.set_last_error(err.to_string());
                self.record_audit(EventType::InsertRule, false, context, Some(err.to_string()));
                return false;
            }
        };

        let outcome = {
            let mut handles = self.lock_handles();
            match handles.get_mut(context.table()) {
                Some(handle) => match handle.rules(context.chain()) {
                    Ok(rules) if request.index >= rules.len() => {
                        handle.append_entry(context.chain(), &record)
                    }
                    Ok(_) => handle.insert_entry(context.chain(), &record, request.index),
                    Err(err) => Err(err),
                },
                None => Err(StoreError::NoSuchTable(context.table().to_string())),
            }
        };

        self.finish_mutation(EventType::InsertRule, context, outcome)
    }

    /// Encodes `request` and replaces the rule at `index` with it.
    pub fn update_rule(&self, context: &FwCtx, request: &RuleRequest, index: usize) -> bool {
        if context.level() != FirewallLevel::Chain {
            context.set_last_error("Rules are updated from a chain-level context.");
            return false;
        }

        let record = match request.encode() {
            Ok(record) => record,
            Err(err) => {
                debug!("rule encode failed: {err}");
                context.set_last_error(err.to_string());
                self.record_audit(EventType::ReplaceRule, false, context, Some(err.to_string()));
                return false;
            }
        };

        let outcome = {
            let mut handles = self.lock_handles();
            match handles.get_mut(context.table()) {
                Some(handle) => handle.replace_entry(context.chain(), &record, index),
                None => Err(StoreError::NoSuchTable(context.table().to_string())),
            }
        };

        self.finish_mutation(EventType::ReplaceRule, context, outcome)
    }

    /// Deletes the rule at `index` from the context's chain.
    pub fn remove_rule(&self, context: &FwCtx, index: usize) -> bool {
        if context.level() != FirewallLevel::Chain {
            context.set_last_error("Rules are removed from a chain-level context.");
            return false;
        }

        let outcome = {
            let mut handles = self.lock_handles();
            match handles.get_mut(context.table()) {
                Some(handle) => handle.delete_entry(context.chain(), index),
                None => Err(StoreError::NoSuchTable(context.table().to_string())),
            }
        };

        self.finish_mutation(EventType::RemoveRule, context, outcome)
    }

    fn finish_mutation(
        &self,
        event_type: EventType,
        context: &FwCtx,
        outcome: std::result::Result<(), StoreError>,
    ) -> bool {
        match outcome {
            Ok(()) => {
                self.record_audit(event_type, true, context, None);
                true
            }
            Err(err) => {
                warn!("{} rejected: {err}", context.describe());
                context.set_last_error(err.to_string());
                self.record_audit(event_type, false, context, Some(err.to_string()));
                false
            }
        }
    }

    /// Returns the deferred commit action for every pending mutation.
    /// Nothing is committed until [`CommitAction::run`] is invoked.
    pub fn apply(&self) -> CommitAction {
        CommitAction {
            store: Arc::clone(&self.store),
            handles: Arc::clone(&self.handles),
            audit: self.audit.clone(),
        }
    }
}

fn open_all(store: &dyn RuleStore) -> Result<HandleMap> {
    let mut handles = HandleMap::with_capacity(catalog::TABLE_NAMES.len());
    for &table in catalog::TABLE_NAMES {
        match store.open(table) {
            Ok(handle) => {
                handles.insert(table.to_string(), handle);
            }
            Err(err) => {
                error!("opening table {table} failed: {err}");
                return Err(Error::Store(err));
            }
        }
    }
    Ok(handles)
}

/// Deferred commit over every table handle of one backend.
///
/// Running the action commits each handle in turn — one failure does
/// not stop the loop — and then unconditionally drops and reopens all
/// handles, leaving the backend valid whatever the outcome. The action
/// can be run repeatedly; each run commits the then-current handles.
pub struct CommitAction {
    store: Arc<dyn RuleStore>,
    handles: Arc<Mutex<HandleMap>>,
    audit: Option<AuditLog>,
}

impl CommitAction {
    /// Commits all tables and recreates the handle set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Commit`] listing every table whose commit
    /// or reopen failed. Handles are fresh afterwards either way.
    pub fn run(&self) -> Result<()> {
        let mut handles = self.handles.lock().expect("handle map lock poisoned");
        let mut failures = Vec::new();

        for (table, handle) in handles.iter_mut() {
            if let Err(err) = handle.commit() {
                error!("commit of table {table} failed: {err}");
                failures.push(format!("{table}: {err}"));
            }
        }

        // Handles are unusable after any commit attempt; recreate them
        // all before reporting the outcome.
        handles.clear();
        for &table in catalog::TABLE_NAMES {
            match self.store.open(table) {
                Ok(handle) => {
                    handles.insert(table.to_string(), handle);
                }
                Err(err) => {
                    error!("reopening table {table} failed: {err}");
                    failures.push(format!("{table}: reopen: {err}"));
                }
            }
        }
        drop(handles);

        let result = if failures.is_empty() {
            info!("committed all tables, handles recreated");
            Ok(())
        } else {
            Err(Error::Store(StoreError::Commit(failures.join("; "))))
        };

        if let Some(audit) = &self.audit {
            let event = AuditEvent::new(
                EventType::Commit,
                result.is_ok(),
                json!({ "tables": catalog::TABLE_NAMES }),
                result.as_ref().err().map(ToString::to_string),
            );
            if let Err(err) = audit.log(&event) {
                warn!("audit write failed: {err}");
            }
        }

        result
    }
}
