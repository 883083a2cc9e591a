//! In-memory rule store
//!
//! A [`MemStore`] implements the same session contract as the kernel
//! store: opening a handle snapshots the table, mutations stay pending
//! inside the handle, and a commit publishes the snapshot wholesale and
//! invalidates the handle. The test suite and unprivileged dry runs
//! drive the backend through this store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::catalog::TABLE_NAMES;
use crate::core::error::StoreError;
use crate::core::record::RuleRecord;
use crate::core::store::{RuleStore, TableHandle};

#[derive(Debug, Clone)]
struct ChainEntry {
    name: String,
    builtin: bool,
    rules: Vec<RuleRecord>,
}

type Tables = HashMap<String, Vec<ChainEntry>>;

/// Shared, committed rule state for all tables.
#[derive(Debug, Clone)]
pub struct MemStore {
    tables: Arc<Mutex<Tables>>,
}

/// Built-in chains per table, mirroring the kernel's registration.
fn builtin_chains(table: &str) -> &'static [&'static str] {
    match table {
        "filter" => &["INPUT", "FORWARD", "OUTPUT"],
        "nat" => &["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"],
        "mangle" => &["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"],
        "raw" => &["PREROUTING", "OUTPUT"],
        _ => &[],
    }
}

impl MemStore {
    /// Creates a store seeded with the static tables and their
    /// built-in chains, all empty.
    pub fn new() -> Self {
        let mut tables = Tables::new();
        for &table in TABLE_NAMES {
            let chains = builtin_chains(table)
                .iter()
                .map(|&name| ChainEntry {
                    name: name.to_string(),
                    builtin: true,
                    rules: Vec::new(),
                })
                .collect();
            tables.insert(table.to_string(), chains);
        }

        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for MemStore {
    fn open(&self, table: &str) -> Result<Box<dyn TableHandle>, StoreError> {
        let tables = self.tables.lock().expect("table store lock poisoned");
        let chains = tables
            .get(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?
            .clone();

        Ok(Box::new(MemHandle {
            table: table.to_string(),
            chains,
            shared: Arc::clone(&self.tables),
            committed: false,
        }))
    }
}

/// One pending session over a [`MemStore`] table.
#[derive(Debug)]
struct MemHandle {
    table: String,
    chains: Vec<ChainEntry>,
    shared: Arc<Mutex<Tables>>,
    committed: bool,
}

impl MemHandle {
    fn live(&self) -> Result<(), StoreError> {
        if self.committed {
            Err(StoreError::HandleInvalidated)
        } else {
            Ok(())
        }
    }

    fn chain(&self, name: &str) -> Result<&ChainEntry, StoreError> {
        self.chains
            .iter()
            .find(|chain| chain.name == name)
            .ok_or_else(|| StoreError::NoSuchChain(name.to_string()))
    }

    fn chain_mut(&mut self, name: &str) -> Result<&mut ChainEntry, StoreError> {
        self.chains
            .iter_mut()
            .find(|chain| chain.name == name)
            .ok_or_else(|| StoreError::NoSuchChain(name.to_string()))
    }
}

impl TableHandle for MemHandle {
    fn chain_names(&self) -> Vec<String> {
        self.chains.iter().map(|chain| chain.name.clone()).collect()
    }

    fn rules(&self, chain: &str) -> Result<Vec<RuleRecord>, StoreError> {
        self.live()?;
        Ok(self.chain(chain)?.rules.clone())
    }

    fn create_chain(&mut self, chain: &str) -> Result<(), StoreError> {
        self.live()?;
        if self.chains.iter().any(|entry| entry.name == chain) {
            return Err(StoreError::DuplicateChain(chain.to_string()));
        }

        self.chains.push(ChainEntry {
            name: chain.to_string(),
            builtin: false,
            rules: Vec::new(),
        });
        Ok(())
    }

    fn delete_chain(&mut self, chain: &str) -> Result<(), StoreError> {
        self.live()?;
        let entry = self.chain(chain)?;
        if entry.builtin {
            return Err(StoreError::BuiltinChain(chain.to_string()));
        }

        self.chains.retain(|entry| entry.name != chain);
        Ok(())
    }

    fn insert_entry(
        &mut self,
        chain: &str,
        record: &RuleRecord,
        position: usize,
    ) -> Result<(), StoreError> {
        self.live()?;
        let entry = self.chain_mut(chain)?;
        if position > entry.rules.len() {
            return Err(StoreError::BadPosition {
                chain: chain.to_string(),
                position,
                len: entry.rules.len(),
            });
        }

        entry.rules.insert(position, record.clone());
        Ok(())
    }

    fn append_entry(&mut self, chain: &str, record: &RuleRecord) -> Result<(), StoreError> {
        self.live()?;
        self.chain_mut(chain)?.rules.push(record.clone());
        Ok(())
    }

    fn replace_entry(
        &mut self,
        chain: &str,
        record: &RuleRecord,
        position: usize,
    ) -> Result<(), StoreError> {
        self.live()?;
        let entry = self.chain_mut(chain)?;
        if position >= entry.rules.len() {
            return Err(StoreError::BadPosition {
                chain: chain.to_string(),
                position,
                len: entry.rules.len(),
            });
        }

        entry.rules[position] = record.clone();
        Ok(())
    }

    fn delete_entry(&mut self, chain: &str, position: usize) -> Result<(), StoreError> {
        self.live()?;
        let entry = self.chain_mut(chain)?;
        if position >= entry.rules.len() {
            return Err(StoreError::BadPosition {
                chain: chain.to_string(),
                position,
                len: entry.rules.len(),
            });
        }

        entry.rules.remove(position);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.live()?;
        // Invalidated from here on, even if publishing fails.
        self.committed = true;

        let mut tables = self.shared.lock().expect("table store lock poisoned");
        match tables.get_mut(&self.table) {
            Some(chains) => {
                *chains = self.chains.clone();
                Ok(())
            }
            None => Err(StoreError::Commit(format!(
                "table {} vanished from the store",
                self.table
            ))),
        }
    }

    fn target_name(&self, record: &RuleRecord) -> String {
        record
            .target_block()
            .map(|target| target.name)
            .unwrap_or_default()
    }
}
