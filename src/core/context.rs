//! Navigation context for the table/chain/rule hierarchy
//!
//! A [`FirewallContext`] describes "where" in the hierarchy a caller
//! currently is. Contexts are created immutably from a parent plus a
//! name and shared via [`FwCtx`]; the only mutable part is the
//! last-error slot, which operations fill in post-hoc to report their
//! outcome. The slot is context-scoped rather than global so that two
//! concurrent navigation branches (e.g. two open dialogs) do not
//! clobber each other's diagnostics.

use std::sync::{Arc, Mutex};

/// Depth in the table/chain/rule hierarchy.
///
/// Levels only ever increase, one step per [`FirewallContext::descend`]
/// call; "going back" is discarding the context and reusing the parent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, strum::Display, strum::EnumString,
)]
pub enum FirewallLevel {
    /// Top level: the static table list.
    #[default]
    #[strum(serialize = "overall")]
    Overall,
    /// Inside one table, looking at its chains.
    #[strum(serialize = "table")]
    Table,
    /// Inside one chain, looking at its rules.
    #[strum(serialize = "chain")]
    Chain,
}

/// Shared handle to a navigation context.
pub type FwCtx = Arc<FirewallContext>;

/// One level of the navigation hierarchy plus its diagnostics slot.
#[derive(Debug, Default)]
pub struct FirewallContext {
    level: FirewallLevel,
    table: String,
    chain: String,
    last_error: Mutex<String>,
}

impl FirewallContext {
    /// Creates the top-level context.
    pub fn root() -> FwCtx {
        Arc::new(Self::default())
    }

    /// Creates the child context one level below `parent`, named `name`.
    ///
    /// Descending from chain level is invalid; the call records an
    /// error on `parent` and returns it unchanged instead of failing
    /// hard, so a caller driving a UI does not crash on a stray click.
    pub fn descend(parent: &FwCtx, name: &str) -> FwCtx {
        match parent.level {
            FirewallLevel::Overall => Arc::new(Self {
                level: FirewallLevel::Table,
                table: name.to_string(),
                chain: String::new(),
                last_error: Mutex::new(String::new()),
            }),
            FirewallLevel::Table => Arc::new(Self {
                level: FirewallLevel::Chain,
                table: parent.table.clone(),
                chain: name.to_string(),
                last_error: Mutex::new(String::new()),
            }),
            FirewallLevel::Chain => {
                tracing::error!("cannot descend from chain level");
                parent.set_last_error("Cannot descend from chain level.");
                Arc::clone(parent)
            }
        }
    }

    pub fn level(&self) -> FirewallLevel {
        self.level
    }

    /// Table name; empty above table level.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Chain name; empty above chain level.
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Human-readable label for UI titles and error messages.
    pub fn describe(&self) -> String {
        let mut described = String::from("Firewall Config");

        if self.level > FirewallLevel::Overall {
            described.push_str(" | Table: ");
            described.push_str(&self.table);
        }

        if self.level > FirewallLevel::Table {
            described.push_str(" | Chain: ");
            described.push_str(&self.chain);
        }

        described
    }

    /// Records the outcome of the operation that used this context.
    pub fn set_last_error(&self, error: impl Into<String>) {
        *self.last_error.lock().expect("last_error lock poisoned") = error.into();
    }

    /// The last recorded diagnostic, or a fixed sentinel when nothing
    /// has been recorded yet.
    pub fn last_error(&self) -> String {
        let slot = self.last_error.lock().expect("last_error lock poisoned");
        if slot.is_empty() {
            "No Error Recorded.".to_string()
        } else {
            slot.clone()
        }
    }

    /// Whether an error has been recorded on this context.
    pub fn has_error(&self) -> bool {
        !self.last_error.lock().expect("last_error lock poisoned").is_empty()
    }
}
