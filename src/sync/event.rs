//! # Change Events
//!
//! Row-level change notifications and the table/predicate specs that
//! channels use to express interest in them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a backing table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub String);

impl TableId {
    /// Create a table ID
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Table name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a workspace (the tenant-scoping unit)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    /// Create a workspace ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Workspace ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// New record inserted
    Insert,
    /// Existing record updated
    Update,
    /// Record deleted
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "INSERT"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// A row-level change notification from the backend transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the change occurred in
    pub table: TableId,

    /// Operation kind
    pub operation: Operation,

    /// Changed record ID
    pub record_id: String,

    /// Workspace the record belongs to
    pub workspace_id: WorkspaceId,

    /// Commit timestamp of the change
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an event (primarily for tests and fakes)
    pub fn new(
        table: impl Into<String>,
        operation: Operation,
        record_id: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            table: TableId::new(table),
            operation,
            record_id: record_id.into(),
            workspace_id: WorkspaceId::new(workspace_id),
            timestamp: Utc::now(),
        }
    }
}

/// Predicate a channel applies to events on one table
#[derive(Clone)]
pub enum Predicate {
    /// Match events belonging to one workspace
    Workspace(WorkspaceId),

    /// Match events by a caller-supplied function.
    ///
    /// The name identifies the predicate for transport-subscription
    /// deduplication; two custom predicates with the same name on the same
    /// table share one backend subscription.
    Custom {
        name: String,
        filter: Arc<dyn Fn(&ChangeEvent) -> bool + Send + Sync>,
    },
}

impl Predicate {
    /// Predicate matching one workspace
    pub fn workspace(id: impl Into<String>) -> Self {
        Self::Workspace(WorkspaceId::new(id))
    }

    /// Named custom predicate
    pub fn custom<F>(name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&ChangeEvent) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            filter: Arc::new(filter),
        }
    }

    /// Check whether an event passes this predicate
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Predicate::Workspace(ws) => &event.workspace_id == ws,
            Predicate::Custom { filter, .. } => filter(event),
        }
    }

    /// Stable key used to deduplicate backend subscriptions
    pub fn key(&self) -> String {
        match self {
            Predicate::Workspace(ws) => format!("workspace_id=eq.{}", ws),
            Predicate::Custom { name, .. } => format!("custom:{}", name),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Workspace(ws) => f.debug_tuple("Workspace").field(ws).finish(),
            Predicate::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

/// One table a channel observes, with the predicate applied to it
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Observed table
    pub table: TableId,

    /// Predicate applied to events on that table
    pub predicate: Predicate,
}

impl TableSpec {
    /// Spec observing one table scoped to a workspace
    pub fn workspace(table: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            table: TableId::new(table),
            predicate: Predicate::workspace(workspace),
        }
    }

    /// Check whether an event matches table and predicate
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && self.predicate.matches(event)
    }

    /// Deduplication key for the backend subscription this spec needs
    pub fn subscription_key(&self) -> SubscriptionKey {
        SubscriptionKey {
            table: self.table.clone(),
            predicate: self.predicate.key(),
        }
    }
}

/// Identity of a shared backend subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Observed table
    pub table: TableId,
    /// Predicate key
    pub predicate: String,
}
