//! Transaction state: the ordered updates of one configuration change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use keaflow_core::DaemonId;

use crate::error::ConfigError;

/// Target of every update produced by this crate.
pub const KEA_TARGET: &str = "kea";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Kind of entity an operation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Host,
    Subnet,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Host => f.write_str("host"),
            EntityKind::Subnet => f.write_str("subnet"),
        }
    }
}

/// A configuration change supported by the transaction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    HostAdd,
    HostUpdate,
    HostDelete,
    SubnetAdd,
    SubnetUpdate,
    SubnetDelete,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::HostAdd,
        Operation::HostUpdate,
        Operation::HostDelete,
        Operation::SubnetAdd,
        Operation::SubnetUpdate,
        Operation::SubnetDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::HostAdd => "host_add",
            Operation::HostUpdate => "host_update",
            Operation::HostDelete => "host_delete",
            Operation::SubnetAdd => "subnet_add",
            Operation::SubnetUpdate => "subnet_update",
            Operation::SubnetDelete => "subnet_delete",
        }
    }

    pub fn entity(self) -> EntityKind {
        match self {
            Operation::HostAdd | Operation::HostUpdate | Operation::HostDelete => EntityKind::Host,
            Operation::SubnetAdd | Operation::SubnetUpdate | Operation::SubnetDelete => {
                EntityKind::Subnet
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownOperation(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// One pending change and the recipe carrying it through the stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<R> {
    pub target: String,
    pub operation: Operation,
    /// Daemons the change touches.
    pub daemon_ids: Vec<DaemonId>,
    pub recipe: R,
}

impl<R> Update<R> {
    pub fn new(operation: Operation, daemon_ids: Vec<DaemonId>, recipe: R) -> Self {
        Self {
            target: KEA_TARGET.to_owned(),
            operation,
            daemon_ids,
            recipe,
        }
    }
}

/// Pending updates of a transaction, in the order they are committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionState<R> {
    pub updates: Vec<Update<R>>,
}

impl<R> TransactionState<R> {
    pub fn new_with_update(update: Update<R>) -> Self {
        Self {
            updates: vec![update],
        }
    }

    pub fn recipe_for_update(&self, index: usize) -> Result<&R, ConfigError> {
        self.updates
            .get(index)
            .map(|update| &update.recipe)
            .ok_or_else(|| missing_update(index))
    }

    pub fn recipe_for_update_mut(&mut self, index: usize) -> Result<&mut R, ConfigError> {
        self.updates
            .get_mut(index)
            .map(|update| &mut update.recipe)
            .ok_or_else(|| missing_update(index))
    }

    /// Replaces the recipe of the `index`th update.
    pub fn set_recipe_for_update(&mut self, index: usize, recipe: R) -> Result<(), ConfigError> {
        *self.recipe_for_update_mut(index)? = recipe;
        Ok(())
    }
}

fn missing_update(index: usize) -> ConfigError {
    ConfigError::Logic(format!("transaction has no update with index {index}"))
}
