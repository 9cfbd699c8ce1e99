//! Recipes: commands and entity snapshots passed between Begin, Apply and
//! Commit.

use serde::{Deserialize, Serialize};

use keaflow_core::{App, DaemonId, Host, HostId, Subnet, SubnetId};
use keaflow_ctrl::Command;

use crate::error::ConfigError;
use crate::state::{EntityKind, Operation, Update};

/// A Kea command and the control agent it is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCommand {
    pub command: Command,
    pub app: App,
}

/// Host snapshots and identifiers of a host transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecipeParams {
    /// Host as loaded at Begin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Host>,
    /// Host as proposed at Apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Host>,
    /// Edited or deleted host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<HostId>,
}

/// Subnet snapshots and identifiers of a subnet transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRecipeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Subnet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Subnet>,
    /// Edited or deleted subnet, or the id assigned to an added subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<SubnetId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum RecipeParams {
    Host(HostRecipeParams),
    Subnet(SubnetRecipeParams),
}

/// Recipe of one Kea update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecipe {
    #[serde(default)]
    pub commands: Vec<ConfigCommand>,
    pub params: RecipeParams,
}

impl ConfigRecipe {
    /// Empty recipe for a change of `kind`.
    pub fn new(kind: EntityKind) -> Self {
        let params = match kind {
            EntityKind::Host => RecipeParams::Host(HostRecipeParams::default()),
            EntityKind::Subnet => RecipeParams::Subnet(SubnetRecipeParams::default()),
        };
        Self {
            commands: vec![],
            params,
        }
    }

    pub fn with_host(params: HostRecipeParams) -> Self {
        Self {
            commands: vec![],
            params: RecipeParams::Host(params),
        }
    }

    pub fn with_subnet(params: SubnetRecipeParams) -> Self {
        Self {
            commands: vec![],
            params: RecipeParams::Subnet(params),
        }
    }

    pub fn host_params(&self) -> Result<&HostRecipeParams, ConfigError> {
        match &self.params {
            RecipeParams::Host(params) => Ok(params),
            RecipeParams::Subnet(_) => Err(wrong_params(EntityKind::Host)),
        }
    }

    pub fn host_params_mut(&mut self) -> Result<&mut HostRecipeParams, ConfigError> {
        match &mut self.params {
            RecipeParams::Host(params) => Ok(params),
            RecipeParams::Subnet(_) => Err(wrong_params(EntityKind::Host)),
        }
    }

    pub fn subnet_params(&self) -> Result<&SubnetRecipeParams, ConfigError> {
        match &self.params {
            RecipeParams::Subnet(params) => Ok(params),
            RecipeParams::Host(_) => Err(wrong_params(EntityKind::Subnet)),
        }
    }

    pub fn subnet_params_mut(&mut self) -> Result<&mut SubnetRecipeParams, ConfigError> {
        match &mut self.params {
            RecipeParams::Subnet(params) => Ok(params),
            RecipeParams::Host(_) => Err(wrong_params(EntityKind::Subnet)),
        }
    }
}

fn wrong_params(expected: EntityKind) -> ConfigError {
    ConfigError::Logic(format!("recipe does not carry {expected} parameters"))
}

// ---------------------------------------------------------------------------
// Stored updates
// ---------------------------------------------------------------------------

/// An update as kept in persistent storage, with the recipe as opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredUpdate {
    pub target: String,
    pub operation: String,
    #[serde(default)]
    pub daemon_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<serde_json::Value>,
}

impl Update<ConfigRecipe> {
    /// Reconstructs an update from storage. A missing recipe yields an
    /// empty one for the operation's entity.
    pub fn from_stored(stored: StoredUpdate) -> Result<Self, ConfigError> {
        let operation: Operation = stored.operation.parse()?;
        let recipe = match stored.recipe {
            Some(recipe) => serde_json::from_value(recipe)?,
            None => ConfigRecipe::new(operation.entity()),
        };
        Ok(Self {
            target: stored.target,
            operation,
            daemon_ids: stored.daemon_ids.into_iter().map(DaemonId).collect(),
            recipe,
        })
    }

    pub fn to_stored(&self) -> Result<StoredUpdate, ConfigError> {
        Ok(StoredUpdate {
            target: self.target.clone(),
            operation: self.operation.to_string(),
            daemon_ids: self.daemon_ids.iter().map(|id| id.0).collect(),
            recipe: Some(serde_json::to_value(&self.recipe)?),
        })
    }
}
