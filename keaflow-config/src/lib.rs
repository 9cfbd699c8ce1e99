//! # keaflow-config
//!
//! Transactions changing the configuration of a Kea fleet.
//!
//! A change goes through three stages on a [`Transaction`] handle owned by
//! the caller:
//!
//! 1. **Begin** loads the entity being changed and locks the daemons serving
//!    it ([`ConfigModule::begin_host_update`] and friends).
//! 2. **Apply** turns the proposed entity into an ordered list of Kea
//!    commands without contacting the fleet.
//! 3. **Commit** sends the commands and updates the local inventory
//!    ([`ConfigModule::commit`]).

pub mod error;
pub mod lock;
pub mod module;
pub mod options;
pub mod recipe;
pub mod state;
pub mod translate;

pub use error::ConfigError;
pub use lock::{ConfigLock, DaemonLocker, FileLocker, InMemoryLocker, LockOwner};
pub use module::{ConfigModule, Transaction, RELOAD_AFTER_WRITE_BEFORE, SUBNET_CMDS_HOOK};
pub use options::{
    InvalidOptionData, OptionDefinition, OptionDefinitionLookup, StandardOptionDefinitions,
};
pub use recipe::{
    ConfigCommand, ConfigRecipe, HostRecipeParams, RecipeParams, StoredUpdate, SubnetRecipeParams,
};
pub use state::{EntityKind, Operation, TransactionState, Update, KEA_TARGET};
