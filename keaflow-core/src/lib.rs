//! keaflow core library: domain types, versions, inventory store, settings.
//!
//! - [`types`]: fleet, host and subnet entities
//! - [`semver`]: [`SemanticVersion`] parsing and ordering
//! - [`store`]: the [`ConfigStore`] seam and its YAML implementation
//! - [`settings`] / [`paths`]: `~/.keaflow/` layout and user settings
//! - [`error`]: [`StoreError`]

pub mod error;
pub mod paths;
pub mod semver;
pub mod settings;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use semver::SemanticVersion;
pub use settings::Settings;
pub use store::{ConfigStore, Inventory, YamlStore};
pub use types::{
    AddressPool, App, AppId, Daemon, DaemonId, DataSource, DhcpOption, Host, HostId,
    HostIdentifier, IdentifierKind, IpFamily, LocalHost, LocalSubnet, LocalSubnetRef, PrefixPool,
    SharedNetwork, Subnet, SubnetId, SubnetRef,
};
