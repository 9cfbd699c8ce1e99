//! Domain types for the keaflow inventory.
//!
//! Entities mirror what the Kea fleet is configured with: apps (control
//! agents), daemons behind them, host reservations and subnets. Hosts and
//! subnets carry per-daemon associations (`LocalHost`, `LocalSubnet`); the
//! resolved `daemon` on an association is filled in by the store and is never
//! persisted.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a control agent endpoint in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId(pub i64);

/// Identifier of a daemon in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DaemonId(pub i64);

/// Global identifier of a host reservation in the inventory.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct HostId(pub i64);

/// Global identifier of a subnet in the inventory. Distinct from the
/// per-daemon local subnet id.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SubnetId(pub i64);

macro_rules! id_newtype {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(AppId);
id_newtype!(DaemonId);
id_newtype!(HostId);
id_newtype!(SubnetId);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Where a per-daemon association came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Created through the host/subnet management commands.
    #[default]
    Api,
    /// Read from the daemon's configuration file.
    Config,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Api => write!(f, "api"),
            DataSource::Config => write!(f, "config"),
        }
    }
}

/// IP family of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Numeric family used in Kea command names (`subnet4-add`, `subnet6-add`).
    pub fn number(self) -> u8 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        }
    }
}

/// Kind of host identifier used to match a client to a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierKind {
    HwAddress,
    ClientId,
    Duid,
    CircuitId,
    FlexId,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentifierKind::HwAddress => "hw-address",
            IdentifierKind::ClientId => "client-id",
            IdentifierKind::Duid => "duid",
            IdentifierKind::CircuitId => "circuit-id",
            IdentifierKind::FlexId => "flex-id",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// A Kea Control Agent endpoint through which daemons receive commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
}

impl App {
    /// URL the control agent listens on.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        match self.address.parse::<IpAddr>() {
            Ok(IpAddr::V6(addr)) => format!("{scheme}://[{addr}]:{}/", self.port),
            _ => format!("{scheme}://{}:{}/", self.address, self.port),
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A running Kea DHCP daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Daemon {
    pub id: DaemonId,
    /// Kea service name, e.g. `dhcp4` or `dhcp6`.
    pub name: String,
    /// Version reported by the daemon, e.g. `2.4.1`.
    #[serde(default)]
    pub version: String,
    pub app_id: AppId,
    /// Resolved by the store on read.
    #[serde(skip)]
    pub app: Option<App>,
    /// Hook libraries loaded by the daemon. `None` when the daemon
    /// configuration has not been fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_libraries: Option<Vec<String>>,
}

impl Daemon {
    /// Whether a hook library whose path contains `name` is loaded.
    ///
    /// Returns `None` when the configuration is unknown.
    pub fn has_hook_library(&self, name: &str) -> Option<bool> {
        self.hook_libraries
            .as_ref()
            .map(|libs| libs.iter().any(|path| path.contains(name)))
    }
}

// ---------------------------------------------------------------------------
// DHCP options
// ---------------------------------------------------------------------------

/// A DHCP option attached to a host or subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOption {
    pub code: u16,
    /// Option space, e.g. `dhcp4` or `dhcp6`.
    pub space: String,
    #[serde(default)]
    pub always_send: bool,
    /// Option fields in textual form. Options without a known definition are
    /// expected to carry hex data.
    #[serde(default)]
    pub fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Hosts
// ---------------------------------------------------------------------------

/// A host identifier, stored as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentifier {
    pub kind: IdentifierKind,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
}

impl HostIdentifier {
    /// Colon separated hex form used by Kea, e.g. `01:02:03:04:05:06`.
    pub fn to_kea_string(&self) -> String {
        self.value
            .iter()
            .map(|b| hex::encode([*b]))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Parses the colon (or dash) separated hex form.
    pub fn parse(kind: IdentifierKind, text: &str) -> Result<Self, hex::FromHexError> {
        let compact: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
        Ok(Self {
            kind,
            value: hex::decode(compact)?,
        })
    }
}

/// Reference from a host to the subnet it belongs to, with the subnet's
/// local identifiers on each daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRef {
    pub id: SubnetId,
    /// Refreshed from the inventory on read.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub local_subnet_ids: Vec<LocalSubnetRef>,
}

/// Local subnet identifier of a subnet on one daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSubnetRef {
    pub daemon_id: DaemonId,
    pub local_subnet_id: i64,
}

/// Association of a host reservation with one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalHost {
    pub daemon_id: DaemonId,
    /// Resolved by the store on read.
    #[serde(skip)]
    pub daemon: Option<Daemon>,
    #[serde(default)]
    pub data_source: DataSource,
    #[serde(default)]
    pub client_classes: Vec<String>,
    #[serde(default)]
    pub options: Vec<DhcpOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_file_name: Option<String>,
}

impl LocalHost {
    /// An API-sourced association with the given daemon.
    pub fn new(daemon: Daemon) -> Self {
        Self {
            daemon_id: daemon.id,
            daemon: Some(daemon),
            data_source: DataSource::Api,
            client_classes: vec![],
            options: vec![],
            next_server: None,
            server_hostname: None,
            boot_file_name: None,
        }
    }
}

/// A host reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// `0` until the host is stored.
    #[serde(default)]
    pub id: HostId,
    /// `None` for global reservations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubnetRef>,
    #[serde(default)]
    pub identifiers: Vec<HostIdentifier>,
    /// Reserved addresses and delegated prefixes (prefixes contain `/`).
    #[serde(default)]
    pub reservations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub local_hosts: Vec<LocalHost>,
}

impl Host {
    /// Kea local subnet id of the host's subnet on `daemon_id`; `0` for a
    /// global reservation.
    pub fn local_subnet_id(&self, daemon_id: DaemonId) -> Option<i64> {
        match &self.subnet {
            None => Some(0),
            Some(subnet) => subnet
                .local_subnet_ids
                .iter()
                .find(|ls| ls.daemon_id == daemon_id)
                .map(|ls| ls.local_subnet_id),
        }
    }

    /// Association with `daemon_id`, if any.
    pub fn local_host(&self, daemon_id: DaemonId) -> Option<&LocalHost> {
        self.local_hosts.iter().find(|lh| lh.daemon_id == daemon_id)
    }

    /// Whether any association comes from a daemon configuration file.
    pub fn has_config_local_hosts(&self) -> bool {
        self.local_hosts
            .iter()
            .any(|lh| lh.data_source == DataSource::Config)
    }
}

// ---------------------------------------------------------------------------
// Subnets
// ---------------------------------------------------------------------------

/// A named group of subnets configured together on a daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedNetwork {
    pub id: i64,
    pub name: String,
}

/// An address pool, `lower-upper` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    pub lower: String,
    pub upper: String,
}

impl fmt::Display for AddressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

/// A DHCPv6 prefix delegation pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixPool {
    /// Prefix in CIDR notation, e.g. `3000::/48`.
    pub prefix: String,
    pub delegated_len: u8,
}

/// Association of a subnet with one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSubnet {
    pub daemon_id: DaemonId,
    /// Resolved by the store on read.
    #[serde(skip)]
    pub daemon: Option<Daemon>,
    /// Subnet identifier in the daemon's configuration.
    #[serde(default)]
    pub local_subnet_id: i64,
    #[serde(default)]
    pub pools: Vec<AddressPool>,
    #[serde(default)]
    pub prefix_pools: Vec<PrefixPool>,
    #[serde(default)]
    pub options: Vec<DhcpOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_lifetime: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_class: Option<String>,
}

impl LocalSubnet {
    /// An association with the given daemon; the local id is assigned later.
    pub fn new(daemon: Daemon) -> Self {
        Self {
            daemon_id: daemon.id,
            daemon: Some(daemon),
            local_subnet_id: 0,
            pools: vec![],
            prefix_pools: vec![],
            options: vec![],
            valid_lifetime: None,
            client_class: None,
        }
    }
}

/// A subnet configured on one or more daemons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(default)]
    pub id: SubnetId,
    /// Prefix in CIDR notation.
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_network: Option<SharedNetwork>,
    #[serde(default)]
    pub local_subnets: Vec<LocalSubnet>,
}

impl Subnet {
    /// IP family derived from the prefix.
    pub fn family(&self) -> IpFamily {
        let address = self.prefix.split('/').next().unwrap_or_default();
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => IpFamily::V4,
            Ok(IpAddr::V6(_)) => IpFamily::V6,
            Err(_) if address.contains(':') => IpFamily::V6,
            Err(_) => IpFamily::V4,
        }
    }

    /// Name of the shared network the subnet belongs to, if any.
    pub fn shared_network_name(&self) -> Option<&str> {
        self.shared_network.as_ref().map(|sn| sn.name.as_str())
    }

    /// Association with `daemon_id`, if any.
    pub fn local_subnet(&self, daemon_id: DaemonId) -> Option<&LocalSubnet> {
        self.local_subnets.iter().find(|ls| ls.daemon_id == daemon_id)
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        let compact: String = text.chars().filter(|c| *c != ':').collect();
        hex::decode(compact).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
