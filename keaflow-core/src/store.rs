//! Local system of record for the fleet configuration.
//!
//! [`ConfigStore`] is the seam the transaction engine persists through.
//! [`YamlStore`] implements it on top of a single inventory file:
//!
//! ```text
//! ~/.keaflow/
//!   inventory.yaml   (apps, daemons, hosts, subnets, mode 0600)
//! ```
//!
//! Every mutation loads the file, applies the change and saves it back with
//! the `.tmp` + rename pattern. Daemon and app references on hosts and
//! subnets are stored by id and resolved on read.
//!
//! Access is serialized across processes by an advisory lock on the
//! `inventory.yaml.lock` sibling: exclusive around a mutation, shared around
//! a read.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::paths;
use crate::types::{
    App, Daemon, DaemonId, DataSource, Host, HostId, LocalHost, LocalSubnetRef, Subnet, SubnetId,
};

// ---------------------------------------------------------------------------
// 1. Store seam
// ---------------------------------------------------------------------------

/// Entity-shaped persistence used by the configuration transactions.
///
/// Hosts and subnets returned by the store have their `daemon` (and the
/// daemon's `app`) resolved.
pub trait ConfigStore: Send + Sync {
    fn get_daemons(&self) -> Result<Vec<Daemon>, StoreError>;

    fn get_daemon(&self, id: DaemonId) -> Result<Option<Daemon>, StoreError>;

    fn get_hosts(&self) -> Result<Vec<Host>, StoreError>;

    fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError>;

    /// Inserts the host and its associations, returning the assigned id.
    fn add_host_with_local_hosts(&self, host: &Host) -> Result<HostId, StoreError>;

    /// Replaces the host and all of its associations.
    fn update_host_with_local_hosts(&self, host: &Host) -> Result<(), StoreError>;

    fn delete_host(&self, id: HostId) -> Result<(), StoreError>;

    /// Associations of the host coming from `source`.
    fn get_local_hosts(
        &self,
        host_id: HostId,
        source: DataSource,
    ) -> Result<Vec<LocalHost>, StoreError>;

    /// Removes the associations of the host coming from `source`, returning
    /// how many were removed.
    fn delete_daemons_from_host(
        &self,
        host_id: HostId,
        source: DataSource,
    ) -> Result<usize, StoreError>;

    fn get_subnets(&self) -> Result<Vec<Subnet>, StoreError>;

    fn get_subnet(&self, id: SubnetId) -> Result<Option<Subnet>, StoreError>;

    /// Highest local subnet id used on any daemon; `0` when there are none.
    fn get_max_local_subnet_id(&self) -> Result<i64, StoreError>;

    /// Inserts the subnet when its id is unknown, otherwise replaces it.
    /// Returns the subnet id.
    fn commit_subnet(&self, subnet: &Subnet) -> Result<SubnetId, StoreError>;

    fn delete_subnet(&self, id: SubnetId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// 2. Inventory document
// ---------------------------------------------------------------------------

/// Root of the YAML inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Inventory {
    pub version: u32,
    #[serde(default)]
    pub apps: Vec<App>,
    #[serde(default)]
    pub daemons: Vec<Daemon>,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Inventory {
    /// Daemon `id` with its app resolved.
    fn resolve_daemon(&self, id: DaemonId) -> Option<Daemon> {
        let mut daemon = self.daemons.iter().find(|d| d.id == id)?.clone();
        daemon.app = self.apps.iter().find(|a| a.id == daemon.app_id).cloned();
        Some(daemon)
    }

    fn resolve_host(&self, host: &Host) -> Host {
        let mut host = host.clone();
        for lh in &mut host.local_hosts {
            lh.daemon = self.resolve_daemon(lh.daemon_id);
        }
        if let Some(subnet_ref) = host.subnet.as_mut() {
            if let Some(subnet) = self.subnets.iter().find(|s| s.id == subnet_ref.id) {
                subnet_ref.prefix = subnet.prefix.clone();
                subnet_ref.local_subnet_ids = subnet
                    .local_subnets
                    .iter()
                    .map(|ls| LocalSubnetRef {
                        daemon_id: ls.daemon_id,
                        local_subnet_id: ls.local_subnet_id,
                    })
                    .collect();
            }
        }
        host
    }

    fn resolve_subnet(&self, subnet: &Subnet) -> Subnet {
        let mut subnet = subnet.clone();
        for ls in &mut subnet.local_subnets {
            ls.daemon = self.resolve_daemon(ls.daemon_id);
        }
        subnet
    }

    fn check_daemons<'a>(
        &self,
        mut ids: impl Iterator<Item = &'a DaemonId>,
    ) -> Result<(), StoreError> {
        match ids.find(|id| !self.daemons.iter().any(|d| d.id == **id)) {
            Some(id) => Err(StoreError::DaemonNotFound(*id)),
            None => Ok(()),
        }
    }
}

/// Strips resolved references before a host is persisted.
fn detach_host(host: &Host) -> Host {
    let mut host = host.clone();
    for lh in &mut host.local_hosts {
        lh.daemon = None;
    }
    host
}

fn detach_subnet(subnet: &Subnet) -> Subnet {
    let mut subnet = subnet.clone();
    for ls in &mut subnet.local_subnets {
        ls.daemon = None;
    }
    subnet
}

// ---------------------------------------------------------------------------
// 3. Load / save (atomic)
// ---------------------------------------------------------------------------

/// Load the inventory at `path`; a missing file is an empty inventory.
///
/// Returns `StoreError::Parse` (with path and line context) if malformed.
pub fn load_inventory(path: &Path) -> Result<Inventory, StoreError> {
    if !path.exists() {
        return Ok(Inventory {
            version: 1,
            ..Inventory::default()
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomically save the inventory to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_inventory(path: &Path, inventory: &Inventory) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(inventory)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Shared,
    Exclusive,
}

/// `<inventory>.lock`, next to the inventory file.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Blocks until the advisory inventory lock is held. Dropping the returned
/// file releases it. Readers skip locking while the directory is missing.
fn lock_inventory(path: &Path, access: Access) -> Result<Option<File>, StoreError> {
    let parent_exists = path.parent().map_or(true, Path::exists);
    if access == Access::Shared && !parent_exists {
        return Ok(None);
    }
    ensure_parent(path)?;

    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| io_err(&lock_path, e))?;
    let locked = match access {
        Access::Shared => FileExt::lock_shared(&file),
        Access::Exclusive => FileExt::lock_exclusive(&file),
    };
    locked.map_err(|e| io_err(&lock_path, e))?;
    Ok(Some(file))
}

// ---------------------------------------------------------------------------
// 4. YAML-backed store
// ---------------------------------------------------------------------------

/// [`ConfigStore`] backed by a YAML inventory file.
#[derive(Debug)]
pub struct YamlStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl YamlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Store at `<home>/.keaflow/inventory.yaml`.
    pub fn open_at(home: &Path) -> Self {
        Self::new(paths::inventory_path(home))
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self::open_at(&paths::home()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the whole inventory.
    pub fn inventory(&self) -> Result<Inventory, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let _file_lock = lock_inventory(&self.path, Access::Shared)?;
        load_inventory(&self.path)
    }

    /// Registers (or replaces) a control agent endpoint.
    pub fn put_app(&self, app: App) -> Result<(), StoreError> {
        self.mutate(|inventory| {
            inventory.apps.retain(|a| a.id != app.id);
            inventory.apps.push(app);
            inventory.apps.sort_by_key(|a| a.id);
            Ok(())
        })
    }

    /// Registers (or replaces) a daemon.
    pub fn put_daemon(&self, daemon: Daemon) -> Result<(), StoreError> {
        self.mutate(|inventory| {
            let mut daemon = daemon;
            daemon.app = None;
            inventory.daemons.retain(|d| d.id != daemon.id);
            inventory.daemons.push(daemon);
            inventory.daemons.sort_by_key(|d| d.id);
            Ok(())
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Inventory) -> T) -> Result<T, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let _file_lock = lock_inventory(&self.path, Access::Shared)?;
        let inventory = load_inventory(&self.path)?;
        Ok(f(&inventory))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Inventory) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let _file_lock = lock_inventory(&self.path, Access::Exclusive)?;
        let mut inventory = load_inventory(&self.path)?;
        let out = f(&mut inventory)?;
        inventory.updated_at = Some(Utc::now());
        save_inventory(&self.path, &inventory)?;
        tracing::debug!(path = %self.path.display(), "inventory saved");
        Ok(out)
    }
}

impl ConfigStore for YamlStore {
    fn get_daemons(&self) -> Result<Vec<Daemon>, StoreError> {
        self.read(|inv| {
            inv.daemons
                .iter()
                .filter_map(|d| inv.resolve_daemon(d.id))
                .collect()
        })
    }

    fn get_daemon(&self, id: DaemonId) -> Result<Option<Daemon>, StoreError> {
        self.read(|inv| inv.resolve_daemon(id))
    }

    fn get_hosts(&self) -> Result<Vec<Host>, StoreError> {
        self.read(|inv| inv.hosts.iter().map(|h| inv.resolve_host(h)).collect())
    }

    fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError> {
        self.read(|inv| {
            inv.hosts
                .iter()
                .find(|h| h.id == id)
                .map(|h| inv.resolve_host(h))
        })
    }

    fn add_host_with_local_hosts(&self, host: &Host) -> Result<HostId, StoreError> {
        self.mutate(|inv| {
            inv.check_daemons(host.local_hosts.iter().map(|lh| &lh.daemon_id))?;
            let next = inv.hosts.iter().map(|h| h.id.0).max().unwrap_or(0) + 1;
            let mut stored = detach_host(host);
            stored.id = HostId(next);
            inv.hosts.push(stored);
            Ok(HostId(next))
        })
    }

    fn update_host_with_local_hosts(&self, host: &Host) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.check_daemons(host.local_hosts.iter().map(|lh| &lh.daemon_id))?;
            let slot = inv
                .hosts
                .iter_mut()
                .find(|h| h.id == host.id)
                .ok_or(StoreError::HostNotFound(host.id))?;
            *slot = detach_host(host);
            Ok(())
        })
    }

    fn delete_host(&self, id: HostId) -> Result<(), StoreError> {
        self.mutate(|inv| {
            let before = inv.hosts.len();
            inv.hosts.retain(|h| h.id != id);
            if inv.hosts.len() == before {
                return Err(StoreError::HostNotFound(id));
            }
            Ok(())
        })
    }

    fn get_local_hosts(
        &self,
        host_id: HostId,
        source: DataSource,
    ) -> Result<Vec<LocalHost>, StoreError> {
        self.read(|inv| {
            inv.hosts
                .iter()
                .find(|h| h.id == host_id)
                .map(|h| inv.resolve_host(h).local_hosts)
                .unwrap_or_default()
                .into_iter()
                .filter(|lh| lh.data_source == source)
                .collect()
        })
    }

    fn delete_daemons_from_host(
        &self,
        host_id: HostId,
        source: DataSource,
    ) -> Result<usize, StoreError> {
        self.mutate(|inv| {
            let host = inv
                .hosts
                .iter_mut()
                .find(|h| h.id == host_id)
                .ok_or(StoreError::HostNotFound(host_id))?;
            let before = host.local_hosts.len();
            host.local_hosts.retain(|lh| lh.data_source != source);
            Ok(before - host.local_hosts.len())
        })
    }

    fn get_subnets(&self) -> Result<Vec<Subnet>, StoreError> {
        self.read(|inv| inv.subnets.iter().map(|s| inv.resolve_subnet(s)).collect())
    }

    fn get_subnet(&self, id: SubnetId) -> Result<Option<Subnet>, StoreError> {
        self.read(|inv| {
            inv.subnets
                .iter()
                .find(|s| s.id == id)
                .map(|s| inv.resolve_subnet(s))
        })
    }

    fn get_max_local_subnet_id(&self) -> Result<i64, StoreError> {
        self.read(|inv| {
            inv.subnets
                .iter()
                .flat_map(|s| s.local_subnets.iter().map(|ls| ls.local_subnet_id))
                .max()
                .unwrap_or(0)
        })
    }

    fn commit_subnet(&self, subnet: &Subnet) -> Result<SubnetId, StoreError> {
        self.mutate(|inv| {
            inv.check_daemons(subnet.local_subnets.iter().map(|ls| &ls.daemon_id))?;
            let stored = detach_subnet(subnet);
            if let Some(slot) = inv.subnets.iter_mut().find(|s| s.id == subnet.id) {
                *slot = stored;
                return Ok(subnet.id);
            }
            if let Some(existing) = inv.subnets.iter().find(|s| s.prefix == subnet.prefix) {
                return Err(StoreError::DuplicateSubnet {
                    prefix: subnet.prefix.clone(),
                    id: existing.id,
                });
            }
            let id = SubnetId(inv.subnets.iter().map(|s| s.id.0).max().unwrap_or(0) + 1);
            inv.subnets.push(Subnet { id, ..stored });
            Ok(id)
        })
    }

    fn delete_subnet(&self, id: SubnetId) -> Result<(), StoreError> {
        self.mutate(|inv| {
            let before = inv.subnets.len();
            inv.subnets.retain(|s| s.id != id);
            if inv.subnets.len() == before {
                return Err(StoreError::SubnetNotFound(id));
            }
            for host in &mut inv.hosts {
                if host.subnet.as_ref().is_some_and(|s| s.id == id) {
                    host.subnet = None;
                }
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Creates the inventory directory (mode 0700) when it is missing.
fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
