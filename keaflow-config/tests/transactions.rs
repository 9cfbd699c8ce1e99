//! End-to-end transactions against a YAML inventory and a scripted fleet.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keaflow_config::{
    ConfigError, ConfigModule, FileLocker, InMemoryLocker, StandardOptionDefinitions,
};
use keaflow_core::{
    App, AppId, ConfigStore, Daemon, DaemonId, DataSource, Host, HostId, HostIdentifier,
    IdentifierKind, LocalHost, LocalSubnet, SharedNetwork, StoreError, Subnet, SubnetId,
    YamlStore,
};
use keaflow_ctrl::{Command, CommandOutcome, CtrlError, ForwardResult, Forwarder};
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Records every command and answers with scripted result codes.
#[derive(Default)]
struct ScriptedForwarder {
    sent: Mutex<Vec<(String, String)>>,
    results: Mutex<HashMap<(String, String), i64>>,
    unreachable: Mutex<HashSet<String>>,
}

impl ScriptedForwarder {
    fn answer(&self, app: &str, command: &str, result: i64) {
        self.results
            .lock()
            .expect("lock")
            .insert((app.to_owned(), command.to_owned()), result);
    }

    fn cut_off(&self, app: &str) {
        self.unreachable.lock().expect("lock").insert(app.to_owned());
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Forwarder for ScriptedForwarder {
    async fn forward(&self, app: &App, commands: &[Command]) -> Result<ForwardResult, CtrlError> {
        let mut outcomes = Vec::new();
        for command in commands {
            self.sent
                .lock()
                .expect("lock")
                .push((app.name.clone(), command.name().to_owned()));
            if self.unreachable.lock().expect("lock").contains(&app.name) {
                outcomes.push(CommandOutcome::Failed("connection refused".to_owned()));
                continue;
            }
            let result = self
                .results
                .lock()
                .expect("lock")
                .get(&(app.name.clone(), command.name().to_owned()))
                .copied()
                .unwrap_or(0);
            let body = json!([{"result": result, "text": format!("{} result {result}", command.name())}]);
            outcomes.push(CommandOutcome::Received(
                serde_json::to_vec(&body).expect("encode"),
            ));
        }
        Ok(ForwardResult::new(outcomes))
    }
}

/// Delegates to a YAML store but refuses to write hosts and subnets.
struct ReadOnlyStore(YamlStore);

impl ConfigStore for ReadOnlyStore {
    fn get_daemons(&self) -> Result<Vec<Daemon>, StoreError> {
        self.0.get_daemons()
    }
    fn get_daemon(&self, id: DaemonId) -> Result<Option<Daemon>, StoreError> {
        self.0.get_daemon(id)
    }
    fn get_hosts(&self) -> Result<Vec<Host>, StoreError> {
        self.0.get_hosts()
    }
    fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError> {
        self.0.get_host(id)
    }
    fn add_host_with_local_hosts(&self, _host: &Host) -> Result<HostId, StoreError> {
        Err(read_only())
    }
    fn update_host_with_local_hosts(&self, _host: &Host) -> Result<(), StoreError> {
        Err(read_only())
    }
    fn delete_host(&self, _id: HostId) -> Result<(), StoreError> {
        Err(read_only())
    }
    fn get_local_hosts(
        &self,
        host_id: HostId,
        source: DataSource,
    ) -> Result<Vec<LocalHost>, StoreError> {
        self.0.get_local_hosts(host_id, source)
    }
    fn delete_daemons_from_host(
        &self,
        _host_id: HostId,
        _source: DataSource,
    ) -> Result<usize, StoreError> {
        Err(read_only())
    }
    fn get_subnets(&self) -> Result<Vec<Subnet>, StoreError> {
        self.0.get_subnets()
    }
    fn get_subnet(&self, id: SubnetId) -> Result<Option<Subnet>, StoreError> {
        self.0.get_subnet(id)
    }
    fn get_max_local_subnet_id(&self) -> Result<i64, StoreError> {
        self.0.get_max_local_subnet_id()
    }
    fn commit_subnet(&self, _subnet: &Subnet) -> Result<SubnetId, StoreError> {
        Err(read_only())
    }
    fn delete_subnet(&self, _id: SubnetId) -> Result<(), StoreError> {
        Err(read_only())
    }
}

fn read_only() -> StoreError {
    StoreError::Io {
        path: "inventory.yaml".into(),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

const APPS: [&str; 3] = ["kea-a", "kea-b", "kea-c"];

struct Fleet {
    home: TempDir,
    store: Arc<YamlStore>,
    forwarder: Arc<ScriptedForwarder>,
    locker: Arc<InMemoryLocker>,
    module: ConfigModule,
}

impl Fleet {
    fn daemon(&self, id: i64) -> Daemon {
        self.store
            .get_daemon(DaemonId(id))
            .expect("get daemon")
            .expect("daemon present")
    }

    fn local_host(&self, id: i64, source: DataSource) -> LocalHost {
        let mut local = LocalHost::new(self.daemon(id));
        local.data_source = source;
        local
    }

    fn local_subnet(&self, id: i64) -> LocalSubnet {
        LocalSubnet::new(self.daemon(id))
    }

    fn seed_host(&self, locals: Vec<LocalHost>) -> HostId {
        self.store
            .add_host_with_local_hosts(&host(locals))
            .expect("seed host")
    }

    fn seed_subnet(&self, daemons: &[i64], local_id: i64, network: Option<&str>) -> SubnetId {
        let local_subnets = daemons
            .iter()
            .map(|id| {
                let mut local = self.local_subnet(*id);
                local.local_subnet_id = local_id;
                local
            })
            .collect();
        self.store
            .commit_subnet(&Subnet {
                id: SubnetId(0),
                prefix: "192.0.2.0/24".to_owned(),
                shared_network: network.map(|name| SharedNetwork {
                    id: 1,
                    name: name.to_owned(),
                }),
                local_subnets,
            })
            .expect("seed subnet")
    }
}

/// One `dhcp4` daemon per app, daemon `n` on `APPS[n - 1]`.
fn fleet(versions: &[&str]) -> Fleet {
    let home = TempDir::new().expect("home");
    let store = YamlStore::open_at(home.path());
    for (i, version) in versions.iter().enumerate() {
        let id = i as i64 + 1;
        store
            .put_app(App {
                id: AppId(id),
                name: APPS[i].to_owned(),
                address: format!("10.0.0.{id}"),
                port: 8000,
                use_tls: false,
            })
            .expect("app");
        store
            .put_daemon(Daemon {
                id: DaemonId(id),
                name: "dhcp4".to_owned(),
                version: version.to_string(),
                app_id: AppId(id),
                app: None,
                hook_libraries: Some(vec![
                    "/usr/lib/kea/hooks/libdhcp_host_cmds.so".to_owned(),
                    "/usr/lib/kea/hooks/libdhcp_subnet_cmds.so".to_owned(),
                ]),
            })
            .expect("daemon");
    }

    let store = Arc::new(store);
    let forwarder = Arc::new(ScriptedForwarder::default());
    let locker = Arc::new(InMemoryLocker::new());
    let module = ConfigModule::new(
        store.clone(),
        forwarder.clone(),
        locker.clone(),
        Arc::new(StandardOptionDefinitions),
    );
    Fleet {
        home,
        store,
        forwarder,
        locker,
        module,
    }
}

fn host(local_hosts: Vec<LocalHost>) -> Host {
    Host {
        id: HostId(0),
        subnet: None,
        identifiers: vec![HostIdentifier {
            kind: IdentifierKind::HwAddress,
            value: vec![0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f],
        }],
        reservations: vec!["192.0.2.20".to_owned()],
        hostname: Some("lab-printer".to_owned()),
        local_hosts,
    }
}

fn sent(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(app, command)| (app.to_string(), command.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Hosts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn host_update_deletes_before_adding() {
    let fleet = fleet(&["2.6.0", "2.6.0", "2.6.0"]);
    let host_id = fleet.seed_host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Api),
    ]);

    let mut tx = fleet.module.begin_host_update(host_id).expect("begin");
    assert_eq!(tx.locked_daemons(), [DaemonId(1), DaemonId(2)]);

    let mut updated = fleet.store.get_host(host_id).expect("get").expect("host");
    updated.local_hosts = vec![
        fleet.local_host(2, DataSource::Api),
        fleet.local_host(3, DataSource::Api),
    ];
    updated.hostname = Some("lab-printer-2".to_owned());
    fleet.module.apply_host_update(&mut tx, updated).expect("apply");

    let planned: Vec<_> = tx
        .commands()
        .map(|c| (c.app.name.as_str(), c.command.name()))
        .collect();
    assert_eq!(
        planned,
        [
            ("kea-a", "reservation-del"),
            ("kea-b", "reservation-del"),
            ("kea-b", "reservation-add"),
            ("kea-c", "reservation-add"),
        ]
    );
    assert!(fleet.forwarder.sent().is_empty());

    fleet.module.commit(tx).await.expect("commit");
    assert_eq!(
        fleet.forwarder.sent(),
        sent(&[
            ("kea-a", "reservation-del"),
            ("kea-b", "reservation-del"),
            ("kea-b", "reservation-add"),
            ("kea-c", "reservation-add"),
        ])
    );

    let stored = fleet.store.get_host(host_id).expect("get").expect("host");
    let daemons: Vec<_> = stored.local_hosts.iter().map(|lh| lh.daemon_id).collect();
    assert_eq!(daemons, [DaemonId(2), DaemonId(3)]);
    assert_eq!(stored.hostname.as_deref(), Some("lab-printer-2"));
    assert_eq!(fleet.locker.holder(DaemonId(1)), None);
}

#[tokio::test]
async fn host_update_keeps_config_file_reservations() {
    let fleet = fleet(&["2.6.0", "2.6.0"]);
    let host_id = fleet.seed_host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Config),
    ]);

    let mut tx = fleet.module.begin_host_update(host_id).expect("begin");
    assert_eq!(tx.locked_daemons(), [DaemonId(1)]);

    let mut updated = fleet.store.get_host(host_id).expect("get").expect("host");
    updated.local_hosts = vec![fleet.local_host(1, DataSource::Api)];
    fleet.module.apply_host_update(&mut tx, updated).expect("apply");
    fleet.module.commit(tx).await.expect("commit");

    assert_eq!(
        fleet.forwarder.sent(),
        sent(&[("kea-a", "reservation-del"), ("kea-a", "reservation-add")])
    );
    let stored = fleet.store.get_host(host_id).expect("get").expect("host");
    assert_eq!(stored.local_hosts.len(), 2);
    assert!(stored.has_config_local_hosts());
}

#[tokio::test]
async fn failing_daemon_halts_commit() {
    let fleet = fleet(&["2.6.0", "2.6.0", "2.6.0"]);
    fleet.forwarder.answer("kea-b", "reservation-add", 1);

    let mut tx = fleet.module.begin_host_add();
    let proposed = host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Api),
        fleet.local_host(3, DataSource::Api),
    ]);
    fleet.module.apply_host_add(&mut tx, proposed).expect("apply");

    let err = fleet.module.commit(tx).await.unwrap_err();
    match &err {
        ConfigError::CommandFailed { command, app, .. } => {
            assert_eq!(command, "reservation-add");
            assert_eq!(app, "kea-b");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("reservation-add command to kea-b failed"));
    assert!(err.to_string().contains("error code 1 returned by Kea dhcp4"));

    assert_eq!(
        fleet.forwarder.sent(),
        sent(&[("kea-a", "reservation-add"), ("kea-b", "reservation-add")])
    );
    assert!(fleet.store.get_hosts().expect("hosts").is_empty());
}

#[tokio::test]
async fn unreachable_agent_fails_with_transport_error() {
    let fleet = fleet(&["2.6.0"]);
    fleet.forwarder.cut_off("kea-a");

    let mut tx = fleet.module.begin_host_add();
    fleet
        .module
        .apply_host_add(&mut tx, host(vec![fleet.local_host(1, DataSource::Api)]))
        .expect("apply");
    let err = fleet.module.commit(tx).await.unwrap_err();
    assert!(
        matches!(&err, ConfigError::CommandFailed { source: CtrlError::Transport(_), .. }),
        "got: {err}"
    );
}

#[test]
fn concurrent_update_is_rejected_until_released() {
    let fleet = fleet(&["2.6.0", "2.6.0"]);
    let host_id = fleet.seed_host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Api),
    ]);
    let before = fleet.store.inventory().expect("inventory");

    let first = fleet.module.begin_host_update(host_id).expect("first");
    let err = fleet.module.begin_host_update(host_id).unwrap_err();
    assert!(err.is_lock_contention(), "got: {err}");
    assert!(matches!(fleet.module.begin_host_delete(host_id), Err(ConfigError::Locked { .. })));
    assert_eq!(fleet.locker.holder(DaemonId(2)), Some(first.id()));
    assert_eq!(fleet.store.inventory().expect("inventory"), before);

    drop(first);
    let second = fleet.module.begin_host_update(host_id).expect("after release");
    assert_eq!(fleet.locker.holder(DaemonId(1)), Some(second.id()));
}

#[test]
fn modules_sharing_a_home_exclude_each_other() {
    let fleet = fleet(&["2.6.0", "2.6.0"]);
    let host_id = fleet.seed_host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Api),
    ]);
    // Built independently, as two keaflow invocations would be.
    let module = |home: &std::path::Path| {
        ConfigModule::new(
            Arc::new(YamlStore::open_at(home)),
            Arc::new(ScriptedForwarder::default()),
            Arc::new(FileLocker::open_at(home)),
            Arc::new(StandardOptionDefinitions),
        )
    };
    let first_module = module(fleet.home.path());
    let second_module = module(fleet.home.path());

    let first = first_module.begin_host_update(host_id).expect("first");
    let err = second_module.begin_host_delete(host_id).unwrap_err();
    assert!(err.is_lock_contention(), "got: {err}");

    drop(first);
    second_module
        .begin_host_delete(host_id)
        .expect("after release");
}

#[tokio::test]
async fn local_failure_after_fleet_change_is_reported() {
    let fleet = fleet(&["2.6.0"]);
    let host_id = fleet.seed_host(vec![fleet.local_host(1, DataSource::Api)]);
    let locker = Arc::new(InMemoryLocker::new());
    let forwarder = Arc::new(ScriptedForwarder::default());
    let module = ConfigModule::new(
        Arc::new(ReadOnlyStore(YamlStore::new(fleet.store.path()))),
        forwarder.clone(),
        locker.clone(),
        Arc::new(StandardOptionDefinitions),
    );

    let mut tx = module.begin_host_update(host_id).expect("begin");
    let updated = fleet.store.get_host(host_id).expect("get").expect("host");
    module.apply_host_update(&mut tx, updated).expect("apply");

    let err = module.commit(tx).await.unwrap_err();
    assert!(err.is_local_persistence(), "got: {err}");
    assert!(
        err.to_string()
            .starts_with("host has been successfully updated in Kea but updating it in the local inventory failed"),
        "got: {err}"
    );
    assert_eq!(forwarder.sent().len(), 2);
    assert_eq!(locker.holder(DaemonId(1)), None);
}

#[tokio::test]
async fn host_delete_keeps_host_with_config_file_reservations() {
    let fleet = fleet(&["2.6.0", "2.6.0"]);
    let kept = fleet.seed_host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Config),
    ]);

    let mut tx = fleet.module.begin_host_delete(kept).expect("begin");
    fleet.module.apply_host_delete(&mut tx).expect("apply");
    fleet.module.commit(tx).await.expect("commit");

    assert_eq!(fleet.forwarder.sent(), sent(&[("kea-a", "reservation-del")]));
    let stored = fleet.store.get_host(kept).expect("get").expect("host kept");
    assert_eq!(stored.local_hosts.len(), 1);
    assert_eq!(stored.local_hosts[0].data_source, DataSource::Config);
}

#[tokio::test]
async fn host_delete_removes_api_only_host() {
    let fleet = fleet(&["2.6.0", "2.6.0"]);
    let host_id = fleet.seed_host(vec![
        fleet.local_host(1, DataSource::Api),
        fleet.local_host(2, DataSource::Api),
    ]);

    let mut tx = fleet.module.begin_host_delete(host_id).expect("begin");
    fleet.module.apply_host_delete(&mut tx).expect("apply");
    fleet.module.commit(tx).await.expect("commit");

    assert_eq!(fleet.forwarder.sent().len(), 2);
    assert!(fleet.store.get_host(host_id).expect("get").is_none());
}

// ---------------------------------------------------------------------------
// Subnets
// ---------------------------------------------------------------------------

#[rstest]
#[case("2.5.3", &["subnet4-add", "config-write", "config-reload"])]
#[case("2.6.0", &["subnet4-add", "config-write"])]
#[case("not-a-version", &["subnet4-add", "config-write"])]
#[tokio::test]
async fn subnet_add_reloads_old_daemons(#[case] version: &str, #[case] expected: &[&str]) {
    let fleet = fleet(&[version]);
    let mut tx = fleet.module.begin_subnet_add();
    let subnet = Subnet {
        id: SubnetId(0),
        prefix: "192.0.2.0/24".to_owned(),
        shared_network: None,
        local_subnets: vec![fleet.local_subnet(1)],
    };
    fleet.module.apply_subnet_add(&mut tx, subnet).expect("apply");

    let state = fleet.module.commit(tx).await.expect("commit");
    let names: Vec<_> = fleet.forwarder.sent().into_iter().map(|(_, c)| c).collect();
    assert_eq!(names, expected);

    let subnet_id = state.updates[0]
        .recipe
        .subnet_params()
        .expect("params")
        .subnet_id
        .expect("captured id");
    let stored = fleet.store.get_subnet(subnet_id).expect("get").expect("subnet");
    assert_eq!(stored.local_subnets[0].local_subnet_id, 1);
}

#[tokio::test]
async fn subnet_add_joins_shared_network() {
    let fleet = fleet(&["2.6.0", "2.4.1"]);
    fleet.seed_subnet(&[1], 10, None);

    let mut tx = fleet.module.begin_subnet_add();
    let subnet = Subnet {
        id: SubnetId(0),
        prefix: "198.51.100.0/24".to_owned(),
        shared_network: Some(SharedNetwork {
            id: 1,
            name: "campus".to_owned(),
        }),
        local_subnets: vec![fleet.local_subnet(1), fleet.local_subnet(2)],
    };
    fleet.module.apply_subnet_add(&mut tx, subnet).expect("apply");

    let planned: Vec<_> = tx
        .commands()
        .map(|c| (c.app.name.clone(), c.command.name().to_owned()))
        .collect();
    assert_eq!(
        planned,
        sent(&[
            ("kea-a", "subnet4-add"),
            ("kea-a", "network4-subnet-add"),
            ("kea-b", "subnet4-add"),
            ("kea-b", "network4-subnet-add"),
            ("kea-a", "config-write"),
            ("kea-b", "config-write"),
            ("kea-b", "config-reload"),
        ])
    );
    let join = tx.commands().nth(1).expect("network command");
    assert_eq!(
        join.command.arguments().expect("arguments")["id"],
        json!(11)
    );
}

#[tokio::test]
async fn subnet_update_moves_network_and_daemons() {
    let fleet = fleet(&["2.6.0", "2.6.0", "2.6.0"]);
    let subnet_id = fleet.seed_subnet(&[1, 2], 5, Some("net-1"));

    let mut tx = fleet.module.begin_subnet_update(subnet_id).expect("begin");
    assert_eq!(tx.locked_daemons(), [DaemonId(1), DaemonId(2)]);

    let mut updated = fleet.store.get_subnet(subnet_id).expect("get").expect("subnet");
    updated.local_subnets.retain(|ls| ls.daemon_id == DaemonId(1));
    updated.local_subnets.push(fleet.local_subnet(3));
    updated.shared_network = Some(SharedNetwork {
        id: 2,
        name: "net-2".to_owned(),
    });
    fleet.module.apply_subnet_update(&mut tx, updated).expect("apply");
    fleet.module.commit(tx).await.expect("commit");

    assert_eq!(
        fleet.forwarder.sent(),
        sent(&[
            ("kea-a", "subnet4-update"),
            ("kea-a", "network4-subnet-del"),
            ("kea-a", "network4-subnet-add"),
            ("kea-c", "subnet4-add"),
            ("kea-c", "network4-subnet-del"),
            ("kea-c", "network4-subnet-add"),
            ("kea-b", "subnet4-del"),
            ("kea-a", "config-write"),
            ("kea-c", "config-write"),
            ("kea-b", "config-write"),
        ])
    );

    let stored = fleet.store.get_subnet(subnet_id).expect("get").expect("subnet");
    assert_eq!(stored.shared_network_name(), Some("net-2"));
    let locals: Vec<_> = stored
        .local_subnets
        .iter()
        .map(|ls| (ls.daemon_id, ls.local_subnet_id))
        .collect();
    assert_eq!(locals, [(DaemonId(1), 5), (DaemonId(3), 5)]);
}

#[test]
fn subnet_update_requires_fetched_configuration() {
    let fleet = fleet(&["2.6.0"]);
    let subnet_id = fleet.seed_subnet(&[1], 5, None);
    let mut daemon = fleet.daemon(1);
    daemon.hook_libraries = None;
    fleet.store.put_daemon(daemon).expect("daemon");

    let err = fleet.module.begin_subnet_update(subnet_id).unwrap_err();
    assert!(matches!(err, ConfigError::MissingDaemonConfig(DaemonId(1))), "got: {err}");
    assert_eq!(fleet.locker.holder(DaemonId(1)), None);
}

#[tokio::test]
async fn subnet_delete_writes_config_without_reload() {
    let fleet = fleet(&["2.5.0", "2.6.0"]);
    let subnet_id = fleet.seed_subnet(&[1, 2], 8, None);

    let mut tx = fleet.module.begin_subnet_delete(subnet_id).expect("begin");
    fleet.module.apply_subnet_delete(&mut tx).expect("apply");
    let del = tx.commands().next().expect("first command");
    assert_eq!(del.command.arguments().expect("arguments")["id"], json!(8));

    fleet.module.commit(tx).await.expect("commit");
    assert_eq!(
        fleet.forwarder.sent(),
        sent(&[
            ("kea-a", "subnet4-del"),
            ("kea-b", "subnet4-del"),
            ("kea-a", "config-write"),
            ("kea-b", "config-write"),
        ])
    );
    assert!(fleet.store.get_subnet(subnet_id).expect("get").is_none());
}
