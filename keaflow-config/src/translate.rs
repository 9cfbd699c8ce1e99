//! Conversion of hosts and subnets into Kea command arguments.

use serde_json::{json, Value};

use keaflow_core::{Daemon, DaemonId, Host, IpFamily, LocalSubnet, Subnet};
use keaflow_ctrl::Arguments;

use crate::error::ConfigError;
use crate::options::{option_data, OptionDefinitionLookup};
use crate::state::EntityKind;

fn object<const N: usize>(entries: [(&str, Value); N]) -> Arguments {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

fn host_error(host: &Host, daemon_id: DaemonId, reason: &str) -> ConfigError {
    ConfigError::Translation {
        kind: EntityKind::Host,
        id: host.id.0,
        daemon_id,
        reason: reason.to_owned(),
    }
}

fn subnet_error(subnet: &Subnet, daemon_id: DaemonId, reason: impl Into<String>) -> ConfigError {
    ConfigError::Translation {
        kind: EntityKind::Subnet,
        id: subnet.id.0,
        daemon_id,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Host reservations
// ---------------------------------------------------------------------------

/// `reservation-add` arguments for `host` on `daemon`.
pub fn reservation_add(
    daemon: &Daemon,
    lookup: &dyn OptionDefinitionLookup,
    host: &Host,
) -> Result<Arguments, ConfigError> {
    let subnet_id = host
        .local_subnet_id(daemon.id)
        .ok_or_else(|| host_error(host, daemon.id, "its subnet is not configured on the daemon"))?;
    let identifier = host
        .identifiers
        .first()
        .ok_or_else(|| host_error(host, daemon.id, "it has no identifier"))?;

    let identifier_key = identifier.kind.to_string();
    let mut reservation = object([
        ("subnet-id", subnet_id.into()),
        (identifier_key.as_str(), identifier.to_kea_string().into()),
    ]);

    let (prefixes, addresses): (Vec<&String>, Vec<&String>) =
        host.reservations.iter().partition(|r| r.contains('/'));
    let dhcp6 = daemon.name == "dhcp6";
    if dhcp6 {
        if !addresses.is_empty() {
            reservation.insert("ip-addresses".into(), json!(addresses));
        }
        if !prefixes.is_empty() {
            reservation.insert("prefixes".into(), json!(prefixes));
        }
    } else if let Some(address) = addresses.first() {
        reservation.insert("ip-address".into(), json!(address));
    }

    if let Some(hostname) = &host.hostname {
        reservation.insert("hostname".into(), hostname.clone().into());
    }

    if let Some(local) = host.local_host(daemon.id) {
        if !local.client_classes.is_empty() {
            reservation.insert("client-classes".into(), json!(local.client_classes));
        }
        if !local.options.is_empty() {
            let options = local
                .options
                .iter()
                .map(|option| option_data(daemon.id, lookup, option))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| host_error(host, daemon.id, &err.to_string()))?;
            reservation.insert("option-data".into(), Value::Array(options));
        }
        if !dhcp6 {
            let boot_fields = [
                ("next-server", &local.next_server),
                ("server-hostname", &local.server_hostname),
                ("boot-file-name", &local.boot_file_name),
            ];
            for (key, value) in boot_fields {
                if let Some(value) = value {
                    reservation.insert(key.into(), value.clone().into());
                }
            }
        }
    }

    Ok(object([("reservation", Value::Object(reservation))]))
}

/// `reservation-del` arguments removing `host` from the daemon.
pub fn reservation_del(daemon_id: DaemonId, host: &Host) -> Result<Arguments, ConfigError> {
    let subnet_id = host
        .local_subnet_id(daemon_id)
        .ok_or_else(|| host_error(host, daemon_id, "its subnet is not configured on the daemon"))?;
    let identifier = host
        .identifiers
        .first()
        .ok_or_else(|| host_error(host, daemon_id, "it has no identifier"))?;
    Ok(object([
        ("subnet-id", subnet_id.into()),
        ("identifier-type", identifier.kind.to_string().into()),
        ("identifier", identifier.to_kea_string().into()),
    ]))
}

// ---------------------------------------------------------------------------
// Subnets
// ---------------------------------------------------------------------------

/// `subnet4-*` / `subnet6-*` arguments describing `subnet` on `daemon`.
pub fn subnet_set(
    daemon: &Daemon,
    lookup: &dyn OptionDefinitionLookup,
    subnet: &Subnet,
) -> Result<Arguments, ConfigError> {
    let local = subnet
        .local_subnet(daemon.id)
        .ok_or_else(|| subnet_error(subnet, daemon.id, "it is not configured on the daemon"))?;
    let family = subnet.family();
    let entry = subnet_entry(daemon, lookup, subnet, local, family)?;
    let key = format!("subnet{}", family.number());
    Ok(object([(key.as_str(), Value::Array(vec![Value::Object(entry)]))]))
}

fn subnet_entry(
    daemon: &Daemon,
    lookup: &dyn OptionDefinitionLookup,
    subnet: &Subnet,
    local: &LocalSubnet,
    family: IpFamily,
) -> Result<Arguments, ConfigError> {
    let mut entry = object([
        ("id", local.local_subnet_id.into()),
        ("subnet", subnet.prefix.clone().into()),
    ]);

    let pools: Vec<Value> = local
        .pools
        .iter()
        .map(|pool| json!({ "pool": pool.to_string() }))
        .collect();
    entry.insert("pools".into(), Value::Array(pools));

    if family == IpFamily::V6 {
        let mut pd_pools = Vec::with_capacity(local.prefix_pools.len());
        for pool in &local.prefix_pools {
            let (prefix, len) = pool
                .prefix
                .split_once('/')
                .and_then(|(prefix, len)| Some((prefix, len.parse::<u8>().ok()?)))
                .ok_or_else(|| {
                    subnet_error(
                        subnet,
                        daemon.id,
                        format!("invalid delegated prefix {}", pool.prefix),
                    )
                })?;
            pd_pools.push(json!({
                "prefix": prefix,
                "prefix-len": len,
                "delegated-len": pool.delegated_len,
            }));
        }
        entry.insert("pd-pools".into(), Value::Array(pd_pools));
    }

    if !local.options.is_empty() {
        let options = local
            .options
            .iter()
            .map(|option| option_data(daemon.id, lookup, option))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| subnet_error(subnet, daemon.id, err.to_string()))?;
        entry.insert("option-data".into(), Value::Array(options));
    }
    if let Some(lifetime) = local.valid_lifetime {
        entry.insert("valid-lifetime".into(), lifetime.into());
    }
    if let Some(class) = &local.client_class {
        entry.insert("client-class".into(), class.clone().into());
    }
    Ok(entry)
}

/// `subnet4-del` / `subnet6-del` arguments.
pub fn subnet_del(daemon_id: DaemonId, subnet: &Subnet) -> Result<Arguments, ConfigError> {
    let local = subnet
        .local_subnet(daemon_id)
        .ok_or_else(|| subnet_error(subnet, daemon_id, "it is not configured on the daemon"))?;
    Ok(object([("id", local.local_subnet_id.into())]))
}

/// `network4-subnet-add` / `network4-subnet-del` arguments.
pub fn network_subnet(local_subnet_id: i64, shared_network: &str) -> Arguments {
    object([
        ("id", local_subnet_id.into()),
        ("name", shared_network.into()),
    ])
}

#[cfg(test)]
mod tests {
    use keaflow_core::{
        AddressPool, AppId, DataSource, DhcpOption, HostId, HostIdentifier, IdentifierKind,
        LocalHost, LocalSubnetRef, PrefixPool, SubnetId, SubnetRef,
    };
    use serde_json::json;

    use super::*;
    use crate::options::StandardOptionDefinitions;

    fn daemon(id: i64, name: &str) -> Daemon {
        Daemon {
            id: DaemonId(id),
            name: name.to_owned(),
            version: "2.6.1".to_owned(),
            app_id: AppId(1),
            app: None,
            hook_libraries: None,
        }
    }

    fn host(reservations: &[&str]) -> Host {
        let mut local = LocalHost::new(daemon(1, "dhcp4"));
        local.client_classes = vec!["printers".to_owned()];
        local.next_server = Some("192.0.2.10".to_owned());
        local.options = vec![DhcpOption {
            code: 3,
            space: "dhcp4".to_owned(),
            always_send: false,
            fields: vec!["192.0.2.1".to_owned()],
        }];
        Host {
            id: HostId(10),
            subnet: Some(SubnetRef {
                id: SubnetId(2),
                prefix: "192.0.2.0/24".to_owned(),
                local_subnet_ids: vec![LocalSubnetRef {
                    daemon_id: DaemonId(1),
                    local_subnet_id: 123,
                }],
            }),
            identifiers: vec![HostIdentifier {
                kind: IdentifierKind::HwAddress,
                value: vec![1, 2, 3, 4, 5, 6],
            }],
            reservations: reservations.iter().map(|r| r.to_string()).collect(),
            hostname: Some("printer.example.org".to_owned()),
            local_hosts: vec![local],
        }
    }

    #[test]
    fn dhcp4_reservation() {
        let args = reservation_add(
            &daemon(1, "dhcp4"),
            &StandardOptionDefinitions,
            &host(&["192.0.2.5"]),
        )
        .expect("convert");
        assert_eq!(
            Value::Object(args),
            json!({
                "reservation": {
                    "subnet-id": 123,
                    "hw-address": "01:02:03:04:05:06",
                    "ip-address": "192.0.2.5",
                    "hostname": "printer.example.org",
                    "client-classes": ["printers"],
                    "option-data": [{
                        "code": 3,
                        "space": "dhcp4",
                        "always-send": false,
                        "name": "routers",
                        "csv-format": true,
                        "data": "192.0.2.1",
                    }],
                    "next-server": "192.0.2.10",
                }
            })
        );
    }

    #[test]
    fn dhcp6_reservation_splits_prefixes() {
        let mut h = host(&["2001:db8:1::5", "3000:1::/64"]);
        h.subnet = None;
        h.local_hosts = vec![LocalHost::new(daemon(2, "dhcp6"))];
        let args = reservation_add(&daemon(2, "dhcp6"), &StandardOptionDefinitions, &h)
            .expect("convert");
        let reservation = &args["reservation"];
        assert_eq!(reservation["subnet-id"], json!(0));
        assert_eq!(reservation["ip-addresses"], json!(["2001:db8:1::5"]));
        assert_eq!(reservation["prefixes"], json!(["3000:1::/64"]));
        assert!(reservation.get("ip-address").is_none());
        assert!(reservation.get("next-server").is_none());
    }

    #[test]
    fn reservation_needs_local_subnet() {
        let err = reservation_add(
            &daemon(9, "dhcp4"),
            &StandardOptionDefinitions,
            &host(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Translation { daemon_id, .. } if daemon_id == DaemonId(9)));
    }

    #[test]
    fn malformed_option_fails_reservation() {
        let mut h = host(&["192.0.2.5"]);
        h.local_hosts[0].options[0] = DhcpOption {
            code: 224,
            space: "dhcp4".to_owned(),
            always_send: false,
            fields: vec!["0x0a".to_owned()],
        };
        let err = reservation_add(&daemon(1, "dhcp4"), &StandardOptionDefinitions, &h)
            .unwrap_err();
        match err {
            ConfigError::Translation { kind, id, reason, .. } => {
                assert_eq!(kind, EntityKind::Host);
                assert_eq!(id, 10);
                assert!(reason.contains("option 224"), "got: {reason}");
            }
            other => panic!("expected translation error, got {other:?}"),
        }
    }

    #[test]
    fn deleted_reservation() {
        let args = reservation_del(DaemonId(1), &host(&[])).expect("convert");
        assert_eq!(
            Value::Object(args),
            json!({
                "subnet-id": 123,
                "identifier-type": "hw-address",
                "identifier": "01:02:03:04:05:06",
            })
        );
    }

    fn subnet6() -> Subnet {
        let mut local = LocalSubnet::new(daemon(2, "dhcp6"));
        local.local_subnet_id = 7;
        local.pools = vec![AddressPool {
            lower: "2001:db8:1::10".to_owned(),
            upper: "2001:db8:1::ff".to_owned(),
        }];
        local.prefix_pools = vec![PrefixPool {
            prefix: "3000::/48".to_owned(),
            delegated_len: 64,
        }];
        local.valid_lifetime = Some(3600);
        local.client_class = Some("lab".to_owned());
        Subnet {
            id: SubnetId(4),
            prefix: "2001:db8:1::/64".to_owned(),
            shared_network: None,
            local_subnets: vec![local, LocalSubnet::new(daemon(3, "dhcp6"))],
        }
    }

    #[test]
    fn dhcp6_subnet() {
        let args = subnet_set(&daemon(2, "dhcp6"), &StandardOptionDefinitions, &subnet6())
            .expect("convert");
        assert_eq!(
            Value::Object(args),
            json!({
                "subnet6": [{
                    "id": 7,
                    "subnet": "2001:db8:1::/64",
                    "pools": [{"pool": "2001:db8:1::10-2001:db8:1::ff"}],
                    "pd-pools": [{"prefix": "3000::", "prefix-len": 48, "delegated-len": 64}],
                    "valid-lifetime": 3600,
                    "client-class": "lab",
                }]
            })
        );
    }

    #[test]
    fn dhcp4_subnet_has_no_pd_pools() {
        let mut local = LocalSubnet::new(daemon(1, "dhcp4"));
        local.local_subnet_id = 3;
        let subnet = Subnet {
            id: SubnetId(1),
            prefix: "192.0.2.0/24".to_owned(),
            shared_network: None,
            local_subnets: vec![local],
        };
        let args = subnet_set(&daemon(1, "dhcp4"), &StandardOptionDefinitions, &subnet)
            .expect("convert");
        let entry = &args["subnet4"][0];
        assert_eq!(entry["id"], json!(3));
        assert!(entry.get("pd-pools").is_none());
    }

    #[test]
    fn invalid_delegated_prefix_is_rejected() {
        let mut subnet = subnet6();
        subnet.local_subnets[0].prefix_pools[0].prefix = "3000::".to_owned();
        let err = subnet_set(&daemon(2, "dhcp6"), &StandardOptionDefinitions, &subnet)
            .unwrap_err();
        assert!(err.to_string().contains("invalid delegated prefix"), "got: {err}");
    }

    #[test]
    fn deleted_subnet_and_network_membership() {
        assert_eq!(
            Value::Object(subnet_del(DaemonId(2), &subnet6()).expect("convert")),
            json!({"id": 7})
        );
        assert!(subnet_del(DaemonId(8), &subnet6()).is_err());
        assert_eq!(
            Value::Object(network_subnet(7, "lab-net")),
            json!({"id": 7, "name": "lab-net"})
        );
    }

    #[test]
    fn config_sourced_host_still_converts() {
        let mut h = host(&["192.0.2.5"]);
        h.local_hosts[0].data_source = DataSource::Config;
        assert!(reservation_add(&daemon(1, "dhcp4"), &StandardOptionDefinitions, &h).is_ok());
    }
}
