//! DHCP option definitions and conversion to Kea `option-data`.

use serde_json::{Map, Value};
use thiserror::Error;

use keaflow_core::{DaemonId, DhcpOption};

/// Definition metadata of a DHCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDefinition {
    pub code: u16,
    pub space: String,
    pub name: String,
}

/// Looks up option definitions known to a daemon.
pub trait OptionDefinitionLookup: Send + Sync {
    fn find(&self, daemon_id: DaemonId, code: u16, space: &str) -> Option<OptionDefinition>;
}

/// Standard DHCPv4 and DHCPv6 options every Kea daemon knows about.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOptionDefinitions;

const DHCP4_STANDARD: &[(u16, &str)] = &[
    (1, "subnet-mask"),
    (2, "time-offset"),
    (3, "routers"),
    (4, "time-servers"),
    (6, "domain-name-servers"),
    (12, "host-name"),
    (15, "domain-name"),
    (26, "interface-mtu"),
    (28, "broadcast-address"),
    (42, "ntp-servers"),
    (44, "netbios-name-servers"),
    (66, "tftp-server-name"),
    (67, "boot-file-name"),
    (119, "domain-search"),
    (150, "tftp-server-address"),
];

const DHCP6_STANDARD: &[(u16, &str)] = &[
    (21, "sip-server-dns"),
    (22, "sip-server-addr"),
    (23, "dns-servers"),
    (24, "domain-search"),
    (27, "nis-servers"),
    (31, "sntp-servers"),
    (32, "information-refresh-time"),
    (56, "ntp-server"),
    (59, "bootfile-url"),
    (60, "bootfile-param"),
];

impl OptionDefinitionLookup for StandardOptionDefinitions {
    fn find(&self, _daemon_id: DaemonId, code: u16, space: &str) -> Option<OptionDefinition> {
        let table = match space {
            "dhcp4" => DHCP4_STANDARD,
            "dhcp6" => DHCP6_STANDARD,
            _ => return None,
        };
        table
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(code, name)| OptionDefinition {
                code: *code,
                space: space.to_owned(),
                name: (*name).to_owned(),
            })
    }
}

/// Option fields that cannot be sent as raw hex data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("option {code} in space {space}: {reason}")]
pub struct InvalidOptionData {
    pub code: u16,
    pub space: String,
    pub reason: String,
}

/// Converts an option to a Kea `option-data` entry.
///
/// Options with a known definition are sent in CSV format, the others as
/// raw hex data. Hex fields may separate bytes with `:`, `-` or spaces.
pub fn option_data(
    daemon_id: DaemonId,
    lookup: &dyn OptionDefinitionLookup,
    option: &DhcpOption,
) -> Result<Value, InvalidOptionData> {
    let mut data = Map::new();
    data.insert("code".into(), option.code.into());
    data.insert("space".into(), option.space.clone().into());
    data.insert("always-send".into(), option.always_send.into());

    match lookup.find(daemon_id, option.code, &option.space) {
        Some(definition) => {
            data.insert("name".into(), definition.name.into());
            data.insert("csv-format".into(), true.into());
            if !option.fields.is_empty() {
                data.insert("data".into(), option.fields.join(", ").into());
            }
        }
        None => {
            data.insert("csv-format".into(), false.into());
            let mut hex = String::new();
            for field in &option.fields {
                hex.push_str(&hex_field(field).map_err(|reason| InvalidOptionData {
                    code: option.code,
                    space: option.space.clone(),
                    reason,
                })?);
            }
            if !hex.is_empty() {
                data.insert("data".into(), hex.into());
            }
        }
    }
    Ok(Value::Object(data))
}

fn hex_field(field: &str) -> Result<String, String> {
    let digits: String = field
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("{field:?} is not hex data (unexpected {bad:?})"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("{field:?} has an odd number of hex digits"));
    }
    Ok(digits.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn option(code: u16, space: &str, fields: &[&str]) -> DhcpOption {
        DhcpOption {
            code,
            space: space.to_owned(),
            always_send: false,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn known_option_is_csv() {
        let value = option_data(
            DaemonId(1),
            &StandardOptionDefinitions,
            &option(6, "dhcp4", &["192.0.2.1", "192.0.2.2"]),
        )
        .expect("option data");
        assert_eq!(
            value,
            json!({
                "code": 6,
                "space": "dhcp4",
                "always-send": false,
                "name": "domain-name-servers",
                "csv-format": true,
                "data": "192.0.2.1, 192.0.2.2",
            })
        );
    }

    #[test]
    fn unknown_option_is_hex() {
        let mut opt = option(224, "dhcp4", &["01:02", "0A-0b", "c0 ff"]);
        opt.always_send = true;
        let value = option_data(DaemonId(1), &StandardOptionDefinitions, &opt).expect("hex");
        assert_eq!(value["csv-format"], json!(false));
        assert_eq!(value["data"], json!("01020a0bc0ff"));
        assert_eq!(value["always-send"], json!(true));
        assert!(value.get("name").is_none());
    }

    #[rstest]
    #[case("0x0a", "unexpected 'x'")]
    #[case("hello", "unexpected 'h'")]
    #[case("01:0", "odd number of hex digits")]
    fn malformed_hex_is_rejected(#[case] field: &str, #[case] reason: &str) {
        let err = option_data(
            DaemonId(1),
            &StandardOptionDefinitions,
            &option(224, "dhcp4", &["01", field]),
        )
        .unwrap_err();
        assert_eq!(err.code, 224);
        assert!(err.reason.contains(reason), "got: {err}");
    }

    #[test]
    fn codes_are_looked_up_per_space() {
        let lookup = StandardOptionDefinitions;
        assert_eq!(
            lookup.find(DaemonId(1), 23, "dhcp6").map(|d| d.name),
            Some("dns-servers".to_owned())
        );
        assert_eq!(lookup.find(DaemonId(1), 23, "dhcp4"), None);
        assert_eq!(lookup.find(DaemonId(1), 6, "vendor-4491"), None);
    }
}
