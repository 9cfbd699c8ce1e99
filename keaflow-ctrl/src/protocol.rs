//! Kea control channel protocol.
//!
//! A [`Command`] is sent to the Kea Control Agent as a single JSON object:
//!
//! ```text
//! {"command": "subnet4-add", "service": ["dhcp4"], "arguments": {...}}
//! ```
//!
//! The agent answers with a JSON array holding one response per service, in
//! the order the services were listed in the request. Responses are matched
//! with daemons by position, which is why the daemon list is sorted when the
//! command is built.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{excerpt, CtrlError};

pub const RESPONSE_SUCCESS: i64 = 0;
pub const RESPONSE_ERROR: i64 = 1;
pub const RESPONSE_COMMAND_UNSUPPORTED: i64 = 2;
pub const RESPONSE_EMPTY: i64 = 3;

/// Command arguments: an arbitrary JSON object.
pub type Arguments = Map<String, Value>;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A command addressed to one or more Kea daemons behind a control agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    command: String,
    #[serde(rename = "service", default, skip_serializing_if = "Vec::is_empty")]
    daemons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Arguments>,
}

impl Command {
    /// Builds a command. The daemon list is sorted so the wire form is
    /// deterministic and responses can be correlated by position.
    pub fn new(
        command: impl Into<String>,
        mut daemons: Vec<String>,
        arguments: Option<Arguments>,
    ) -> Self {
        daemons.sort();
        Self {
            command: command.into(),
            daemons,
            arguments,
        }
    }

    /// Command addressed to a single daemon.
    pub fn for_daemon(
        command: impl Into<String>,
        daemon: &str,
        arguments: Option<Arguments>,
    ) -> Self {
        Self::new(command, vec![daemon.to_owned()], arguments)
    }

    /// Parses a command from its JSON form.
    pub fn from_json(payload: &str) -> Result<Self, CtrlError> {
        let parsed: Self =
            serde_json::from_str(payload).map_err(|source| CtrlError::CommandParse {
                payload: excerpt(payload.as_bytes()),
                source,
            })?;
        if parsed.command.trim().is_empty() {
            return Err(CtrlError::EmptyCommand {
                payload: excerpt(payload.as_bytes()),
            });
        }
        Ok(Self::new(parsed.command, parsed.daemons, parsed.arguments))
    }

    /// JSON form sent to the control agent.
    pub fn marshal(&self) -> Result<String, CtrlError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> &str {
        &self.command
    }

    pub fn daemons(&self) -> &[String] {
        &self.daemons
    }

    pub fn arguments(&self) -> Option<&Arguments> {
        self.arguments.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A record a response batch can be decoded into.
///
/// The daemon name is not part of the wire format; it is attached after
/// decoding by position (see [`parse_response_list`]).
pub trait ResponseRecord: DeserializeOwned {
    fn result(&self) -> i64;

    fn text(&self) -> &str;

    fn daemon(&self) -> Option<&str>;

    fn set_daemon(&mut self, daemon: String);

    /// Error describing a non-success result, if any.
    fn error(&self) -> Option<CtrlError> {
        if self.result() == RESPONSE_SUCCESS {
            return None;
        }
        Some(CtrlError::Result {
            daemon: self.daemon().map(str::to_owned),
            result: self.result(),
            text: self.text().to_owned(),
        })
    }
}

/// A record that also carries a hash of the raw `arguments` payload.
/// Decode batches of such records with [`parse_hashed_response_list`].
pub trait HashedResponseRecord: ResponseRecord {
    fn set_arguments_hash(&mut self, hash: String);
}

/// Response from a single Kea daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    #[serde(skip)]
    pub daemon: Option<String>,
}

/// Response from a single Kea daemon with a hash of its arguments, for
/// cheap detection of changed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashedResponse {
    pub result: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    #[serde(skip)]
    pub daemon: Option<String>,
    /// `None` when the response carried no arguments.
    #[serde(skip)]
    pub arguments_hash: Option<String>,
}

macro_rules! response_record {
    ($name:ident) => {
        impl ResponseRecord for $name {
            fn result(&self) -> i64 {
                self.result
            }

            fn text(&self) -> &str {
                &self.text
            }

            fn daemon(&self) -> Option<&str> {
                self.daemon.as_deref()
            }

            fn set_daemon(&mut self, daemon: String) {
                self.daemon = Some(daemon);
            }
        }
    };
}

response_record!(Response);
response_record!(HashedResponse);

impl HashedResponseRecord for HashedResponse {
    fn set_arguments_hash(&mut self, hash: String) {
        self.arguments_hash = Some(hash);
    }
}

/// Captures the `arguments` of a response verbatim for hashing.
#[derive(Deserialize)]
struct RawArguments {
    #[serde(default)]
    arguments: Option<Box<RawValue>>,
}

/// Hex encoded SHA-256 of a raw arguments payload.
pub fn arguments_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Decodes a response batch and tags the records with the daemons of
/// `request` by position: the Nth record gets the Nth daemon name, for the
/// first `min(daemons, records)` records.
pub fn parse_response_list<R: ResponseRecord>(
    request: &Command,
    payload: &[u8],
) -> Result<Vec<R>, CtrlError> {
    let mut parsed: Vec<R> =
        serde_json::from_slice(payload).map_err(|source| CtrlError::ResponseParse {
            payload: excerpt(payload),
            source,
        })?;

    for (record, daemon) in parsed.iter_mut().zip(request.daemons()) {
        record.set_daemon(daemon.clone());
    }
    Ok(parsed)
}

/// Like [`parse_response_list`], and additionally hashes each record's raw
/// `arguments` payload. Records whose response carried no arguments keep no
/// hash. If fewer hashes than records can be matched, filling stops.
pub fn parse_hashed_response_list<R: HashedResponseRecord>(
    request: &Command,
    payload: &[u8],
) -> Result<Vec<R>, CtrlError> {
    let mut parsed: Vec<R> = parse_response_list(request, payload)?;
    if parsed.is_empty() {
        return Ok(parsed);
    }

    let raw: Vec<RawArguments> =
        serde_json::from_slice(payload).map_err(|source| CtrlError::HashParse {
            payload: excerpt(payload),
            source,
        })?;

    for (record, raw) in parsed.iter_mut().zip(raw) {
        if let Some(arguments) = raw.arguments {
            record.set_arguments_hash(arguments_hash(arguments.get()));
        }
    }
    Ok(parsed)
}

/// First non-success result in a batch, as an error.
pub fn first_response_error<R: ResponseRecord>(responses: &[R]) -> Option<CtrlError> {
    responses.iter().find_map(ResponseRecord::error)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
