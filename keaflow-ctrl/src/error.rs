use thiserror::Error;

/// Error surface for the Kea command protocol and command forwarding.
#[derive(Debug, Error)]
pub enum CtrlError {
    #[error("failed to parse Kea command {payload}: {source}")]
    CommandParse {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Kea command {payload} has no command name")]
    EmptyCommand { payload: String },

    #[error("failed to parse responses from Kea {payload}: {source}")]
    ResponseParse {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to compute hashes for Kea responses {payload}: {source}")]
    HashParse {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A daemon processed the command and returned a non-success result.
    #[error("{}", describe_result(.daemon, .result, .text))]
    Result {
        daemon: Option<String>,
        result: i64,
        text: String,
    },

    /// The command did not reach Kea or no usable response came back.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("forwarding task join failure: {0}")]
    Join(String),
}

fn describe_result(daemon: &Option<String>, result: &i64, text: &str) -> String {
    match daemon {
        Some(daemon) => format!("error code {result} returned by Kea {daemon}: {text}"),
        None => format!("error code {result} returned by Kea: {text}"),
    }
}

/// Payload excerpt kept in parse errors.
pub(crate) fn excerpt(payload: &[u8]) -> String {
    const MAX: usize = 256;
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}
