//! HTTP forwarder talking JSON to the Kea Control Agent.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use keaflow_core::App;
use tracing::{debug, warn};

use crate::error::CtrlError;
use crate::forward::{CommandOutcome, ForwardResult, Forwarder};
use crate::protocol::Command;

/// Upper bound on a response body read from a control agent.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Sends each command as a separate `POST` to the app's control agent.
#[derive(Clone)]
pub struct HttpForwarder {
    agent: ureq::Agent,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }

    fn post(agent: &ureq::Agent, url: &str, payload: &str) -> CommandOutcome {
        let response = match agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(payload)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let status = response.status_text().to_owned();
                return CommandOutcome::Failed(format!("HTTP {code} {status} from {url}"));
            }
            Err(err) => return CommandOutcome::Failed(err.to_string()),
        };

        read_body(response.into_reader(), MAX_BODY_BYTES, url)
    }
}

/// Reads at most `limit` bytes. A longer body is a failure, never a truncated
/// success.
fn read_body(reader: impl Read, limit: u64, url: &str) -> CommandOutcome {
    let mut body = Vec::new();
    if let Err(err) = reader.take(limit + 1).read_to_end(&mut body) {
        return CommandOutcome::Failed(format!("failed to read response from {url}: {err}"));
    }
    if body.len() as u64 > limit {
        return CommandOutcome::Failed(format!("response from {url} exceeds {limit} bytes"));
    }
    CommandOutcome::Received(body)
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, app: &App, commands: &[Command]) -> Result<ForwardResult, CtrlError> {
        let url = app.url();
        let payloads = commands
            .iter()
            .map(Command::marshal)
            .collect::<Result<Vec<_>, _>>()?;
        let agent = self.agent.clone();

        let outcomes = tokio::task::spawn_blocking(move || {
            payloads
                .iter()
                .map(|payload| {
                    debug!(url = %url, payload = %payload, "forwarding Kea command");
                    let outcome = Self::post(&agent, &url, payload);
                    if let CommandOutcome::Failed(reason) = &outcome {
                        warn!(url = %url, reason = %reason, "Kea command was not delivered");
                    }
                    outcome
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|err| CtrlError::Join(err.to_string()))?;

        Ok(ForwardResult::new(outcomes))
    }
}
