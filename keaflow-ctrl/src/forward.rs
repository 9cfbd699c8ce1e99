//! Command forwarding to Kea control agents.

use async_trait::async_trait;
use keaflow_core::App;

use crate::error::CtrlError;
use crate::protocol::{parse_response_list, Command, ResponseRecord};

/// What came back for one forwarded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Raw response body as returned by the control agent.
    Received(Vec<u8>),
    /// The command could not be delivered or the agent rejected the request.
    Failed(String),
}

/// Outcomes of a forwarded batch, one per command in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardResult {
    pub outcomes: Vec<CommandOutcome>,
}

impl ForwardResult {
    pub fn new(outcomes: Vec<CommandOutcome>) -> Self {
        Self { outcomes }
    }

    /// First transport failure in the batch, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.outcomes.iter().find_map(|outcome| match outcome {
            CommandOutcome::Failed(reason) => Some(reason.as_str()),
            CommandOutcome::Received(_) => None,
        })
    }

    /// Response body of the `index`th command, if it was received.
    pub fn body(&self, index: usize) -> Option<&[u8]> {
        match self.outcomes.get(index) {
            Some(CommandOutcome::Received(body)) => Some(body),
            _ => None,
        }
    }
}

/// Delivers commands to the control agent of an app.
///
/// Implementations return one outcome per command. A transport failure of a
/// single command is reported in its outcome; `Err` is reserved for failures
/// that prevent the whole batch from being attempted.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, app: &App, commands: &[Command]) -> Result<ForwardResult, CtrlError>;
}

/// Forwards a single command and decodes its response batch.
pub async fn forward_and_parse<R: ResponseRecord>(
    forwarder: &dyn Forwarder,
    app: &App,
    command: &Command,
) -> Result<Vec<R>, CtrlError> {
    let result = forwarder
        .forward(app, std::slice::from_ref(command))
        .await?;
    if let Some(reason) = result.first_error() {
        return Err(CtrlError::Transport(reason.to_owned()));
    }
    let body = result
        .body(0)
        .ok_or_else(|| CtrlError::Transport(format!("no response from {app}")))?;
    parse_response_list(command, body)
}
