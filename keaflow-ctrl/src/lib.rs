//! Kea control channel: command/response protocol and forwarding to control
//! agents.

mod error;
pub mod forward;
pub mod http;
pub mod protocol;

pub use error::CtrlError;
pub use forward::{forward_and_parse, CommandOutcome, ForwardResult, Forwarder};
pub use http::HttpForwarder;
pub use protocol::{
    arguments_hash, first_response_error, parse_hashed_response_list, parse_response_list,
    Arguments, Command, HashedResponse, HashedResponseRecord, Response, ResponseRecord,
    RESPONSE_COMMAND_UNSUPPORTED, RESPONSE_EMPTY, RESPONSE_ERROR, RESPONSE_SUCCESS,
};
