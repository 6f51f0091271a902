//! Error types for i3 IPC operations

use std::path::PathBuf;
use std::process::ExitStatus;

use miette::Diagnostic;
use thiserror::Error;

use crate::codec::FramingError;
use crate::message::{EventKind, ReplyKind};

/// Errors that can occur when communicating with i3
#[derive(Debug, Error, Diagnostic)]
pub enum IpcError {
    /// The socket discovery command could not be spawned
    #[error("Failed to run `{binary} --get-socketpath`: {source}")]
    #[diagnostic(code(i3ipc::discovery::spawn), help("is the window manager installed and on $PATH?"))]
    DiscoverySpawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The socket discovery command exited unsuccessfully
    #[error("`{binary} --get-socketpath` exited with {status}")]
    #[diagnostic(code(i3ipc::discovery::failed))]
    DiscoveryFailed { binary: String, status: ExitStatus },

    /// The socket discovery command printed nothing
    #[error("`{binary} --get-socketpath` returned an empty path - is i3 running?")]
    #[diagnostic(code(i3ipc::discovery::empty))]
    EmptySocketPath { binary: String },

    /// Failed to connect to the i3 socket
    #[error("Failed to connect to i3 socket at {path}: {source}")]
    #[diagnostic(code(i3ipc::connect))]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Maximum connection attempts exceeded
    #[error("Failed to connect to i3 socket at {path} after {attempts} attempts: {source}")]
    #[diagnostic(code(i3ipc::connect::retries), help("is i3 running?"))]
    MaxRetriesExceeded {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a request frame
    #[error("Failed to send request to i3: {0}")]
    #[diagnostic(code(i3ipc::transport::send))]
    SendFailed(#[source] std::io::Error),

    /// Failed to read from the socket
    #[error("Failed to receive from i3: {0}")]
    #[diagnostic(code(i3ipc::transport::receive))]
    ReceiveFailed(#[source] std::io::Error),

    /// The byte stream is no longer aligned on frame boundaries
    #[error(transparent)]
    #[diagnostic(code(i3ipc::framing))]
    Framing(#[from] FramingError),

    /// Failed to serialize a request payload
    #[error("Failed to serialize request: {0}")]
    #[diagnostic(code(i3ipc::serialize))]
    SerializeFailed(#[source] serde_json::Error),

    /// A reply payload did not match the expected shape
    #[error("Failed to deserialize {kind} reply: {source}")]
    #[diagnostic(code(i3ipc::decode::reply))]
    DeserializeFailed {
        kind: ReplyKind,
        #[source]
        source: serde_json::Error,
    },

    /// A reply that must hold at least one element was an empty list
    #[error("i3 sent an empty {kind} reply")]
    #[diagnostic(code(i3ipc::decode::empty))]
    EmptyReply { kind: ReplyKind },

    /// An event payload did not match the expected shape
    #[error("Failed to decode {kind} event: {source}")]
    #[diagnostic(code(i3ipc::decode::event))]
    EventDecode {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    /// An event frame carried a code outside the known event kinds
    #[error("i3 sent an event with unknown code {code}")]
    #[diagnostic(code(i3ipc::protocol::unknown_event))]
    UnknownEvent { code: u32 },

    /// A reply arrived that no request is waiting for
    #[error("i3 sent an unexpected reply of type {message_type}")]
    #[diagnostic(code(i3ipc::protocol::unexpected_reply))]
    UnexpectedReply { message_type: u32 },

    /// The connection is closed; no further requests are accepted
    #[error("Connection to i3 closed")]
    #[diagnostic(code(i3ipc::closed))]
    ConnectionClosed,

    /// `Connection::run` was entered while another read loop owns the socket
    #[error("The connection's read loop is already running")]
    #[diagnostic(code(i3ipc::already_running))]
    AlreadyRunning,
}
