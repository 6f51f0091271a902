//! i3 IPC client
//!
//! This crate talks to the i3 window manager over its Unix domain socket.
//! It enables a status bar (or any other tool) to:
//! - Run i3 commands and query workspaces, outputs, marks and the layout tree
//! - Subscribe to workspace, output, mode and window events
//! - Share one socket between request/reply traffic and the event stream
//!
//! ## Architecture
//!
//! - `codec`: the `i3-ipc` frame format, as pure functions and a `tokio_util` codec
//! - `transport`: `FrameReader` / `FrameWriter` over `FramedRead` / `FramedWrite`
//! - `correlator`: matches replies to waiting callers, FIFO per reply kind
//! - `events`: typed event decoding and per-category callbacks
//! - `Connection`: the public facade that ties everything together
//!
//! ## Protocol
//!
//! Every message is framed as `"i3-ipc" | u32 length | u32 type | payload`,
//! integers little-endian, payload JSON. Replies reuse the request's type code.
//! Events set bit 31 of the type word.
//!
//! ```ignore
//! let conn = Connection::attach().await?;
//! let reader = conn.spawn();
//!
//! conn.events().on_workspace_focus(|current, _old| {
//!     println!("now on {:?}", current.and_then(|n| n.name.as_deref()));
//! });
//! conn.subscribe(&[EventKind::Workspace]).await?;
//! conn.command("workspace 2").await?;
//!
//! reader.await??;
//! ```

pub mod codec;
mod config;
mod connection;
mod correlator;
mod error;
pub mod events;
mod message;
pub mod transport;
mod types;

pub use codec::{Frame, FramingError};
pub use config::{ClientConfig, DEFAULT_MAX_PAYLOAD, DEFAULT_WM_BINARY, SOCKET_ENV};
pub use connection::{discover_socket_path, Connection};
pub use error::IpcError;
pub use events::{
    Event, EventCategory, EventDispatcher, ModeEvent, WindowEvent, WorkspaceChange, WorkspaceEvent,
};
pub use message::{EventKind, MessageKind, ReplyKind};
pub use types::{
    BarConfig, Border, Layout, NodeType, Output, Rect, SuccessReply, TreeNode, Version, Workspace,
};
