//! Message, reply and event kinds of the i3 IPC protocol

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of request sent to i3
///
/// The discriminant is the type code written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Run one or more i3 commands
    Command = 0,
    /// List all workspaces
    GetWorkspaces = 1,
    /// Subscribe this connection to event kinds
    Subscribe = 2,
    /// List all outputs (monitors)
    GetOutputs = 3,
    /// Fetch the full layout tree
    GetTree = 4,
    /// List all container marks
    GetMarks = 5,
    /// List bar ids, or fetch one bar's configuration
    GetBarConfig = 6,
    /// Query the running i3 version
    GetVersion = 7,
}

/// Kind of reply received from i3
///
/// Every `MessageKind` has exactly one reply kind with the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReplyKind {
    Command = 0,
    Workspaces = 1,
    Subscribe = 2,
    Outputs = 3,
    Tree = 4,
    Marks = 5,
    BarConfig = 6,
    Version = 7,
}

/// Category of an unsolicited event
///
/// Serializes to the name i3 expects in a subscribe payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum EventKind {
    /// Workspace focus, init, empty or urgency changes
    Workspace = 0,
    /// Outputs added, removed or reconfigured
    Output = 1,
    /// Binding mode switched
    Mode = 2,
    /// A window changed (opened, focused, retitled, ...)
    Window = 3,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Command,
        MessageKind::GetWorkspaces,
        MessageKind::Subscribe,
        MessageKind::GetOutputs,
        MessageKind::GetTree,
        MessageKind::GetMarks,
        MessageKind::GetBarConfig,
        MessageKind::GetVersion,
    ];

    /// Type code written to the wire
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The reply kind i3 answers this request with
    pub fn reply_kind(self) -> ReplyKind {
        match self {
            MessageKind::Command => ReplyKind::Command,
            MessageKind::GetWorkspaces => ReplyKind::Workspaces,
            MessageKind::Subscribe => ReplyKind::Subscribe,
            MessageKind::GetOutputs => ReplyKind::Outputs,
            MessageKind::GetTree => ReplyKind::Tree,
            MessageKind::GetMarks => ReplyKind::Marks,
            MessageKind::GetBarConfig => ReplyKind::BarConfig,
            MessageKind::GetVersion => ReplyKind::Version,
        }
    }

    /// Name used by i3's own tooling (`i3-msg -t <name>`)
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::GetWorkspaces => "get_workspaces",
            MessageKind::Subscribe => "subscribe",
            MessageKind::GetOutputs => "get_outputs",
            MessageKind::GetTree => "get_tree",
            MessageKind::GetMarks => "get_marks",
            MessageKind::GetBarConfig => "get_bar_config",
            MessageKind::GetVersion => "get_version",
        }
    }
}

impl ReplyKind {
    pub const ALL: [ReplyKind; 8] = [
        ReplyKind::Command,
        ReplyKind::Workspaces,
        ReplyKind::Subscribe,
        ReplyKind::Outputs,
        ReplyKind::Tree,
        ReplyKind::Marks,
        ReplyKind::BarConfig,
        ReplyKind::Version,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Workspace,
        EventKind::Output,
        EventKind::Mode,
        EventKind::Window,
    ];

    /// Event code, without the event bit
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Workspace => "workspace",
            EventKind::Output => "output",
            EventKind::Mode => "mode",
            EventKind::Window => "window",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Command => "command",
            ReplyKind::Workspaces => "workspaces",
            ReplyKind::Subscribe => "subscribe",
            ReplyKind::Outputs => "outputs",
            ReplyKind::Tree => "tree",
            ReplyKind::Marks => "marks",
            ReplyKind::BarConfig => "bar_config",
            ReplyKind::Version => "version",
        };
        f.write_str(name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_kind_shares_request_code() {
        for kind in MessageKind::ALL {
            assert_eq!(kind.reply_kind().code(), kind.code(), "{kind}");
        }
    }

    #[test]
    fn test_message_kind_codes_are_stable() {
        assert_eq!(MessageKind::Command.code(), 0);
        assert_eq!(MessageKind::GetTree.code(), 4);
        assert_eq!(MessageKind::GetVersion.code(), 7);
        assert_eq!(MessageKind::from_code(2), Some(MessageKind::Subscribe));
        assert_eq!(MessageKind::from_code(8), None);
    }

    #[test]
    fn test_reply_kind_from_code() {
        assert_eq!(ReplyKind::from_code(5), Some(ReplyKind::Marks));
        assert_eq!(ReplyKind::from_code(42), None);
    }

    #[test]
    fn test_event_kind_codes() {
        assert_eq!(EventKind::from_code(0), Some(EventKind::Workspace));
        assert_eq!(EventKind::from_code(3), Some(EventKind::Window));
        assert_eq!(EventKind::from_code(4), None);
    }

    #[test]
    fn test_event_kind_serializes_as_subscribe_name() {
        let json = serde_json::to_string(&[EventKind::Workspace, EventKind::Mode]).unwrap();
        assert_eq!(json, r#"["workspace","mode"]"#);

        for kind in EventKind::ALL {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.name())
            );
        }
    }
}
