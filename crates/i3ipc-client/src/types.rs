//! Typed reply payloads
//!
//! Field names follow i3's JSON. Everything i3 may leave out or send as
//! `null` has a default so a reply from an older or newer i3 still decodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A rectangle in absolute X11 coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One entry of the `get_workspaces` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Workspace number, or -1 for a workspace with a purely textual name
    pub num: i32,
    pub name: String,
    /// Shown on some output
    pub visible: bool,
    pub focused: bool,
    pub urgent: bool,
    pub rect: Rect,
    /// Name of the output this workspace lives on
    pub output: String,
}

/// One entry of the `get_outputs` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub primary: bool,
    /// Name of the visible workspace, `None` for inactive outputs
    #[serde(default)]
    pub current_workspace: Option<String>,
    pub rect: Rect,
}

/// Kind of container in the layout tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Output,
    #[default]
    Con,
    FloatingCon,
    Workspace,
    Dockarea,
}

/// Window border style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Border {
    #[default]
    Normal,
    None,
    #[serde(alias = "1pixel")]
    Pixel,
}

/// Container layout
///
/// Unknown layout names are rejected rather than mapped to a default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    SplitH,
    SplitV,
    Stacked,
    Tabbed,
    Dockarea,
    Output,
}

/// A node of the layout tree returned by `get_tree`
///
/// The tree is self-similar: the root holds outputs, outputs hold workspaces
/// (inside a content container), workspaces hold containers and windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeNode {
    /// Internal container id, stable for the container's lifetime
    pub id: u64,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub border: Border,
    pub layout: Layout,
    /// Share of the parent container, `None` at the top levels
    pub percent: Option<f64>,
    pub rect: Rect,
    /// Drawn area of the client window, relative to `rect`
    pub window_rect: Rect,
    /// Title bar area, relative to the parent
    pub deco_rect: Rect,
    /// Geometry the client originally asked for
    pub geometry: Rect,
    /// X11 window id, `None` for pure containers
    pub window: Option<u64>,
    pub urgent: bool,
    pub focused: bool,
    pub nodes: Vec<TreeNode>,
    pub floating_nodes: Vec<TreeNode>,
    pub marks: Vec<String>,
}

impl TreeNode {
    /// The focused node in this subtree, searched depth first
    pub fn find_focused(&self) -> Option<&TreeNode> {
        if self.focused {
            return Some(self);
        }
        self.children().find_map(TreeNode::find_focused)
    }

    /// Every workspace node in this subtree, in tree order
    ///
    /// Includes i3's internal `__i3_scratch` workspace.
    pub fn workspaces(&self) -> Vec<&TreeNode> {
        let mut found = Vec::new();
        self.collect_workspaces(&mut found);
        found
    }

    fn collect_workspaces<'a>(&'a self, found: &mut Vec<&'a TreeNode>) {
        if self.node_type == NodeType::Workspace {
            found.push(self);
            return;
        }
        for child in self.children() {
            child.collect_workspaces(found);
        }
    }

    /// Tiling children followed by floating children
    pub fn children(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().chain(self.floating_nodes.iter())
    }
}

/// Reply to `get_version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// e.g. "4.22 (2023-01-02)"
    pub human_readable: String,
    #[serde(default)]
    pub loaded_config_file_name: Option<String>,
}

fn default_bar_mode() -> String {
    "dock".to_string()
}

fn default_bar_position() -> String {
    "bottom".to_string()
}

fn default_true() -> bool {
    true
}

/// Reply to `get_bar_config` with a bar id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarConfig {
    pub id: String,
    #[serde(default = "default_bar_mode")]
    pub mode: String,
    #[serde(default = "default_bar_position")]
    pub position: String,
    #[serde(default)]
    pub status_command: Option<String>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default = "default_true")]
    pub workspace_buttons: bool,
    #[serde(default = "default_true")]
    pub binding_mode_indicator: bool,
    #[serde(default)]
    pub verbose: bool,
    /// Color name to `#rrggbb`
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

/// Outcome of one command, or of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessReply {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// `command` replies are a list; i3 answers `subscribe` with a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SuccessReplies {
    Many(Vec<SuccessReply>),
    One(SuccessReply),
}

impl SuccessReplies {
    pub(crate) fn into_vec(self) -> Vec<SuccessReply> {
        match self {
            SuccessReplies::Many(replies) => replies,
            SuccessReplies::One(reply) => vec![reply],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{
        "id": 1, "name": "root", "type": "root", "border": "normal", "layout": "splith",
        "percent": null, "rect": {"x": 0, "y": 0, "width": 1920, "height": 1080},
        "window": null, "urgent": false, "focused": false,
        "nodes": [{
            "id": 2, "name": "eDP-1", "type": "output", "layout": "output",
            "nodes": [{
                "id": 3, "name": "content", "type": "con", "layout": "splith",
                "nodes": [
                    {
                        "id": 4, "name": "1", "type": "workspace", "layout": "splith",
                        "nodes": [{
                            "id": 5, "name": "term", "type": "con", "border": "pixel",
                            "percent": 1.0, "window": 41943043, "focused": true,
                            "marks": ["main"]
                        }]
                    },
                    {
                        "id": 6, "name": "2", "type": "workspace", "layout": "tabbed",
                        "floating_nodes": [{
                            "id": 7, "type": "floating_con", "border": "1pixel",
                            "nodes": [{"id": 8, "name": "popup", "window": 2}]
                        }]
                    }
                ]
            }]
        }]
    }"#;

    #[test]
    fn test_tree_decodes_with_defaults() {
        let root: TreeNode = serde_json::from_str(TREE).unwrap();
        assert_eq!(root.node_type, NodeType::Root);
        assert_eq!(root.rect.width, 1920);
        assert!(root.percent.is_none());

        let output = &root.nodes[0];
        assert_eq!(output.node_type, NodeType::Output);
        assert_eq!(output.layout, Layout::Output);
        assert_eq!(output.border, Border::Normal);

        let floating = &output.nodes[0].nodes[1].floating_nodes[0];
        assert_eq!(floating.node_type, NodeType::FloatingCon);
        assert_eq!(floating.border, Border::Pixel);
        assert_eq!(floating.nodes[0].node_type, NodeType::Con);
    }

    #[test]
    fn test_find_focused() {
        let root: TreeNode = serde_json::from_str(TREE).unwrap();
        let focused = root.find_focused().expect("a focused node");
        assert_eq!(focused.id, 5);
        assert_eq!(focused.window, Some(41943043));
        assert_eq!(focused.marks, vec!["main".to_string()]);

        let unfocused = TreeNode::default();
        assert!(unfocused.find_focused().is_none());
    }

    #[test]
    fn test_workspaces_in_tree_order() {
        let root: TreeNode = serde_json::from_str(TREE).unwrap();
        let names: Vec<_> = root
            .workspaces()
            .iter()
            .filter_map(|ws| ws.name.as_deref())
            .collect();
        assert_eq!(names, ["1", "2"]);
    }

    #[test]
    fn test_border_and_layout_reject_unknown() {
        assert!(serde_json::from_str::<Border>(r#""fancy""#).is_err());
        assert!(serde_json::from_str::<Layout>(r#""default""#).is_err());
        assert_eq!(
            serde_json::from_str::<Border>(r#""1pixel""#).unwrap(),
            Border::Pixel
        );
        assert_eq!(
            serde_json::from_str::<Layout>(r#""splitv""#).unwrap(),
            Layout::SplitV
        );
    }

    #[test]
    fn test_workspace_and_output_decode() {
        let workspaces: Vec<Workspace> = serde_json::from_str(
            r#"[{"num": -1, "name": "mail", "visible": true, "focused": false,
                 "urgent": false, "rect": {"x": 0, "y": 20, "width": 800, "height": 580},
                 "output": "HDMI-1"}]"#,
        )
        .unwrap();
        assert_eq!(workspaces[0].num, -1);
        assert_eq!(workspaces[0].rect.y, 20);

        let outputs: Vec<Output> = serde_json::from_str(
            r#"[{"name": "xroot-0", "active": false, "primary": false,
                 "current_workspace": null, "rect": {"x": 0, "y": 0, "width": 1, "height": 1}},
                {"name": "HDMI-1", "active": true,
                 "current_workspace": "mail", "rect": {"x": 0, "y": 0, "width": 800, "height": 600}}]"#,
        )
        .unwrap();
        assert!(outputs[0].current_workspace.is_none());
        assert_eq!(outputs[1].current_workspace.as_deref(), Some("mail"));
        assert!(!outputs[1].primary);
    }

    #[test]
    fn test_bar_config_defaults() {
        let bar: BarConfig = serde_json::from_str(r#"{"id": "bar-0"}"#).unwrap();
        assert_eq!(bar.mode, "dock");
        assert_eq!(bar.position, "bottom");
        assert!(bar.workspace_buttons);
        assert!(bar.colors.is_empty());
    }

    #[test]
    fn test_success_replies_accept_both_shapes() {
        let list: SuccessReplies =
            serde_json::from_str(r#"[{"success": true}, {"success": false, "error": "nope"}]"#)
                .unwrap();
        let list = list.into_vec();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].error.as_deref(), Some("nope"));

        let single: SuccessReplies = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(single.into_vec(), vec![SuccessReply { success: true, error: None }]);
    }
}
