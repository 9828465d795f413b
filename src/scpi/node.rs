// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The completion tree built from an instrument's command catalog.
//!
//! Every realized command is a path of segments; segments carrying a
//! numeric suffix (`OUTPut1`, `OUTPut2`, …) are collapsed into one node
//! whose `start..=stop` range widens as more source commands agree on the
//! same text. The tree is a plain value: snapshots handed to callers are
//! clones and never observe later inserts.

use serde::{Deserialize, Serialize};

/// One path segment of a realized command.
///
/// `text` keeps the trailing `?` of query forms, so `OUTPut` and `OUTPut?`
/// are distinct nodes. Two infos describe the same node iff `text` and
/// `suffixed` match; `start`/`stop` are merged on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub text: String,
    pub start: u32,
    pub stop: u32,
    pub suffixed: bool,
}

impl NodeInfo {
    /// A segment without a numeric suffix.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A segment with an inclusive numeric suffix range.
    pub fn suffixed(text: impl Into<String>, start: u32, stop: u32) -> Self {
        Self {
            text: text.into(),
            start,
            stop,
            suffixed: true,
        }
    }

    /// Node identity: same text and same suffixed-ness.
    pub fn same_node(&self, other: &NodeInfo) -> bool {
        self.text == other.text && self.suffixed == other.suffixed
    }
}

/// A node of the completion tree. The root carries a default (empty)
/// `content` and exists only to hold the top-level children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScpiNode {
    pub content: NodeInfo,
    pub children: Vec<ScpiNode>,
}

impl ScpiNode {
    pub fn new(content: NodeInfo) -> Self {
        Self {
            content,
            children: Vec::new(),
        }
    }

    /// Inserts one realized command, creating missing children at their
    /// sorted position and widening `start`/`stop` on nodes the command
    /// agrees with.
    pub fn insert_command(&mut self, command: &[NodeInfo]) {
        let Some((first, rest)) = command.split_first() else {
            return;
        };
        match self
            .children
            .iter()
            .position(|child| child.content.same_node(first))
        {
            Some(index) => {
                let child = &mut self.children[index];
                child.content.start = child.content.start.min(first.start);
                child.content.stop = child.content.stop.max(first.stop);
                child.insert_command(rest);
            },
            None => {
                let index = self.sorted_insert_index(first);
                self.children.insert(index, ScpiNode::new(first.clone()));
                self.children[index].insert_command(rest);
            },
        }
    }

    /// Children stay ordered lexicographically by text; on a text tie the
    /// unsuffixed node comes first.
    fn sorted_insert_index(&self, info: &NodeInfo) -> usize {
        self.children
            .iter()
            .position(|node| {
                info.text < node.content.text
                    || (info.text == node.content.text
                        && !info.suffixed
                        && node.content.suffixed)
            })
            .unwrap_or(self.children.len())
    }

    /// Child lookup by segment text, the way the completion front-end
    /// walks user input.
    pub fn child(&self, text: &str) -> Option<&ScpiNode> {
        self.children.iter().find(|child| child.content.text == text)
    }

    /// Follows a full path by node identity; `None` when the path leaves
    /// the tree.
    pub fn walk(&self, path: &[NodeInfo]) -> Option<&ScpiNode> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.children
            .iter()
            .find(|child| child.content.same_node(first))
            .and_then(|child| child.walk(rest))
    }

    /// Segment texts of the direct children, in display order.
    pub fn suggestions(&self) -> Vec<&str> {
        self.children
            .iter()
            .map(|child| child.content.text.as_str())
            .collect()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
