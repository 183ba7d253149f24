//! Remote tree model
//!
//! The deployment API describes a deployment's files as nested JSON nodes:
//!
//! ```json
//! [{ "name": "src", "type": "directory", "children": [
//!     { "name": "a.txt", "type": "file", "uid": "u1", "mode": 33188 }
//! ]}]
//! ```
//!
//! The raw form is converted once into an immutable [`RemoteNode`] forest whose
//! [`NodeKind`] decides which fields exist. Kinds the engine does not know map
//! to [`NodeKind::Unsupported`] instead of failing the parse.

use serde::Deserialize;

use crate::error::Result;

/// Node kind strings as sent by the API
const KIND_DIRECTORY: &str = "directory";
const KIND_FILE: &str = "file";

/// One entry in the remote tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteNode {
    /// Single path segment (not a full path)
    pub name: String,
    /// What the node is, with the fields that kind carries
    pub kind: NodeKind,
}

/// Kind of a remote node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Directory with ordered children
    Directory {
        /// Child nodes in API order
        children: Vec<RemoteNode>,
    },
    /// Downloadable file
    File {
        /// Opaque handle for the download endpoint
        remote_id: String,
        /// Unix mode, if reported
        mode: Option<u32>,
    },
    /// Anything the engine must not fetch ("lambda", unknown kinds)
    Unsupported {
        /// The kind string as reported
        kind: String,
    },
}

impl RemoteNode {
    /// Directory node
    pub fn directory(name: impl Into<String>, children: Vec<RemoteNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory { children },
        }
    }

    /// File node
    pub fn file(name: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File {
                remote_id: remote_id.into(),
                mode: None,
            },
        }
    }

    /// Unsupported node
    pub fn unsupported(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Unsupported { kind: kind.into() },
        }
    }

    /// Children of a directory; empty for leaves
    pub fn children(&self) -> &[RemoteNode] {
        match &self.kind {
            NodeKind::Directory { children } => children,
            _ => &[],
        }
    }

    /// Number of `File` nodes at or below this node
    pub fn file_count(&self) -> usize {
        match &self.kind {
            NodeKind::File { .. } => 1,
            NodeKind::Directory { children } => children.iter().map(RemoteNode::file_count).sum(),
            NodeKind::Unsupported { .. } => 0,
        }
    }
}

/// Node as it appears on the wire
#[derive(Debug, Deserialize)]
struct RawNode {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    mode: Option<u32>,
    #[serde(default)]
    children: Option<Vec<RawNode>>,
}

impl From<RawNode> for RemoteNode {
    fn from(raw: RawNode) -> Self {
        let kind = match (raw.kind.as_str(), raw.uid) {
            (KIND_DIRECTORY, _) => NodeKind::Directory {
                children: raw
                    .children
                    .unwrap_or_default()
                    .into_iter()
                    .map(RemoteNode::from)
                    .collect(),
            },
            (KIND_FILE, Some(remote_id)) => NodeKind::File {
                remote_id,
                mode: raw.mode,
            },
            // A file without a handle cannot be fetched
            (KIND_FILE, None) => NodeKind::Unsupported {
                kind: "file (missing uid)".to_string(),
            },
            (other, _) => NodeKind::Unsupported {
                kind: other.to_string(),
            },
        };
        Self {
            name: raw.name,
            kind,
        }
    }
}

/// Parse a raw tree response into a node forest
pub fn parse_tree(body: &[u8]) -> Result<Vec<RemoteNode>> {
    let raw: Vec<RawNode> = serde_json::from_slice(body)?;
    Ok(raw.into_iter().map(RemoteNode::from).collect())
}
