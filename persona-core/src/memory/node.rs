//! Concept node types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node in a persona's memory stream.
///
/// Ids start at 1 and are never reused; 0 means "no node".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(0);

    /// Key used for this node in `nodes.json` and as evidence reference.
    pub fn key(self) -> String {
        format!("node_{}", self.0)
    }

    /// Parse a `node_N` reference.
    pub fn from_key(key: &str) -> Option<Self> {
        key.strip_prefix("node_")?.parse().ok().map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Event,
    Thought,
    Chat,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Event => "event",
            NodeKind::Thought => "thought",
            NodeKind::Chat => "chat",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject, predicate, object triple. Serialized as a three element array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct Spo {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Spo {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Whether this is the placeholder `is idle` triple.
    pub fn is_idle(&self) -> bool {
        self.predicate == "is" && self.object == "idle"
    }
}

impl From<(String, String, String)> for Spo {
    fn from((subject, predicate, object): (String, String, String)) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl From<Spo> for (String, String, String) {
    fn from(spo: Spo) -> Self {
        (spo.subject, spo.predicate, spo.object)
    }
}

/// One line of a conversation. Serialized as `[speaker, sentence]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Utterance {
    pub speaker: String,
    pub sentence: String,
}

impl Utterance {
    pub fn new(speaker: impl Into<String>, sentence: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            sentence: sentence.into(),
        }
    }
}

impl From<(String, String)> for Utterance {
    fn from((speaker, sentence): (String, String)) -> Self {
        Self { speaker, sentence }
    }
}

impl From<Utterance> for (String, String) {
    fn from(u: Utterance) -> Self {
        (u.speaker, u.sentence)
    }
}

/// Payload of a node: evidence for events and thoughts, a transcript for chats.
#[derive(Debug, Clone, PartialEq)]
pub enum Filling {
    Evidence(Vec<NodeId>),
    Transcript(Vec<Utterance>),
}

impl Filling {
    pub fn evidence(&self) -> &[NodeId] {
        match self {
            Filling::Evidence(ids) => ids,
            Filling::Transcript(_) => &[],
        }
    }

    pub fn transcript(&self) -> &[Utterance] {
        match self {
            Filling::Transcript(lines) => lines,
            Filling::Evidence(_) => &[],
        }
    }
}

/// A single memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptNode {
    pub id: NodeId,
    /// Position among nodes of the same kind, oldest first
    pub type_index: usize,
    pub kind: NodeKind,
    pub depth: u32,
    pub created: NaiveDateTime,
    pub last_accessed: NaiveDateTime,
    pub expiration: Option<NaiveDateTime>,
    pub spo: Spo,
    pub description: String,
    pub embedding_key: String,
    pub importance: i32,
    pub valence: i32,
    pub keywords: Vec<String>,
    pub filling: Filling,
}

/// Everything needed to append a node, minus what the store assigns.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub spo: Spo,
    pub description: String,
    pub keywords: Vec<String>,
    pub importance: i32,
    pub valence: i32,
    pub created: NaiveDateTime,
    pub expiration: Option<NaiveDateTime>,
    pub embedding_key: String,
    pub embedding: Vec<f64>,
}

/// Scoped update of the mutable fields of a node.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub last_accessed: Option<NaiveDateTime>,
    pub importance: Option<i32>,
    pub valence: Option<i32>,
    pub description: Option<String>,
    pub expiration: Option<Option<NaiveDateTime>>,
}

impl NodePatch {
    /// Patch that only touches the access time.
    pub fn accessed(at: NaiveDateTime) -> Self {
        Self {
            last_accessed: Some(at),
            ..Default::default()
        }
    }
}
