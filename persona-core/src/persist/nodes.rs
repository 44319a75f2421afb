//! Memory stream files: `nodes.json`, `kw_strength.json`, `embeddings.json`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path as FsPath;

use super::formats::{memory_time, memory_time_opt, nullable};
use super::{load_json, PersistError, PersistResult};
use crate::memory::{
    AssociativeMemory, ConceptNode, Embeddings, Filling, KeywordStrength, NodeDraft, NodeId, NodeKind,
    NodePatch, Spo, Utterance,
};

/// One entry of `nodes.json`, keyed by `node_<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_count: u32,
    pub type_count: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub depth: u32,
    #[serde(with = "memory_time")]
    pub created: NaiveDateTime,
    #[serde(default, with = "memory_time_opt")]
    pub expiration: Option<NaiveDateTime>,
    #[serde(default, with = "memory_time_opt")]
    pub last_accessed: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "nullable")]
    pub subject: String,
    #[serde(default, deserialize_with = "nullable")]
    pub predicate: String,
    #[serde(default, deserialize_with = "nullable")]
    pub object: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub embedding_key: String,
    pub poignancy: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub valence: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub keywords: Vec<String>,
    /// Evidence ids for events and thoughts, `[speaker, sentence]` pairs for chats
    #[serde(default)]
    pub filling: Value,
}

impl NodeRecord {
    fn from_node(node: &ConceptNode) -> Self {
        let filling = match &node.filling {
            Filling::Evidence(ids) => Value::from(ids.iter().map(|id| id.key()).collect::<Vec<_>>()),
            Filling::Transcript(lines) => Value::from(
                lines
                    .iter()
                    .map(|u| vec![u.speaker.clone(), u.sentence.clone()])
                    .collect::<Vec<_>>(),
            ),
        };

        Self {
            node_count: node.id.0,
            type_count: node.type_index + 1,
            kind: node.kind.as_str().to_string(),
            depth: node.depth,
            created: node.created,
            expiration: node.expiration,
            last_accessed: Some(node.last_accessed),
            subject: node.spo.subject.clone(),
            predicate: node.spo.predicate.clone(),
            object: node.spo.object.clone(),
            description: node.description.clone(),
            embedding_key: node.embedding_key.clone(),
            poignancy: node.importance,
            valence: node.valence,
            keywords: node.keywords.clone(),
            filling,
        }
    }

    fn kind(&self) -> PersistResult<NodeKind> {
        match self.kind.as_str() {
            "event" => Ok(NodeKind::Event),
            "thought" => Ok(NodeKind::Thought),
            "chat" => Ok(NodeKind::Chat),
            other => Err(PersistError::Corruption(format!(
                "node_{} has unknown type {other:?}",
                self.node_count
            ))),
        }
    }

    fn filling(&self, kind: NodeKind) -> PersistResult<Filling> {
        let bad = || {
            PersistError::Corruption(format!(
                "node_{} has malformed {kind} filling: {}",
                self.node_count, self.filling
            ))
        };
        let evidence = |v: &Value| v.as_str().and_then(NodeId::from_key).ok_or_else(bad);

        match kind {
            NodeKind::Chat => {
                let lines: Vec<Utterance> = serde_json::from_value(self.filling.clone()).map_err(|_| bad())?;
                Ok(Filling::Transcript(lines))
            }
            NodeKind::Event | NodeKind::Thought => match &self.filling {
                Value::Null => Ok(Filling::Evidence(Vec::new())),
                single @ Value::String(_) => Ok(Filling::Evidence(vec![evidence(single)?])),
                Value::Array(items) => Ok(Filling::Evidence(
                    items.iter().map(evidence).collect::<PersistResult<_>>()?,
                )),
                _ => Err(bad()),
            },
        }
    }
}

/// `kw_strength.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordStrengthRecord {
    #[serde(default, deserialize_with = "nullable")]
    pub kw_strength_event: KeywordStrength,
    #[serde(default, deserialize_with = "nullable")]
    pub kw_strength_thought: KeywordStrength,
}

impl KeywordStrengthRecord {
    pub fn from_memory(memory: &AssociativeMemory) -> Self {
        Self {
            kw_strength_event: memory.event_strength().clone(),
            kw_strength_thought: memory.thought_strength().clone(),
        }
    }
}

pub(super) fn node_records(memory: &AssociativeMemory) -> BTreeMap<String, NodeRecord> {
    memory
        .nodes()
        .iter()
        .map(|node| (node.id.key(), NodeRecord::from_node(node)))
        .collect()
}

/// Rebuild a memory stream by replaying nodes in id order.
///
/// Keys must run `node_1..node_N` without gaps. Embeddings and keyword
/// strengths come from their tables; type ordinals are recomputed.
pub(super) fn replay(
    mut records: BTreeMap<String, NodeRecord>,
    embeddings: Embeddings,
    strength: KeywordStrengthRecord,
) -> PersistResult<AssociativeMemory> {
    let mut memory =
        AssociativeMemory::with_tables(embeddings, strength.kw_strength_event, strength.kw_strength_thought);

    for i in 1..=records.len() as u32 {
        let key = NodeId(i).key();
        let record = records
            .remove(&key)
            .ok_or_else(|| PersistError::Corruption(format!("memory stream has no {key}")))?;

        let kind = record.kind()?;
        let filling = record.filling(kind)?;
        let last_accessed = record.last_accessed;
        let draft = NodeDraft {
            spo: Spo::new(record.subject, record.predicate, record.object),
            description: record.description,
            keywords: record.keywords,
            importance: record.poignancy,
            valence: record.valence,
            created: record.created,
            expiration: record.expiration,
            embedding_key: record.embedding_key,
            embedding: Vec::new(),
        };

        let id = memory.restore(kind, draft, filling, record.depth);
        if let Some(at) = last_accessed {
            memory
                .apply(id, NodePatch::accessed(at))
                .map_err(|e| PersistError::Corruption(e.to_string()))?;
        }
    }
    Ok(memory)
}

pub(super) async fn load_associative_memory(dir: &FsPath) -> PersistResult<AssociativeMemory> {
    let embeddings: Embeddings = load_json(dir.join("embeddings.json")).await?;
    let strength: KeywordStrengthRecord = load_json(dir.join("kw_strength.json")).await?;
    let records: BTreeMap<String, NodeRecord> = load_json(dir.join("nodes.json")).await?;
    replay(records, embeddings, strength)
}
