//! Associative memory stream.
//!
//! Append-only log of concept nodes with side indices:
//! - newest-first id lists per node kind
//! - keyword to ids per node kind, also newest first
//! - keyword strength counters for events and thoughts
//! - a shared text to embedding cache
//!
//! Nodes never change after insertion except through [`AssociativeMemory::apply`].

mod node;

pub use node::{ConceptNode, Filling, NodeDraft, NodeId, NodeKind, NodePatch, Spo, Utterance};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::error::{Error, Result};

/// Text to embedding vector.
pub type Embeddings = BTreeMap<String, Vec<f64>>;

/// Keyword to importance counter.
pub type KeywordStrength = BTreeMap<String, u32>;

#[derive(Debug, Clone, Default)]
struct KindIndex {
    latest: VecDeque<NodeId>,
    by_keyword: HashMap<String, VecDeque<NodeId>>,
}

impl KindIndex {
    fn insert(&mut self, id: NodeId, keywords: &[String]) {
        self.latest.push_front(id);
        for kw in keywords {
            self.by_keyword.entry(kw.clone()).or_default().push_front(id);
        }
    }

    fn by_keywords(&self, keywords: [&str; 3]) -> BTreeSet<NodeId> {
        keywords
            .iter()
            .filter_map(|kw| self.by_keyword.get(&kw.to_lowercase()))
            .flatten()
            .copied()
            .collect()
    }
}

/// One persona's memory stream.
#[derive(Debug, Clone, Default)]
pub struct AssociativeMemory {
    nodes: Vec<ConceptNode>,
    events: KindIndex,
    thoughts: KindIndex,
    chats: KindIndex,
    event_strength: KeywordStrength,
    thought_strength: KeywordStrength,
    embeddings: Embeddings,
}

impl AssociativeMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously saved side tables, before replaying nodes.
    pub fn with_tables(
        embeddings: Embeddings,
        event_strength: KeywordStrength,
        thought_strength: KeywordStrength,
    ) -> Self {
        Self {
            embeddings,
            event_strength,
            thought_strength,
            ..Self::default()
        }
    }

    /// Append an observed event.
    pub fn add_event(&mut self, draft: NodeDraft, evidence: Vec<NodeId>) -> NodeId {
        self.insert(NodeKind::Event, draft, Filling::Evidence(evidence), 0, true)
    }

    /// Append a thought. Its depth is one more than its deepest evidence.
    pub fn add_thought(&mut self, draft: NodeDraft, evidence: Vec<NodeId>) -> Result<NodeId> {
        let mut deepest = 0;
        for id in &evidence {
            deepest = deepest.max(self.node(*id)?.depth);
        }
        Ok(self.insert(
            NodeKind::Thought,
            draft,
            Filling::Evidence(evidence),
            deepest + 1,
            true,
        ))
    }

    /// Append a conversation.
    pub fn add_chat(&mut self, draft: NodeDraft, transcript: Vec<Utterance>) -> NodeId {
        self.insert(NodeKind::Chat, draft, Filling::Transcript(transcript), 0, true)
    }

    /// Replay a saved node as-is. Keyword strengths come from the saved
    /// tables and are not counted again.
    pub fn restore(&mut self, kind: NodeKind, draft: NodeDraft, filling: Filling, depth: u32) -> NodeId {
        self.insert(kind, draft, filling, depth, false)
    }

    fn insert(
        &mut self,
        kind: NodeKind,
        draft: NodeDraft,
        filling: Filling,
        depth: u32,
        count_strength: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32 + 1);
        let keywords: Vec<String> = draft.keywords.iter().map(|k| k.to_lowercase()).collect();

        let index = match kind {
            NodeKind::Event => &mut self.events,
            NodeKind::Thought => &mut self.thoughts,
            NodeKind::Chat => &mut self.chats,
        };
        let type_index = index.latest.len();
        index.insert(id, &keywords);

        let strength = match kind {
            NodeKind::Event if count_strength => Some(&mut self.event_strength),
            NodeKind::Thought if count_strength => Some(&mut self.thought_strength),
            _ => None,
        };
        if let Some(strength) = strength {
            if !draft.spo.is_idle() {
                for kw in &keywords {
                    *strength.entry(kw.clone()).or_default() += 1;
                }
            }
        }

        if !draft.embedding.is_empty() {
            self.embeddings
                .insert(draft.embedding_key.clone(), draft.embedding);
        }

        debug!(
            node_id = id.0,
            node_type = kind.as_str(),
            importance = draft.importance,
            valence = draft.valence,
            depth,
            "memory appended"
        );

        self.nodes.push(ConceptNode {
            id,
            type_index,
            kind,
            depth,
            created: draft.created,
            last_accessed: draft.created,
            expiration: draft.expiration,
            spo: draft.spo,
            description: draft.description,
            embedding_key: draft.embedding_key,
            importance: draft.importance,
            valence: draft.valence,
            keywords,
            filling,
        });
        id
    }

    /// Look up a node.
    pub fn get(&self, id: NodeId) -> Option<&ConceptNode> {
        if id == NodeId::NONE {
            return None;
        }
        self.nodes.get(id.0 as usize - 1)
    }

    /// Look up a node that must exist.
    pub fn node(&self, id: NodeId) -> Result<&ConceptNode> {
        self.get(id)
            .ok_or_else(|| Error::Invariant(format!("unknown memory node {id}")))
    }

    /// Apply a scoped update to one node.
    pub fn apply(&mut self, id: NodeId, patch: NodePatch) -> Result<()> {
        if id == NodeId::NONE {
            return Err(Error::Invariant("cannot patch the reserved node".to_string()));
        }
        let node = self
            .nodes
            .get_mut(id.0 as usize - 1)
            .ok_or_else(|| Error::Invariant(format!("unknown memory node {id}")))?;

        if let Some(at) = patch.last_accessed {
            node.last_accessed = at;
        }
        if let Some(importance) = patch.importance {
            node.importance = importance;
        }
        if let Some(valence) = patch.valence {
            node.valence = valence;
        }
        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(expiration) = patch.expiration {
            node.expiration = expiration;
        }
        Ok(())
    }

    /// All nodes, oldest first.
    pub fn nodes(&self) -> &[ConceptNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Event ids, newest first.
    pub fn latest_events(&self) -> &VecDeque<NodeId> {
        &self.events.latest
    }

    /// Thought ids, newest first.
    pub fn latest_thoughts(&self) -> &VecDeque<NodeId> {
        &self.thoughts.latest
    }

    /// Chat ids, newest first.
    pub fn latest_chats(&self) -> &VecDeque<NodeId> {
        &self.chats.latest
    }

    /// Position of a node in its kind's newest-first list.
    pub fn recency_rank(&self, id: NodeId) -> Option<usize> {
        let node = self.get(id)?;
        let count = match node.kind {
            NodeKind::Event => self.events.latest.len(),
            NodeKind::Thought => self.thoughts.latest.len(),
            NodeKind::Chat => self.chats.latest.len(),
        };
        Some(count - 1 - node.type_index)
    }

    /// Triples of the `n` newest events.
    pub fn latest_event_spos(&self, n: usize) -> HashSet<Spo> {
        self.events
            .latest
            .iter()
            .take(n)
            .filter_map(|id| self.get(*id))
            .map(|node| node.spo.clone())
            .collect()
    }

    /// Events indexed under any of the three words.
    pub fn relevant_events(&self, s: &str, p: &str, o: &str) -> BTreeSet<NodeId> {
        self.events.by_keywords([s, p, o])
    }

    /// Thoughts indexed under any of the three words.
    pub fn relevant_thoughts(&self, s: &str, p: &str, o: &str) -> BTreeSet<NodeId> {
        self.thoughts.by_keywords([s, p, o])
    }

    /// Newest chat indexed under `name`.
    pub fn last_chat(&self, name: &str) -> Option<NodeId> {
        self.chats
            .by_keyword
            .get(&name.to_lowercase())
            .and_then(|ids| ids.front().copied())
    }

    pub fn embedding(&self, key: &str) -> Option<&[f64]> {
        self.embeddings.get(key).map(Vec::as_slice)
    }

    /// Embedding of a node, through its embedding key.
    pub fn node_embedding(&self, id: NodeId) -> Option<&[f64]> {
        self.get(id).and_then(|node| self.embedding(&node.embedding_key))
    }

    pub fn save_embedding(&mut self, key: impl Into<String>, embedding: Vec<f64>) {
        self.embeddings.insert(key.into(), embedding);
    }

    pub fn embeddings(&self) -> &Embeddings {
        &self.embeddings
    }

    pub fn event_strength(&self) -> &KeywordStrength {
        &self.event_strength
    }

    pub fn thought_strength(&self) -> &KeywordStrength {
        &self.thought_strength
    }
}
