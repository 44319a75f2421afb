//! Memory retrieval.
//!
//! Two flavours: keyword lookups around freshly perceived events, and scored
//! retrieval around free-form focal points. Focal point retrieval ranks every
//! non-idle event and thought by four components, each min-max normalized:
//!
//! - recency: `decay^(rank + 1)`, rank being the node's position in its
//!   kind's newest-first list
//! - importance: the stored importance
//! - relevance: cosine similarity to the focal point's embedding
//! - valence: magnitude of negative valence, positive valence counts as 0

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{Persona, RetrievalWeights};
use crate::error::{Error, Result};
use crate::memory::{AssociativeMemory, NodeId, NodePatch};

/// Nodes kept per focal point unless asked otherwise.
pub const DEFAULT_RETRIEVAL_COUNT: usize = 30;

/// Memories related to one perceived event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    /// The perceived event node
    pub current: NodeId,
    pub events: BTreeSet<NodeId>,
    pub thoughts: BTreeSet<NodeId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Scores {
    recency: f64,
    importance: f64,
    relevance: f64,
    valence: f64,
}

impl Persona {
    /// Keyword-related memories for every perceived event, keyed by its description.
    pub(super) fn retrieve_for_perceptions(
        &self,
        perceived: &[NodeId],
    ) -> Result<BTreeMap<String, Retrieved>> {
        let mut retrieved = BTreeMap::new();
        for id in perceived {
            let node = self.memory.node(*id)?;
            let (s, p, o) = (&node.spo.subject, &node.spo.predicate, &node.spo.object);
            retrieved.insert(
                node.description.clone(),
                Retrieved {
                    current: *id,
                    events: self.memory.relevant_events(s, p, o),
                    thoughts: self.memory.relevant_thoughts(s, p, o),
                },
            );
        }
        Ok(retrieved)
    }

    /// Best `count` memories for each focal point, in focal point order.
    ///
    /// Every returned node has its access time bumped to now.
    pub(crate) async fn retrieve_for_focal_points(
        &mut self,
        focal_points: &[String],
        count: usize,
    ) -> Result<Vec<Vec<NodeId>>> {
        let mut retrieved = Vec::with_capacity(focal_points.len());
        for focal_point in focal_points {
            let focal_embedding = self.embedding(focal_point).await?;
            let candidates = candidate_nodes(&self.memory)?;
            let ranked = rank(
                &self.memory,
                &self.state.weights,
                &candidates,
                &focal_embedding,
                count,
            )?;

            let now = self.current_time();
            for (id, total, scores) in &ranked {
                self.memory.apply(*id, NodePatch::accessed(now))?;
                debug!(
                    focal_point = %focal_point,
                    node_id = id.0,
                    total,
                    recency = scores.recency,
                    importance = scores.importance,
                    relevance = scores.relevance,
                    valence = scores.valence,
                    "retrieval score"
                );
            }
            retrieved.push(ranked.into_iter().map(|(id, _, _)| id).collect());
        }
        Ok(retrieved)
    }

    /// Focal point retrieval flattened into one list.
    pub(crate) async fn retrieve_flat(
        &mut self,
        focal_points: &[String],
        count: usize,
    ) -> Result<Vec<NodeId>> {
        Ok(self
            .retrieve_for_focal_points(focal_points, count)
            .await?
            .into_iter()
            .flatten()
            .collect())
    }
}

/// Non-idle events and thoughts, least recently accessed first.
pub(super) fn candidate_nodes(memory: &AssociativeMemory) -> Result<Vec<NodeId>> {
    let mut nodes = Vec::new();
    for id in memory.latest_events().iter().chain(memory.latest_thoughts()) {
        let node = memory.node(*id)?;
        if !node.embedding_key.contains("idle") {
            nodes.push((node.last_accessed, *id));
        }
    }
    nodes.sort_by_key(|(accessed, _)| *accessed);
    Ok(nodes.into_iter().map(|(_, id)| id).collect())
}

fn rank(
    memory: &AssociativeMemory,
    weights: &RetrievalWeights,
    nodes: &[NodeId],
    focal_embedding: &[f64],
    count: usize,
) -> Result<Vec<(NodeId, f64, Scores)>> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    let mut recency = Vec::with_capacity(nodes.len());
    let mut importance = Vec::with_capacity(nodes.len());
    let mut relevance = Vec::with_capacity(nodes.len());
    let mut valence = Vec::with_capacity(nodes.len());
    for id in nodes {
        let node = memory.node(*id)?;
        let rank = memory
            .recency_rank(*id)
            .ok_or_else(|| Error::Invariant(format!("memory node {id} has no recency rank")))?;
        recency.push(weights.recency_decay.powi(rank as i32 + 1));
        importance.push(f64::from(node.importance));
        let embedding = memory
            .node_embedding(*id)
            .ok_or_else(|| Error::Invariant(format!("memory node {id} has no embedding")))?;
        relevance.push(cosine_similarity(embedding, focal_embedding)?);
        valence.push(if node.valence < 0 {
            -f64::from(node.valence)
        } else {
            0.0
        });
    }

    normalize(&mut recency)?;
    normalize(&mut importance)?;
    normalize(&mut relevance)?;
    normalize(&mut valence)?;

    let mut ranked: Vec<(NodeId, f64, Scores)> = nodes
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let scores = Scores {
                recency: recency[i],
                importance: importance[i],
                relevance: relevance[i],
                valence: valence[i],
            };
            let total = scores.recency * weights.recency
                + scores.importance * weights.importance
                + scores.relevance * weights.relevance
                + scores.valence * weights.valence;
            (*id, total, scores)
        })
        .collect();

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(count);
    Ok(ranked)
}

/// Cosine similarity of two equally long, non-zero vectors.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::Invariant(format!(
            "cosine similarity of vectors of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Err(Error::Invariant("cosine similarity of empty vectors".to_string()));
    }

    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return Err(Error::Invariant("zero norm vector in cosine similarity".to_string()));
    }
    Ok(dot / (na.sqrt() * nb.sqrt()))
}

/// Min-max normalize into `[0, 1]` in place. Constant input maps to 0.5.
///
/// NaN entries are ignored when finding the bounds; a vector of only NaN is
/// an error.
pub fn normalize(values: &mut [f64]) -> Result<()> {
    let mut bounds: Option<(f64, f64)> = None;
    for v in values.iter().copied().filter(|v| !v.is_nan()) {
        bounds = Some(match bounds {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }

    let Some((lo, hi)) = bounds else {
        if values.is_empty() {
            return Ok(());
        }
        return Err(Error::Invariant("score vector has no numeric values".to_string()));
    };

    if hi == lo {
        values.iter_mut().for_each(|v| *v = 0.5);
    } else {
        values.iter_mut().for_each(|v| *v = (*v - lo) / (hi - lo));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{NodeDraft, Spo};
    use chrono::NaiveDateTime;

    fn draft(description: &str, importance: i32, valence: i32, embedding: Vec<f64>) -> NodeDraft {
        NodeDraft {
            spo: Spo::new("Klaus", "is", description),
            description: description.to_string(),
            keywords: vec!["klaus".to_string()],
            importance,
            valence,
            created: NaiveDateTime::default(),
            expiration: None,
            embedding_key: description.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![2.0, 4.0, 3.0];
        normalize(&mut v).unwrap();
        assert_eq!(v, vec![0.0, 1.0, 0.5]);

        let mut flat = vec![7.0, 7.0];
        normalize(&mut flat).unwrap();
        assert_eq!(flat, vec![0.5, 0.5]);

        let mut nan = vec![f64::NAN];
        assert!(normalize(&mut nan).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).unwrap().abs() < 1e-12);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_dominating_node_ranks_first() {
        let mut memory = AssociativeMemory::new();
        // Older, less important, less relevant and positive.
        let weak = memory.add_event(draft("walking", 2, 3, vec![0.0, 1.0]), vec![]);
        // Newer, more important, more relevant and negative.
        let strong = memory.add_event(draft("crying", 8, -5, vec![1.0, 0.1]), vec![]);
        let idle = memory.add_event(draft("idle", 9, -9, vec![1.0, 0.0]), vec![]);

        let candidates = candidate_nodes(&memory).unwrap();
        assert!(!candidates.contains(&idle));

        let ranked = rank(
            &memory,
            &RetrievalWeights::default(),
            &candidates,
            &[1.0, 0.0],
            DEFAULT_RETRIEVAL_COUNT,
        )
        .unwrap();
        let order: Vec<NodeId> = ranked.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(order, vec![strong, weak]);

        let top = rank(&memory, &RetrievalWeights::default(), &candidates, &[1.0, 0.0], 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, strong);
    }

    #[test]
    fn test_missing_embedding_is_invariant() {
        let mut memory = AssociativeMemory::new();
        memory.add_event(draft("walking", 2, 0, vec![]), vec![]);
        let candidates = candidate_nodes(&memory).unwrap();
        let err = rank(&memory, &RetrievalWeights::default(), &candidates, &[1.0], 5).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_empty_candidates() {
        let memory = AssociativeMemory::new();
        let ranked = rank(&memory, &RetrievalWeights::default(), &[], &[1.0], 5).unwrap();
        assert!(ranked.is_empty());
    }
}
