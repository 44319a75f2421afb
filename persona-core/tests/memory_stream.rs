//! Associative memory behavior through the public API.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use persona_core::memory::{NodeDraft, NodePatch};
use persona_core::{AssociativeMemory, NodeId, NodeKind, Spo};
use std::collections::HashSet;

fn morning() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn event(subject: &str, predicate: &str, object: &str, minute: i64) -> NodeDraft {
    let description = format!("{subject} is {predicate} {object}");
    NodeDraft {
        spo: Spo::new(subject, predicate, object),
        description: description.clone(),
        keywords: vec![subject.to_string(), object.to_string()],
        importance: 3,
        valence: 0,
        created: morning() + Duration::minutes(minute),
        expiration: None,
        embedding_key: description,
        embedding: vec![1.0, minute as f64],
    }
}

#[test]
fn test_events_get_unique_newest_first_ids() {
    let mut memory = AssociativeMemory::new();
    let ids: Vec<NodeId> = (0..5)
        .map(|i| memory.add_event(event("Klaus Mueller", "reading", &format!("book {i}"), i), vec![]))
        .collect();

    let unique: HashSet<NodeId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 5);
    assert!(ids.iter().all(|id| *id != NodeId::NONE));

    let latest: Vec<NodeId> = memory.latest_events().iter().copied().collect();
    let mut newest_first = ids.clone();
    newest_first.reverse();
    assert_eq!(latest, newest_first);
    assert_eq!(memory.recency_rank(ids[4]), Some(0));
    assert_eq!(memory.recency_rank(ids[0]), Some(4));
}

#[test]
fn test_keyword_lookup_and_strength() {
    let mut memory = AssociativeMemory::new();
    let coffee = memory.add_event(event("Isabella Rodriguez", "brewing", "coffee", 0), vec![]);
    memory.add_event(event("Klaus Mueller", "reading", "book", 1), vec![]);
    memory.add_event(event("Isabella Rodriguez", "is", "idle", 2), vec![]);

    let related = memory.relevant_events("ISABELLA RODRIGUEZ", "ignored", "nothing");
    assert!(related.contains(&coffee));
    assert_eq!(related.len(), 2);

    // Idle events are indexed but do not strengthen keywords
    assert_eq!(memory.event_strength().get("isabella rodriguez"), Some(&1));
    assert_eq!(memory.event_strength().get("coffee"), Some(&1));
    assert_eq!(memory.event_strength().get("idle"), None);
}

#[test]
fn test_thought_depth_and_patch() {
    let mut memory = AssociativeMemory::new();
    let e = memory.add_event(event("Klaus Mueller", "reading", "book", 0), vec![]);
    let t1 = memory
        .add_thought(event("Klaus Mueller", "likes", "books", 1), vec![e])
        .unwrap();
    let t2 = memory
        .add_thought(event("Klaus Mueller", "is", "studious", 2), vec![e, t1])
        .unwrap();

    assert_eq!(memory.node(t1).unwrap().depth, 1);
    assert_eq!(memory.node(t2).unwrap().depth, 2);
    assert_eq!(memory.node(t2).unwrap().kind, NodeKind::Thought);
    assert_eq!(memory.node(t2).unwrap().filling.evidence(), &[e, t1]);

    let later = morning() + Duration::hours(3);
    memory.apply(e, NodePatch::accessed(later)).unwrap();
    assert_eq!(memory.node(e).unwrap().last_accessed, later);
    assert!(memory.apply(NodeId(99), NodePatch::accessed(later)).is_err());

    assert!(memory
        .add_thought(event("Klaus Mueller", "is", "confused", 3), vec![NodeId(42)])
        .is_err());
}
