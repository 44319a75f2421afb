use std::collections::HashSet;

use super::{keyword_of, Persona};
use crate::error::Result;
use crate::maze::{Event, Maze};
use crate::memory::{NodeDraft, NodeId, NodeKind};
use crate::path::Level;

impl Persona {
    /// Register the surroundings and store the closest new events as memories.
    ///
    /// Returns the ids of the event nodes created this step.
    pub(super) async fn perceive(&mut self, maze: &Maze) -> Result<Vec<NodeId>> {
        let here = self.state.position;
        let attention = self.state.attention.clone();
        let nearby = maze.nearby_tiles(here, attention.vision_radius);

        for pos in &nearby {
            self.spatial.register(&maze.get(*pos)?.path);
        }

        let arena = maze.get(here)?.path.at(Level::Arena);

        // Objects spanning several tiles carry the same event on each of them.
        let mut seen = HashSet::new();
        let mut candidates: Vec<(f64, Event)> = Vec::new();
        for pos in &nearby {
            let tile = maze.get(*pos)?;
            if tile.events.is_empty() || !tile.path.at(Level::Arena).matches(&arena) {
                continue;
            }
            let distance = here.distance(pos);
            for event in &tile.events {
                if seen.insert(event) {
                    candidates.push((distance, event.clone()));
                }
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.truncate(attention.bandwidth);

        let mut perceived = Vec::with_capacity(candidates.len());
        for (_, mut event) in candidates {
            if event.spo.predicate.is_empty() {
                event.spo.predicate = "is".to_string();
                event.spo.object = "idle".to_string();
                event.description = "idle".to_string();
            }
            event.description = format!("{} is {}", event.spo.subject, event.description);

            if self
                .memory
                .latest_event_spos(attention.retention)
                .contains(&event.spo)
            {
                continue;
            }

            let subject = keyword_of(&event.spo.subject);
            let keywords = vec![subject.clone(), keyword_of(&event.spo.object)];
            let embedding = self.embedding(&event.description).await?;

            let cognition = self.cognition.clone();
            let (importance, valence) = futures::try_join!(
                cognition.importance(self, NodeKind::Event, &event.description),
                cognition.valence(self, NodeKind::Event, &event.description),
            )?;

            let mut evidence = Vec::new();
            if subject == self.name && event.spo.predicate == "chat with" {
                evidence.push(self.remember_chat(keywords.clone()).await?);
            }

            perceived.push(self.add_event_memory(event, keywords, importance, valence, evidence, embedding));
        }

        Ok(perceived)
    }

    /// Store the ongoing conversation as a chat memory.
    async fn remember_chat(&mut self, keywords: Vec<String>) -> Result<NodeId> {
        let description = self.state.activity.description.clone();
        let embedding = self.embedding(&description).await?;

        let cognition = self.cognition.clone();
        let transcript = self.state.chat.transcript.clone();
        let (importance, valence) = futures::try_join!(
            cognition.chat_importance(self, &transcript, &description),
            cognition.chat_valence(self, &transcript, &description),
        )?;

        let draft = NodeDraft {
            spo: self.state.activity.spo.clone(),
            description: description.clone(),
            keywords,
            importance,
            valence,
            created: self.current_time(),
            expiration: None,
            embedding_key: description,
            embedding,
        };
        Ok(self.memory.add_chat(draft, transcript))
    }
}
