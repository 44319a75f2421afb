//! Reflection: turning accumulated memories into higher level thoughts.

use chrono::Duration;
use tracing::info;

use super::retrieve::{candidate_nodes, DEFAULT_RETRIEVAL_COUNT};
use super::Persona;
use crate::error::Result;

const FOCAL_POINT_COUNT: usize = 3;
const INSIGHT_COUNT: usize = 5;
/// Minimum number of recent memories reflected upon.
const REFLECTION_WINDOW: usize = 100;

impl Persona {
    pub(super) async fn reflect(&mut self) -> Result<()> {
        if self.should_reflect() {
            self.run_reflect().await?;
            self.state.reflection_trigger_current = self.state.reflection_trigger;
            self.state.reflection_elements = 0;
        }

        if let Some(end) = self.state.chat.end_time {
            if self.current_time() + Duration::seconds(10) >= end {
                self.conclude_chat().await?;
            }
        }
        Ok(())
    }

    fn should_reflect(&self) -> bool {
        self.state.reflection_trigger_current < 1
            && self.memory.latest_events().len() + self.memory.latest_thoughts().len() > 0
    }

    async fn run_reflect(&mut self) -> Result<()> {
        let mut nodes = candidate_nodes(&self.memory)?;
        let n = (self.state.reflection_elements as usize)
            .max(REFLECTION_WINDOW)
            .min(nodes.len());
        let recent = nodes.split_off(nodes.len() - n);

        let cognition = self.cognition.clone();
        let focal_points = cognition
            .focal_points(self, &recent, FOCAL_POINT_COUNT)
            .await?;
        let retrieved = self
            .retrieve_for_focal_points(&focal_points, DEFAULT_RETRIEVAL_COUNT)
            .await?;

        let mut added = 0;
        for statements in retrieved {
            let insights = cognition.insights(self, &statements, INSIGHT_COUNT).await?;
            for insight in insights {
                self.remember_thought(insight.text, insight.evidence).await?;
                added += 1;
            }
        }

        info!(
            statements = n,
            focal_points = focal_points.len(),
            thoughts = added,
            "reflected"
        );
        Ok(())
    }

    /// Remember what matters from a conversation that just ended.
    async fn conclude_chat(&mut self) -> Result<()> {
        let evidence: Vec<_> = self
            .state
            .chat
            .with
            .as_deref()
            .and_then(|with| self.memory.last_chat(with))
            .into_iter()
            .collect();
        let transcript = self.state.chat.transcript.clone();
        let cognition = self.cognition.clone();

        let planning = cognition.planning_thought(self, &transcript).await?;
        let planning = format!("For {}'s planning: {}", self.name, planning);
        self.remember_thought(planning, evidence.clone()).await?;

        let memo = cognition.conversation_memo(self, &transcript).await?;
        let memo = format!("{} {}", self.name, memo);
        self.remember_thought(memo, evidence).await?;
        Ok(())
    }
}
