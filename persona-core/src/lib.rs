//! Generative persona simulation engine.
//!
//! This crate provides:
//! - Personas that perceive, remember, plan, converse and reflect
//! - An associative memory stream with weighted retrieval
//! - A tile maze with addresses, events and pathfinding
//! - A pluggable [`Cognition`] capability, backed by an OpenAI-compatible model
//! - Loading and saving simulations in the reverie folder layout
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use persona_core::llm::{LlmCognition, LlmConfig, OpenAiEmbedder, PromptRegistry};
//! use persona_core::persist::{load_simulation, FileStorage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = openai::OpenAi::from_env()?;
//!     let cognition = Arc::new(LlmCognition::new(
//!         client.clone(),
//!         PromptRegistry::standard(),
//!         LlmConfig::default(),
//!     ));
//!     let embedder = Arc::new(OpenAiEmbedder::new(client));
//!
//!     let mut sim = load_simulation("simulations/july", "mazes", cognition, embedder).await?;
//!     let storage = FileStorage::new("simulations", "backups", "july", "the_ville");
//!     sim.run(10, &storage).await?;
//!     Ok(())
//! }
//! ```

pub mod cognition;
pub mod config;
pub mod error;
pub mod llm;
pub mod maze;
pub mod memory;
pub mod path;
pub mod persist;
pub mod persona;
pub mod simulation;
pub mod spatial;
pub mod testing;

// Re-export for convenience
pub use persona_macros::OutputSchema;

// Primary public API
pub use cognition::{Cognition, CognitionError, CognitionResult, Embedder, Insight, Plan};
pub use config::{ConfigError, RunConfig};
pub use error::{Error, Result};
pub use maze::{Event, Maze, MazeAccess, Tile, TilePos};
pub use memory::{AssociativeMemory, ConceptNode, NodeId, NodeKind, Spo, Utterance};
pub use path::{Level, Mode, Path};
pub use persist::{FileStorage, PersistError};
pub use persona::{Movement, Persona, State};
pub use simulation::{PersonaMovement, Simulation, SimulationStore, StepOutcome};
pub use spatial::SpatialMemory;
pub use testing::{HashEmbedder, ScriptedCognition};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// Where the persona goes next
    #[derive(OutputSchema, Deserialize)]
    #[schema(name = "next_stop")]
    struct NextStop {
        /// Arena to visit
        arena: String,
        /// Optional object to use there
        object: Option<String>,
    }

    #[test]
    fn test_output_schema_derive() {
        assert_eq!(NextStop::schema_name(), "next_stop");

        let schema = NextStop::json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["arena"]["type"], "string");
        assert!(schema["properties"]["object"]["anyOf"].is_array());

        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "arena"));
        assert!(required.iter().any(|v| v == "object"));
    }

    #[test]
    fn test_decodes_into_schema_type() {
        let stop: NextStop = serde_json::from_str(r#"{"arena": "kitchen", "object": null}"#).unwrap();
        assert_eq!(stop.arena, "kitchen");
        assert!(stop.object.is_none());
    }
}
