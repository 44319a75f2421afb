//! Generative persona simulation runner.
//!
//! Loads a saved simulation and continues it for a number of steps, writing
//! movements and state back to the simulation folder as it goes.
//!
//! Configuration comes from the environment (a `.env` file is honored):
//!
//! ```bash
//! SIMULATION_NAME=july SIMULATION_STEPS=100 RUST_LOG=info cargo run -p ville
//! ```

use std::sync::Arc;

use openai::OpenAi;
use persona_core::llm::{LlmCognition, LlmConfig, OpenAiEmbedder, PromptRegistry};
use persona_core::persist::{load_simulation, FileStorage};
use persona_core::RunConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build a client from an optional key, falling back to `OPENAI_API_KEY`.
fn client(key: Option<&str>, url: Option<&str>) -> Result<OpenAi, openai::Error> {
    let client = match key {
        Some(key) => OpenAi::new(key),
        None => OpenAi::from_env()?,
    };
    Ok(match url {
        Some(url) => client.with_base_url(url),
        None => client,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RunConfig::from_env()?;

    let mut text = client(config.text_model_key.as_deref(), config.text_model_url.as_deref())?;
    if let Some(model) = &config.text_model {
        text = text.with_model(model);
    }

    let mut embeddings = client(config.embedding_key.as_deref(), config.embedding_url.as_deref())?;
    if let Some(model) = &config.embedding_model {
        embeddings = embeddings.with_embedding_model(model);
    }

    let cognition = Arc::new(LlmCognition::new(
        text,
        PromptRegistry::standard(),
        LlmConfig::default(),
    ));
    let embedder = Arc::new(OpenAiEmbedder::new(embeddings));

    let mut simulation = load_simulation(
        config.simulation_path(),
        &config.maze_dir,
        cognition,
        embedder,
    )
    .await?
    .with_backup_interval(config.backup_interval);

    let storage = FileStorage::new(
        &config.simulation_dir,
        &config.backup_dir,
        &config.simulation_name,
        &config.simulation_maze,
    );

    info!(
        simulation = %config.simulation_name,
        steps = config.steps,
        "starting simulation"
    );
    simulation.run(config.steps, &storage).await?;
    info!(step = simulation.step(), "simulation finished");

    Ok(())
}
