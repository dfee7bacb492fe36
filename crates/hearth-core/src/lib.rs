pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod prompt;

use std::sync::Arc;

use anyhow::Result;
use hearth_memory::FileTranscriptStore;
use hearth_provider::create_provider;

pub use config::*;
pub use controller::*;
pub use error::*;
pub use gateway::*;
pub use prompt::*;

/// Wire provider, gateway and persistence together from configuration.
pub fn build_controller(config: &HearthConfig) -> Result<SessionController> {
    validate_credentials(config)?;
    let provider = create_provider(&config.provider.provider)?;
    let mut gateway = CompletionGateway::new(provider, config.provider.model.clone());
    if let Some(system) = &config.prompt.system {
        gateway = gateway.with_system_prompt(system.clone());
    }

    let controller = match config.persistence.mode {
        PersistenceMode::Server => {
            let dir = &config.persistence.transcripts_dir;
            tracing::info!(dir = %dir.display(), "persisting transcripts on the server");
            SessionController::stateful(gateway, Arc::new(FileTranscriptStore::new(dir)))
        }
        PersistenceMode::Client => {
            tracing::info!("transcripts are kept by clients; server runs stateless");
            SessionController::stateless(gateway)
        }
    };
    Ok(controller)
}
