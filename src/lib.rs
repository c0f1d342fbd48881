//! Client-side update orchestration for the centralino TTS backend.
//!
//! [`update::UpdateOrchestrator`] checks for new releases, starts the remote
//! update and follows it through backend restarts using the persisted
//! progress record and the progress push channel.

pub mod backend_client;
pub mod config;
pub mod push_channel;
pub mod types;
pub mod update;

pub use backend_client::BackendClient;
pub use config::Config;
pub use push_channel::{PushConnector, PushStream, WsConnector};
pub use types::UpdateError;
pub use update::{
    OrchestratorSettings, Phase, UpdateApi, UpdateEvent, UpdateOrchestrator, UpdateSnapshot,
};
