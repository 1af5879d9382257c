//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::registry::CommandRegistry;
use crate::relay::VoiceRelay;
use crate::shell::process::Executor;

/// Immutable handles built once at startup. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration loaded at startup.
    pub config: Arc<Config>,
    /// Allow-listed commands and the PIN.
    pub registry: Arc<CommandRegistry>,
    /// Runs accepted command strings.
    pub executor: Arc<Executor>,
    /// Transcription, chat and synthesized-audio lifecycle.
    pub relay: Arc<VoiceRelay>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, registry: CommandRegistry, relay: VoiceRelay) -> Self {
        let executor = Executor::new(&config.exec);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            executor: Arc::new(executor),
            relay: Arc::new(relay),
            start_time: Instant::now(),
        }
    }
}
