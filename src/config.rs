//! Server configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `PORT`, `KAI_REMOTE_LISTEN`,
//!    `KAI_REMOTE_COMMANDS`, `OPENAI_API_KEY`, `KAI_REMOTE_TTS_KEY`,
//!    `GATEWAY_URL`, `GATEWAY_TOKEN`, `GATEWAY_SESSION`
//! 2. **Config file**: path via `--config <path>`, or `kai-remote.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The command registry (PIN, commands, custom-command flag) lives in a
//! separate JSON document, see [`crate::registry`].
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:4004"
//! commands_file = "config.json"
//! static_dir = "dist"
//!
//! [exec]
//! shell = "/bin/zsh"
//! timeout_ms = 30000
//! max_output_bytes = 1048576
//! extra_path = ["/opt/homebrew/bin", "/usr/local/bin"]
//!
//! [relay]
//! audio_grace_secs = 5
//! max_upload_bytes = 26214400
//!
//! [gateway]
//! url = "http://127.0.0.1:18789"
//! session = "main"
//!
//! [synthesis.local]
//! program = "say"
//! args = ["-o", "{output}", "--file-format=m4af", "{text}"]
//! extension = "m4a"
//!
//! [logging]
//! level = "info"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener and file locations.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:4004`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// JSON command registry (default `config.json`).
    #[serde(default = "default_commands_file")]
    pub commands_file: String,
    /// Built SPA assets. Served only when the directory exists.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

/// Command executor limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecConfig {
    /// Shell interpreter, invoked as `<shell> -c <command>`.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Hard wall-clock limit in milliseconds (default 30 000).
    #[serde(default = "default_exec_timeout_ms")]
    pub timeout_ms: u64,
    /// Per-stream capture cap in bytes (default 1 MiB).
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Directories prepended to the inherited `PATH`.
    #[serde(default = "default_extra_path")]
    pub extra_path: Vec<String>,
    /// Working directory for commands. Inherits the server's CWD when unset.
    pub working_dir: Option<String>,
}

/// Temp file locations and voice upload limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Where synthesized replies are written until they are fetched.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
    /// Where audio uploads are spooled while being transcribed.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Largest accepted upload in bytes (default 25 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Seconds a served audio file survives before deletion (default 5).
    #[serde(default = "default_audio_grace_secs")]
    pub audio_grace_secs: u64,
    /// Seconds before audio that was never fetched is deleted (default 600).
    #[serde(default = "default_unclaimed_audio_secs")]
    pub unclaimed_audio_secs: u64,
}

/// Speech-to-text API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    /// Bearer credential. Override with `OPENAI_API_KEY`.
    pub api_key: Option<String>,
}

/// Conversational gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL. Override with `GATEWAY_URL`.
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// The deployment's single conversational session.
    #[serde(default = "default_gateway_session")]
    pub session: String,
    /// Optional bearer token. Override with `GATEWAY_TOKEN`.
    pub token: Option<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

/// Text-to-speech strategies, tried local first, then cloud.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub local: LocalSynthConfig,
    #[serde(default)]
    pub cloud: CloudSynthConfig,
}

/// Local command-line synthesizer.
///
/// `args` may contain `{text}` and `{output}`; they are substituted per
/// argument and the program is executed directly, never through a shell.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSynthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_local_program")]
    pub program: String,
    #[serde(default = "default_local_args")]
    pub args: Vec<String>,
    /// Extension of the file the program writes.
    #[serde(default = "default_local_extension")]
    pub extension: String,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
}

/// Cloud speech API (OpenAI-compatible `/audio/speech`).
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSynthConfig {
    #[serde(default = "default_cloud_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_cloud_model")]
    pub model: String,
    #[serde(default = "default_cloud_voice")]
    pub voice: String,
    /// Response format, also used as the file extension (default `mp3`).
    #[serde(default = "default_cloud_format")]
    pub format: String,
    /// Bearer credential. Override with `KAI_REMOTE_TTS_KEY` or `OPENAI_API_KEY`.
    /// Cloud synthesis is skipped when absent.
    pub api_key: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:4004".to_string()
}
fn default_commands_file() -> String {
    "config.json".to_string()
}
fn default_static_dir() -> String {
    "dist".to_string()
}
fn default_shell() -> String {
    "/bin/sh".to_string()
}
fn default_exec_timeout_ms() -> u64 {
    30_000
}
fn default_max_output_bytes() -> usize {
    1024 * 1024
}
fn default_extra_path() -> Vec<String> {
    vec!["/opt/homebrew/bin".to_string(), "/usr/local/bin".to_string()]
}
fn default_audio_dir() -> PathBuf {
    std::env::temp_dir().join("kai-remote").join("audio")
}
fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("kai-remote").join("uploads")
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}
fn default_audio_grace_secs() -> u64 {
    5
}
fn default_unclaimed_audio_secs() -> u64 {
    600
}
fn default_transcription_endpoint() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}
fn default_transcription_model() -> String {
    "whisper-1".to_string()
}
fn default_gateway_url() -> String {
    "http://127.0.0.1:18789".to_string()
}
fn default_gateway_session() -> String {
    "main".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}
fn default_local_program() -> String {
    "say".to_string()
}
fn default_local_args() -> Vec<String> {
    vec![
        "-o".to_string(),
        "{output}".to_string(),
        "--file-format=m4af".to_string(),
        "{text}".to_string(),
    ]
}
fn default_local_extension() -> String {
    "m4a".to_string()
}
fn default_local_timeout_secs() -> u64 {
    30
}
fn default_cloud_endpoint() -> String {
    "https://api.openai.com/v1/audio/speech".to_string()
}
fn default_cloud_model() -> String {
    "tts-1".to_string()
}
fn default_cloud_voice() -> String {
    "alloy".to_string()
}
fn default_cloud_format() -> String {
    "mp3".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            commands_file: default_commands_file(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout_ms: default_exec_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            extra_path: default_extra_path(),
            working_dir: None,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            audio_grace_secs: default_audio_grace_secs(),
            unclaimed_audio_secs: default_unclaimed_audio_secs(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_transcription_endpoint(),
            model: default_transcription_model(),
            api_key: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            session: default_gateway_session(),
            token: None,
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl Default for LocalSynthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_local_program(),
            args: default_local_args(),
            extension: default_local_extension(),
            timeout_secs: default_local_timeout_secs(),
        }
    }
}

impl Default for CloudSynthConfig {
    fn default() -> Self {
        Self {
            endpoint: default_cloud_endpoint(),
            model: default_cloud_model(),
            voice: default_cloud_voice(),
            format: default_cloud_format(),
            api_key: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `kai-remote.toml`
    /// in the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(Path::new(p))?,
            None if Path::new("kai-remote.toml").exists() => {
                Self::from_file(Path::new("kai-remote.toml"))?
            }
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse a TOML document; unspecified sections fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply environment overrides. `lookup` abstracts `std::env::var` so the
    /// precedence rules can be exercised without touching the process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.listen = format!("0.0.0.0:{}", port.trim());
        }
        if let Some(listen) = get("KAI_REMOTE_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(path) = get("KAI_REMOTE_COMMANDS") {
            self.server.commands_file = path;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.transcription.api_key = Some(key.clone());
            if self.synthesis.cloud.api_key.is_none() {
                self.synthesis.cloud.api_key = Some(key);
            }
        }
        if let Some(key) = get("KAI_REMOTE_TTS_KEY") {
            self.synthesis.cloud.api_key = Some(key);
        }
        if let Some(url) = get("GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(token) = get("GATEWAY_TOKEN") {
            self.gateway.token = Some(token);
        }
        if let Some(session) = get("GATEWAY_SESSION") {
            self.gateway.session = session;
        }
    }
}

/// Errors raised while loading server or registry configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Read { path: String, source: std::io::Error },
    /// The file is not valid TOML/JSON for the expected shape.
    Parse { path: String, message: String },
    /// The document parsed but violates a registry invariant.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => write!(f, "Failed to read {path}: {source}"),
            ConfigError::Parse { path, message } => write!(f, "Failed to parse {path}: {message}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}
