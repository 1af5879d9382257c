//! Voice and chat relay.
//!
//! Three short pipelines, each with its own failure policy:
//!
//! - **Transcribe**: spooled upload → speech-to-text API → text. Failures
//!   propagate; the upload is removed either way.
//! - **Chat**: text → gateway → reply, then best-effort synthesis. A
//!   synthesis failure degrades the reply to text only.
//! - **Audio fetch**: serve a synthesized file, then schedule its deletion.

pub mod audio;
pub mod gateway;
pub mod synth;
pub mod transcribe;
pub mod upload;
pub mod upstream;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use audio::{AudioStore, DeletionScheduler};
use gateway::GatewayClient;
use synth::SynthesisChain;
use transcribe::Transcriber;
use upload::{SpoolError, TempUpload, UploadWriter};
use upstream::UpstreamError;

/// A gateway reply plus, when synthesis succeeded, the fetchable audio URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub audio_url: Option<String>,
}

/// Audio bytes ready to send.
#[derive(Debug)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Owns the upstream clients, synthesis strategies and temp-file lifecycle.
pub struct VoiceRelay {
    transcriber: Transcriber,
    gateway: GatewayClient,
    synthesis: SynthesisChain,
    audio: AudioStore,
    deletions: DeletionScheduler,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
    audio_grace: Duration,
    unclaimed_audio: Duration,
}

impl VoiceRelay {
    /// Build the relay. `search_path` is the augmented `PATH` used to locate
    /// the local synthesizer.
    pub fn new(config: &Config, search_path: OsString) -> std::io::Result<Self> {
        Self::with_synthesis(
            config,
            SynthesisChain::from_config(&config.synthesis, search_path),
        )
    }

    /// Build the relay with an explicit synthesis chain.
    pub fn with_synthesis(config: &Config, synthesis: SynthesisChain) -> std::io::Result<Self> {
        let audio = AudioStore::open(&config.relay.audio_dir)?;
        std::fs::create_dir_all(&config.relay.upload_dir)?;
        Ok(Self {
            transcriber: Transcriber::new(&config.transcription),
            gateway: GatewayClient::new(&config.gateway),
            synthesis,
            audio,
            deletions: DeletionScheduler::new(),
            upload_dir: config.relay.upload_dir.clone(),
            max_upload_bytes: config.relay.max_upload_bytes,
            audio_grace: Duration::from_secs(config.relay.audio_grace_secs),
            unclaimed_audio: Duration::from_secs(config.relay.unclaimed_audio_secs),
        })
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn audio_dir(&self) -> &Path {
        self.audio.dir()
    }

    pub fn deletions(&self) -> &DeletionScheduler {
        &self.deletions
    }

    /// Remove synthesized audio left by a previous run.
    pub fn sweep_stale_audio(&self) -> usize {
        self.audio.sweep_stale()
    }

    /// Start spooling an upload into the upload directory.
    pub async fn begin_upload(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadWriter, SpoolError> {
        UploadWriter::create(&self.upload_dir, file_name, content_type, self.max_upload_bytes).await
    }

    /// Transcribe and consume `upload`; its file is removed on every path.
    pub async fn transcribe(&self, upload: TempUpload) -> Result<String, UpstreamError> {
        self.transcriber.transcribe(&upload).await
    }

    /// Forward `message` to the gateway and attempt synthesis of the reply.
    pub async fn chat(&self, message: &str) -> Result<ChatReply, UpstreamError> {
        let response = self.gateway.send(message).await?;
        if response.is_empty() {
            return Ok(ChatReply {
                response,
                audio_url: None,
            });
        }

        let audio_url = match self.synthesis.synthesize(&response, &self.audio).await {
            Some(audio) => {
                self.deletions.schedule(audio.path, self.unclaimed_audio);
                Some(AudioStore::url_for(&audio.name))
            }
            None => {
                info!("No synthesizer succeeded, replying with text only");
                None
            }
        };
        Ok(ChatReply {
            response,
            audio_url,
        })
    }

    /// Read a synthesized file and schedule its deletion after the grace
    /// delay. `None` when the name is foreign or the file is gone.
    pub async fn take_audio(&self, name: &str) -> Option<AudioPayload> {
        let path = self.audio.resolve(name)?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        self.deletions.schedule(path, self.audio_grace);
        Some(AudioPayload {
            bytes,
            content_type: content_type_for(name),
        })
    }
}

/// MIME type from a file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "aiff" | "aif" => "audio/aiff",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}
