//! Text-to-speech as an ordered list of strategies.
//!
//! [`SynthesisChain`] tries each [`Synthesizer`] in turn; the first success
//! wins. Exhausting the list is not an error, the chain just yields `None`
//! and the reply goes out as text only.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::audio::AudioStore;
use super::upstream::{http_client, UpstreamError};
use crate::config::{CloudSynthConfig, LocalSynthConfig, SynthesisConfig};

/// A synthesized reply written into the [`AudioStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Store-issued file name, used in the fetch URL.
    pub name: String,
    pub path: PathBuf,
}

pub type SynthFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SynthesizedAudio, SynthError>> + Send + 'a>>;

/// One way of turning text into an audio file (dyn-compatible).
pub trait Synthesizer: Send + Sync {
    /// Display name for logs.
    fn name(&self) -> &str;

    /// Synthesize `text` into a new file allocated from `store`.
    fn synthesize<'a>(&'a self, text: &'a str, store: &'a AudioStore) -> SynthFuture<'a>;
}

/// Why a single strategy produced no audio.
#[derive(Debug)]
pub enum SynthError {
    /// The strategy cannot run here (tool missing, no credential).
    Unavailable(String),
    /// The strategy ran and failed.
    Failed(String),
    Upstream(UpstreamError),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::Unavailable(why) => write!(f, "unavailable: {why}"),
            SynthError::Failed(why) => write!(f, "failed: {why}"),
            SynthError::Upstream(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SynthError {}

impl From<UpstreamError> for SynthError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::NotConfigured(what) => {
                SynthError::Unavailable(format!("{what} is not configured"))
            }
            other => SynthError::Upstream(other),
        }
    }
}

/// Ordered fallback list of synthesizers.
pub struct SynthesisChain {
    strategies: Vec<Box<dyn Synthesizer>>,
}

impl SynthesisChain {
    pub fn new(strategies: Vec<Box<dyn Synthesizer>>) -> Self {
        Self { strategies }
    }

    /// Local CLI first (when enabled), cloud API second.
    pub fn from_config(config: &SynthesisConfig, search_path: OsString) -> Self {
        let mut strategies: Vec<Box<dyn Synthesizer>> = Vec::new();
        if config.local.enabled {
            strategies.push(Box::new(LocalCliSynth::new(&config.local, search_path)));
        }
        strategies.push(Box::new(CloudSynth::new(&config.cloud)));
        Self::new(strategies)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try every strategy in order. Never fails: exhaustion yields `None`.
    pub async fn synthesize(&self, text: &str, store: &AudioStore) -> Option<SynthesizedAudio> {
        for strategy in &self.strategies {
            match strategy.synthesize(text, store).await {
                Ok(audio) => {
                    info!("Synthesized reply with {} -> {}", strategy.name(), audio.name);
                    return Some(audio);
                }
                Err(SynthError::Unavailable(why)) => {
                    debug!("{} skipped: {why}", strategy.name());
                }
                Err(e) => {
                    warn!("{} synthesis {e}", strategy.name());
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Local command-line tool
// ---------------------------------------------------------------------------

/// Runs a local TTS program that writes its output to a file.
pub struct LocalCliSynth {
    name: String,
    program: String,
    args: Vec<String>,
    extension: String,
    timeout: Duration,
    search_path: OsString,
}

impl LocalCliSynth {
    pub fn new(config: &LocalSynthConfig, search_path: OsString) -> Self {
        Self {
            name: format!("local ({})", config.program),
            program: config.program.clone(),
            args: config.args.clone(),
            extension: config.extension.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            search_path,
        }
    }

    /// Locate the program: as given when it contains a `/`, else on the
    /// search path.
    fn locate(&self) -> Option<PathBuf> {
        if self.program.contains('/') {
            let p = PathBuf::from(&self.program);
            return p.is_file().then_some(p);
        }
        std::env::split_paths(&self.search_path)
            .map(|dir| dir.join(&self.program))
            .find(|p| p.is_file())
    }

    fn render_args(&self, text: &str, output: &Path) -> Vec<OsString> {
        let output = output.as_os_str();
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                "{text}" => OsString::from(text),
                "{output}" => output.to_os_string(),
                other => {
                    let out = output.to_string_lossy();
                    OsString::from(other.replace("{output}", &out).replace("{text}", text))
                }
            })
            .collect()
    }

    async fn run(&self, text: &str, store: &AudioStore) -> Result<SynthesizedAudio, SynthError> {
        let program = self
            .locate()
            .ok_or_else(|| SynthError::Unavailable(format!("{} not found", self.program)))?;
        let (name, path) = store.allocate(&self.extension);

        let mut cmd = Command::new(&program);
        cmd.args(self.render_args(text, &path))
            .env("PATH", &self.search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) if out.status.success() => match tokio::fs::metadata(&path).await {
                Ok(m) if m.len() > 0 => Ok(SynthesizedAudio { name, path: path.clone() }),
                _ => Err(SynthError::Failed("program produced no audio".to_string())),
            },
            Ok(Ok(out)) => Err(SynthError::Failed(format!(
                "exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Ok(Err(e)) => Err(SynthError::Failed(e.to_string())),
            Err(_) => Err(SynthError::Failed(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        result
    }
}

impl Synthesizer for LocalCliSynth {
    fn name(&self) -> &str {
        &self.name
    }

    fn synthesize<'a>(&'a self, text: &'a str, store: &'a AudioStore) -> SynthFuture<'a> {
        Box::pin(self.run(text, store))
    }
}

// ---------------------------------------------------------------------------
// Cloud API
// ---------------------------------------------------------------------------

/// OpenAI-compatible speech endpoint.
///
/// POST `{endpoint}` with `{"model", "input", "voice", "response_format"}`;
/// the response body is the encoded audio.
pub struct CloudSynth {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
    format: String,
    api_key: Option<String>,
}

impl CloudSynth {
    pub fn new(config: &CloudSynthConfig) -> Self {
        Self {
            http: http_client(Duration::from_secs(60)),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            format: config.format.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn run(&self, text: &str, store: &AudioStore) -> Result<SynthesizedAudio, SynthError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("Speech API key"))?;

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
                "response_format": self.format,
            }))
            .send()
            .await
            .map_err(UpstreamError::from)?;

        if !resp.status().is_success() {
            return Err(UpstreamError::from_response(resp).await.into());
        }

        let bytes = resp.bytes().await.map_err(UpstreamError::from)?;
        if bytes.is_empty() {
            return Err(SynthError::Failed("speech API returned no audio".to_string()));
        }

        let (name, path) = store.allocate(&self.format);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| SynthError::Failed(format!("writing {}: {e}", path.display())))?;
        Ok(SynthesizedAudio { name, path })
    }
}

impl Synthesizer for CloudSynth {
    fn name(&self) -> &str {
        "cloud"
    }

    fn synthesize<'a>(&'a self, text: &'a str, store: &'a AudioStore) -> SynthFuture<'a> {
        Box::pin(self.run(text, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Failing(Arc<AtomicUsize>);

    impl Synthesizer for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn synthesize<'a>(&'a self, _text: &'a str, _store: &'a AudioStore) -> SynthFuture<'a> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(SynthError::Failed("boom".into())) })
        }
    }

    struct Writing;

    impl Synthesizer for Writing {
        fn name(&self) -> &str {
            "writing"
        }
        fn synthesize<'a>(&'a self, text: &'a str, store: &'a AudioStore) -> SynthFuture<'a> {
            Box::pin(async move {
                let (name, path) = store.allocate("txt");
                tokio::fs::write(&path, text).await.unwrap();
                Ok(SynthesizedAudio { name, path })
            })
        }
    }

    fn sh_local(args: &[&str]) -> LocalCliSynth {
        LocalCliSynth::new(
            &LocalSynthConfig {
                enabled: true,
                program: "sh".to_string(),
                args: args.iter().map(|a| (*a).to_string()).collect(),
                extension: "txt".to_string(),
                timeout_secs: 5,
            },
            OsString::from("/usr/bin:/bin"),
        )
    }

    #[tokio::test]
    async fn first_success_wins_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = SynthesisChain::new(vec![
            Box::new(Failing(calls.clone())),
            Box::new(Writing),
            Box::new(Failing(calls.clone())),
        ]);

        let audio = chain.synthesize("hello", &store).await.unwrap();
        assert_eq!(std::fs::read_to_string(audio.path).unwrap(), "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = SynthesisChain::new(vec![Box::new(Failing(calls.clone()))]);
        assert!(chain.synthesize("hello", &store).await.is_none());
    }

    #[tokio::test]
    async fn local_cli_passes_text_as_single_argument() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let synth = sh_local(&["-c", "printf %s \"$0\" > \"$1\"", "{text}", "{output}"]);

        let text = "hi; rm -rf / $(whoami)";
        let audio = synth.synthesize(text, &store).await.unwrap();
        assert_eq!(std::fs::read_to_string(&audio.path).unwrap(), text);
    }

    #[tokio::test]
    async fn local_cli_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let synth = sh_local(&["-c", "echo partial > \"$0\"; exit 1", "{output}"]);

        let err = synth.synthesize("x", &store).await.unwrap_err();
        assert!(matches!(err, SynthError::Failed(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let synth = LocalCliSynth::new(
            &LocalSynthConfig {
                program: "definitely-not-a-tts-tool".to_string(),
                ..LocalSynthConfig::default()
            },
            OsString::from("/usr/bin:/bin"),
        );
        let err = synth.synthesize("x", &store).await.unwrap_err();
        assert!(matches!(err, SynthError::Unavailable(_)));
    }

    #[tokio::test]
    async fn cloud_without_key_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let synth = CloudSynth::new(&CloudSynthConfig::default());
        let err = synth.synthesize("x", &store).await.unwrap_err();
        assert!(matches!(err, SynthError::Unavailable(_)));
    }
}
