#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]

//! kai-remote library: the HTTP service behind the phone remote.
//!
//! - `guard`: origin address allow-listing (LAN, loopback, VPN mesh)
//! - `auth`: PIN header middleware, constant-time comparison
//! - `config`: TOML + env-var server configuration
//! - `registry`: JSON command allowlist and PIN
//! - `shell`: one-shot command execution with timeout and output caps
//! - `relay`: transcription, gateway chat, speech synthesis, temp files
//! - `routes`: REST handlers and router assembly

pub mod auth;
pub mod config;
pub mod guard;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod shell;
pub mod state;

pub use config::Config;
pub use registry::CommandRegistry;
pub use relay::VoiceRelay;
pub use state::AppState;
