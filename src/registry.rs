//! Command registry: the allow-listed set of shell invocations.
//!
//! The registry is data, not code: it is read once from a JSON document and
//! never mutated afterwards.
//!
//! ```json
//! {
//!   "pin": "1234",
//!   "allowCustomCommands": false,
//!   "commands": [
//!     { "id": "ls", "label": "List tmp", "icon": "📁", "category": "files", "command": "ls /tmp" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// A single named, allow-listed shell invocation.
///
/// `command` is executed verbatim; it is never templated with client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub id: String,
    pub label: String,
    pub icon: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub command: String,
}

fn default_category() -> String {
    "other".to_string()
}

/// Raw JSON document shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    pin: String,
    #[serde(default)]
    commands: Vec<CommandDescriptor>,
    #[serde(default)]
    allow_custom_commands: bool,
}

/// Validated, immutable registry plus the shared-secret PIN that guards it.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    pin: String,
    commands: Vec<CommandDescriptor>,
    allow_custom: bool,
}

/// Why a command string was refused by [`CommandRegistry::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Missing or zero-length command string.
    Empty,
    /// Not in the allowlist and custom commands are disabled.
    NotAllowed,
}

impl CommandRegistry {
    /// Build a registry from already-parsed parts, enforcing the same
    /// invariants as [`CommandRegistry::load`].
    pub fn new(
        pin: impl Into<String>,
        commands: Vec<CommandDescriptor>,
        allow_custom: bool,
    ) -> Result<Self, ConfigError> {
        let registry = Self {
            pin: pin.into(),
            commands,
            allow_custom,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Read and validate the JSON registry at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RegistryFile = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Self::new(raw.pin, raw.commands, raw.allow_custom_commands)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pin.is_empty() {
            return Err(ConfigError::Invalid("pin must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for (i, cmd) in self.commands.iter().enumerate() {
            if cmd.id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("commands[{i}]: id is empty")));
            }
            if cmd.label.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "commands[{i}] ({}): label is empty",
                    cmd.id
                )));
            }
            if cmd.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "commands[{i}] ({}): command is empty",
                    cmd.id
                )));
            }
            if !seen.insert(cmd.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate command id {:?}", cmd.id)));
            }
        }
        Ok(())
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Descriptors in configuration order.
    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    pub fn allows_custom(&self) -> bool {
        self.allow_custom
    }

    /// Decide whether `command` may run.
    ///
    /// A command is accepted when it is byte-for-byte equal to some
    /// descriptor's `command`, or unconditionally when custom commands are
    /// enabled. Only an absent or zero-length string counts as empty;
    /// whitespace is matched like any other command text.
    pub fn authorize(&self, command: Option<&str>) -> Result<(), Rejection> {
        let command = match command {
            Some(c) if !c.is_empty() => c,
            _ => return Err(Rejection::Empty),
        };
        if self.allow_custom || self.commands.iter().any(|c| c.command == command) {
            Ok(())
        } else {
            Err(Rejection::NotAllowed)
        }
    }
}
