//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, WatchResult};

/// Sizing for the dispatcher and handler pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max queued events before `publish` starts dropping.
    pub intake_queue_capacity: usize,
    /// Per-subscription pending delivery capacity.
    pub mailbox_capacity: usize,
    /// Number of handler worker threads.
    pub handler_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intake_queue_capacity: 4096,
            mailbox_capacity: 1024,
            handler_workers: 4,
        }
    }
}

impl EngineConfig {
    /// Rejects settings that cannot run.
    ///
    /// Capacities of zero are tolerated at runtime (clamped to one) but are
    /// rejected here so a mistyped file is caught early.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending setting.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks = [
            ("intake_queue_capacity", self.intake_queue_capacity),
            ("mailbox_capacity", self.mailbox_capacity),
            ("handler_workers", self.handler_workers),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("{name} must be at least 1"),
                });
            }
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed JSON or failed validation.
    pub fn from_json_str(text: &str) -> WatchResult<Self> {
        let cfg: Self = serde_json::from_str(text).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> WatchResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.intake_queue_capacity, 4096);
        assert_eq!(cfg.mailbox_capacity, 1024);
        assert_eq!(cfg.handler_workers, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"handler_workers": 8}"#).unwrap();
        assert_eq!(cfg.handler_workers, 8);
        assert_eq!(cfg.mailbox_capacity, 1024);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = EngineConfig::from_json_str(r#"{"handler_workers": 0}"#).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("handler_workers"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(EngineConfig::from_json_str("{").is_err());
        assert!(EngineConfig::from_json_str(r#"{"mailbox_capacity": -1}"#).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statewatch.json");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"{{"intake_queue_capacity": 32, "mailbox_capacity": 8}}"#).unwrap();
        drop(f);

        let cfg = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.intake_queue_capacity, 32);
        assert_eq!(cfg.mailbox_capacity, 8);
        assert_eq!(cfg.handler_workers, 4);

        let missing = EngineConfig::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert!(missing.is_validation());
    }
}
