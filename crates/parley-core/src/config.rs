use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for the Parley engine.
///
/// Loaded from `parley.toml` by default. Each section corresponds to one
/// subsystem of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Backend service endpoints and request defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the agent service, without a trailing slash.
    pub base_url: String,
    /// Request timeout in seconds for non-streaming calls.
    pub timeout_secs: u64,
    /// How many prior messages to send as context with each query.
    pub context_length: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            context_length: 10,
        }
    }
}

/// Upload staging limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum images staged for a single outgoing message.
    pub max_images: usize,
    /// Maximum non-image files staged for a single outgoing message.
    pub max_files: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_images: 5,
            max_files: 5,
        }
    }
}

/// Voice capture and transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Sample rate of the encoded waveform in Hz.
    pub sample_rate: u32,
    /// Maximum recording duration in seconds (0 = unlimited).
    pub max_duration_secs: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_duration_secs: 120,
        }
    }
}

/// History cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Quiet period before a fetch is actually issued, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.backend.context_length, 10);
        assert_eq!(config.upload.max_images, 5);
        assert_eq!(config.upload.max_files, 5);
        assert_eq!(config.voice.sample_rate, 16_000);
        assert_eq!(config.history.debounce_ms, 300);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [backend]
            base_url = "http://example.com:9000"
        "#;
        let config: ParleyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.base_url, "http://example.com:9000");
        // Everything else keeps its default.
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.upload.max_images, 5);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");

        let mut config = ParleyConfig::default();
        config.backend.base_url = "http://10.0.0.2:8000".to_string();
        config.upload.max_images = 3;
        config.save(&path).unwrap();

        let loaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(loaded.backend.base_url, "http://10.0.0.2:8000");
        assert_eq!(loaded.upload.max_images, 3);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(ParleyConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = ParleyConfig::load_or_default(&path);
        assert_eq!(config.backend.base_url, "http://localhost:8000");
    }
}
