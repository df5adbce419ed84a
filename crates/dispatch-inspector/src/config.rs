use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::rules::HeaderOverrideRule;

fn default_port() -> u16 {
    16655
}

/// Persisted inspection-proxy configuration: `{port, target_url,
/// header_override_rules}`, loaded and saved as a JSON file the same way
/// `dispatch-core::profile::Profile` is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub header_override_rules: Vec<HeaderOverrideRule>,
    /// Bound on the in-memory request/response ring buffers; older entries
    /// are trimmed once this capacity is exceeded.
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

fn default_ring_capacity() -> usize {
    500
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            target_url: String::new(),
            header_override_rules: Vec::new(),
            ring_capacity: default_ring_capacity(),
        }
    }
}

impl InspectorConfig {
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self).expect("inspector config serializes");
        tokio::fs::write(path, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_port_16655() {
        assert_eq!(InspectorConfig::default().port, 16655);
    }

    #[tokio::test]
    async fn loading_a_missing_file_returns_defaults() {
        let config = InspectorConfig::load("/nonexistent/path/inspector.json")
            .await
            .unwrap();
        assert_eq!(config.port, 16655);
        assert!(config.target_url.is_empty());
    }
}
