//! The persisted configuration surface: `Profile` plus a JSON-file-backed
//! `ProfileStore` holding the profile list and the selected-profile id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dispatch_common::{ProfileId, ProviderKind};
use dispatch_credential::Credential;
use dispatch_provider::VertexPublisher;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

fn default_true() -> bool {
    true
}

/// Configuration of one provider endpoint: stable id, human name, provider
/// type, base URL, ordered key list, optional header/endpoint overrides,
/// enabled flag, transport tweaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    /// Raw configured type string; parsed leniently via
    /// [`Profile::provider_kind`], which falls back to OpenAI-compatible for
    /// anything unrecognized rather than failing.
    #[serde(rename = "type")]
    pub provider_type: String,
    pub base_url: String,
    pub api_keys: Vec<Credential>,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_endpoint: Option<String>,
    /// Only consulted when `provider_kind()` resolves to `Vertex`; `"google"`
    /// or `"anthropic"`. Defaults to the Google publisher when absent.
    #[serde(default)]
    pub vertex_publisher: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub relax_id_certs: bool,
    #[serde(default)]
    pub http1_only: bool,
    /// Route every dispatch for this profile through the inspection proxy
    /// by default. A per-request `DispatchRequest::force_proxy` override
    /// always wins.
    #[serde(default)]
    pub force_proxy: bool,
}

impl Profile {
    /// Falls back to OpenAI-compatible for an unrecognized `type` string —
    /// many third-party providers claim that shape, so it's a reasonable
    /// default rather than a hard failure.
    pub fn provider_kind(&self) -> ProviderKind {
        self.provider_type.parse().unwrap_or(ProviderKind::OpenAI)
    }

    pub fn vertex_publisher(&self) -> Option<VertexPublisher> {
        match self.vertex_publisher.as_deref() {
            Some("anthropic") => Some(VertexPublisher::Anthropic),
            Some("google") => Some(VertexPublisher::Google),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    profiles: Vec<Profile>,
    selected_profile_id: Option<ProfileId>,
}

/// Owns the profile list and the selected-profile id; the Dispatcher never
/// mutates these directly. A request borrows a deep clone (`Profile` is
/// plain `Clone` data), so in-flight dispatches are unaffected by a
/// concurrent edit.
pub struct ProfileStore {
    path: Option<PathBuf>,
    state: RwLock<PersistedState>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self {
            path: None,
            state: RwLock::new(PersistedState::default()),
        }
    }

    /// Loads persisted state from `path` if it exists; otherwise starts
    /// empty. Subsequent `save()` calls write back to the same path.
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(err) => return Err(err),
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub async fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let state = self.state.read().await;
        let bytes = serde_json::to_vec_pretty(&*state).expect("persisted state serializes");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await
    }

    pub async fn get(&self, id: &ProfileId) -> Option<Profile> {
        self.state
            .read()
            .await
            .profiles
            .iter()
            .find(|profile| &profile.id == id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<Profile> {
        self.state.read().await.profiles.clone()
    }

    pub async fn selected(&self) -> Option<ProfileId> {
        self.state.read().await.selected_profile_id.clone()
    }

    pub async fn set_selected(&self, id: Option<ProfileId>) {
        self.state.write().await.selected_profile_id = id;
    }

    /// Inserts or replaces (by id) a profile.
    pub async fn upsert(&self, profile: Profile) {
        let mut guard = self.state.write().await;
        if let Some(existing) = guard.profiles.iter_mut().find(|p| p.id == profile.id) {
            *existing = profile;
        } else {
            guard.profiles.push(profile);
        }
    }

    pub async fn remove(&self, id: &ProfileId) {
        let mut guard = self.state.write().await;
        guard.profiles.retain(|p| &p.id != id);
        if guard.selected_profile_id.as_ref() == Some(id) {
            guard.selected_profile_id = None;
        }
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile(id: &str) -> Profile {
        Profile {
            id: ProfileId::from(id),
            name: "test".to_string(),
            provider_type: "claude".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_keys: vec![Credential::from("sk-ant-test".to_string())],
            custom_headers: BTreeMap::new(),
            custom_endpoint: None,
            vertex_publisher: None,
            enabled: true,
            relax_id_certs: false,
            http1_only: false,
            force_proxy: false,
        }
    }

    #[tokio::test]
    async fn unknown_provider_type_falls_back_to_openai() {
        let mut profile = sample_profile("p1");
        profile.provider_type = "mystery".to_string();
        assert_eq!(profile.provider_kind(), ProviderKind::OpenAI);
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = ProfileStore::new();
        store.upsert(sample_profile("p1")).await;
        let fetched = store.get(&ProfileId::from("p1")).await.unwrap();
        assert_eq!(fetched.name, "test");
    }

    #[tokio::test]
    async fn removing_the_selected_profile_clears_selection() {
        let store = ProfileStore::new();
        store.upsert(sample_profile("p1")).await;
        store.set_selected(Some(ProfileId::from("p1"))).await;
        store.remove(&ProfileId::from("p1")).await;
        assert_eq!(store.selected().await, None);
    }
}
