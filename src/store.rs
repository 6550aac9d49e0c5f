//! Persisted bridge state: room↔channel mappings and virtual identities.
//!
//! The engine consumes storage through the [`DataStore`] trait and treats it
//! as an external, internally-consistent transactional collaborator — it
//! never holds a cross-event lock over store calls. [`MemoryStore`] is the
//! in-process implementation: HashMap state with optional JSON snapshot
//! persistence (atomic write via tmp+rename), suitable for tests and small
//! deployments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::irc::irc_lower;

/// How a room↔channel mapping came to exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MappingOrigin {
    /// An operator linked the channel by hand.
    Join,
    /// The bridge provisioned the room itself.
    Provision,
    /// Created through an alias lookup.
    Alias,
}

/// Group channel vs. 1:1 private conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    Channel,
    Pm,
}

/// One persisted room↔channel link. Created once, replaced on room upgrade,
/// never mutated otherwise. For `Pm` mappings the `channel` field holds the
/// IRC counterpart's nick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomMapping {
    pub room_id: String,
    pub server: String,
    pub channel: String,
    pub origin: MappingOrigin,
    pub kind: MappingKind,
    pub created_at: DateTime<Utc>,
}

impl RoomMapping {
    pub fn new(
        room_id: &str,
        server: &str,
        channel: &str,
        origin: MappingOrigin,
        kind: MappingKind,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            server: server.into(),
            channel: irc_lower(channel),
            origin,
            kind,
            created_at: Utc::now(),
        }
    }
}

/// Virtual IRC client configuration for one messaging-network user on one
/// server. The nick persisted here is used on every (re)connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IrcClientConfig {
    pub user_id: String,
    pub server: String,
    pub nick: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Per-user feature flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFeatures {
    #[serde(default)]
    pub flags: HashMap<String, bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no irc config for {user_id} on {server}")]
    MissingConfig { user_id: String, server: String },
}

/// Storage contract consumed by the engine.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// All mappings for a (server, channel) pair — a channel may fan out to
    /// several rooms.
    async fn get_rooms_for_channel(
        &self,
        server: &str,
        channel: &str,
    ) -> Result<Vec<RoomMapping>, StoreError>;

    /// All mappings referencing a room.
    async fn get_mappings_for_room(&self, room_id: &str) -> Result<Vec<RoomMapping>, StoreError>;

    /// All channel-kind mappings for one server.
    async fn get_mappings_for_server(&self, server: &str)
        -> Result<Vec<RoomMapping>, StoreError>;

    async fn store_room_mapping(&self, mapping: RoomMapping) -> Result<(), StoreError>;

    /// The specific mapping for (room, server, channel), if any.
    async fn get_room(
        &self,
        room_id: &str,
        server: &str,
        channel: &str,
    ) -> Result<Option<RoomMapping>, StoreError>;

    async fn remove_room(
        &self,
        room_id: &str,
        server: &str,
        channel: &str,
    ) -> Result<(), StoreError>;

    /// Atomically repoint every mapping from `old_room` to `new_room`,
    /// preserving server/channel/kind/origin. Returns the row count moved.
    async fn replace_room_mappings(
        &self,
        old_room: &str,
        new_room: &str,
    ) -> Result<usize, StoreError>;

    async fn get_irc_config(
        &self,
        user_id: &str,
        server: &str,
    ) -> Result<Option<IrcClientConfig>, StoreError>;

    async fn store_irc_config(&self, config: IrcClientConfig) -> Result<(), StoreError>;

    async fn store_pass(&self, user_id: &str, server: &str, pass: &str)
        -> Result<(), StoreError>;

    async fn remove_pass(&self, user_id: &str, server: &str) -> Result<(), StoreError>;

    async fn get_user_features(&self, user_id: &str) -> Result<UserFeatures, StoreError>;

    async fn store_user_features(
        &self,
        user_id: &str,
        features: UserFeatures,
    ) -> Result<(), StoreError>;
}

/// Snapshot written to disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    mappings: Vec<RoomMapping>,
    irc_configs: Vec<IrcClientConfig>,
    features: HashMap<String, UserFeatures>,
}

#[derive(Debug, Default)]
struct State {
    mappings: Vec<RoomMapping>,
    /// (user_id, server) → config.
    irc_configs: HashMap<(String, String), IrcClientConfig>,
    features: HashMap<String, UserFeatures>,
}

/// In-memory store with optional JSON snapshot persistence.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store with no persistence.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            persist_path: None,
        }
    }

    /// Load from `{data_dir}/bridge-store.json` or create empty.
    pub fn load_or_create(data_dir: &Path) -> Self {
        let path = data_dir.join("bridge-store.json");
        let mut state = State::default();

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(json) => match serde_json::from_str::<Snapshot>(&json) {
                    Ok(snap) => {
                        info!(
                            mappings = snap.mappings.len(),
                            configs = snap.irc_configs.len(),
                            "loaded bridge store"
                        );
                        state.mappings = snap.mappings;
                        for cfg in snap.irc_configs {
                            state
                                .irc_configs
                                .insert((cfg.user_id.clone(), cfg.server.clone()), cfg);
                        }
                        state.features = snap.features;
                    }
                    Err(e) => warn!("failed to parse bridge-store.json: {e}"),
                },
                Err(e) => warn!("failed to read bridge-store.json: {e}"),
            }
        }

        Self {
            state: Mutex::new(state),
            persist_path: Some(path),
        }
    }

    /// Persist a snapshot (atomic write via tmp+rename).
    fn persist(&self, state: &State) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let snap = Snapshot {
            mappings: state.mappings.clone(),
            irc_configs: state.irc_configs.values().cloned().collect(),
            features: state.features.clone(),
        };
        match serde_json::to_string_pretty(&snap) {
            Ok(json) => {
                let tmp = path.with_extension("json.tmp");
                if std::fs::write(&tmp, &json).is_ok() {
                    let _ = std::fs::rename(&tmp, path);
                }
            }
            Err(e) => warn!("failed to serialize bridge store: {e}"),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_rooms_for_channel(
        &self,
        server: &str,
        channel: &str,
    ) -> Result<Vec<RoomMapping>, StoreError> {
        let channel = irc_lower(channel);
        let state = self.state.lock().await;
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.server == server && m.channel == channel)
            .cloned()
            .collect())
    }

    async fn get_mappings_for_room(&self, room_id: &str) -> Result<Vec<RoomMapping>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn get_mappings_for_server(
        &self,
        server: &str,
    ) -> Result<Vec<RoomMapping>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.server == server && m.kind == MappingKind::Channel)
            .cloned()
            .collect())
    }

    async fn store_room_mapping(&self, mapping: RoomMapping) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        // Idempotent: re-storing the same (room, server, channel) replaces.
        state.mappings.retain(|m| {
            !(m.room_id == mapping.room_id
                && m.server == mapping.server
                && m.channel == mapping.channel)
        });
        state.mappings.push(mapping);
        self.persist(&state);
        Ok(())
    }

    async fn get_room(
        &self,
        room_id: &str,
        server: &str,
        channel: &str,
    ) -> Result<Option<RoomMapping>, StoreError> {
        let channel = irc_lower(channel);
        let state = self.state.lock().await;
        Ok(state
            .mappings
            .iter()
            .find(|m| m.room_id == room_id && m.server == server && m.channel == channel)
            .cloned())
    }

    async fn remove_room(
        &self,
        room_id: &str,
        server: &str,
        channel: &str,
    ) -> Result<(), StoreError> {
        let channel = irc_lower(channel);
        let mut state = self.state.lock().await;
        state
            .mappings
            .retain(|m| !(m.room_id == room_id && m.server == server && m.channel == channel));
        self.persist(&state);
        Ok(())
    }

    async fn replace_room_mappings(
        &self,
        old_room: &str,
        new_room: &str,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut moved = 0;
        for m in state.mappings.iter_mut() {
            if m.room_id == old_room {
                m.room_id = new_room.to_owned();
                moved += 1;
            }
        }
        self.persist(&state);
        Ok(moved)
    }

    async fn get_irc_config(
        &self,
        user_id: &str,
        server: &str,
    ) -> Result<Option<IrcClientConfig>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .irc_configs
            .get(&(user_id.to_owned(), server.to_owned()))
            .cloned())
    }

    async fn store_irc_config(&self, config: IrcClientConfig) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .irc_configs
            .insert((config.user_id.clone(), config.server.clone()), config);
        self.persist(&state);
        Ok(())
    }

    async fn store_pass(
        &self,
        user_id: &str,
        server: &str,
        pass: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let config = state
            .irc_configs
            .get_mut(&(user_id.to_owned(), server.to_owned()))
            .ok_or_else(|| StoreError::MissingConfig {
                user_id: user_id.into(),
                server: server.into(),
            })?;
        config.password = Some(pass.to_owned());
        self.persist(&state);
        Ok(())
    }

    async fn remove_pass(&self, user_id: &str, server: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(config) = state
            .irc_configs
            .get_mut(&(user_id.to_owned(), server.to_owned()))
        {
            config.password = None;
        }
        self.persist(&state);
        Ok(())
    }

    async fn get_user_features(&self, user_id: &str) -> Result<UserFeatures, StoreError> {
        let state = self.state.lock().await;
        Ok(state.features.get(user_id).cloned().unwrap_or_default())
    }

    async fn store_user_features(
        &self,
        user_id: &str,
        features: UserFeatures,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.features.insert(user_id.to_owned(), features);
        self.persist(&state);
        Ok(())
    }
}
