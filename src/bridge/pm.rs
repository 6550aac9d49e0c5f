//! Private-message coordination — single-flights concurrent first-contact
//! events between a protocol pair of users into exactly one room creation.
//!
//! The pending marker is a map from the unordered user pair to a shared
//! watch cell plus a FIFO message queue. The first caller creates the room;
//! every concurrent caller either queues its message behind the marker or
//! awaits the cell. Queued messages flush in arrival order before the
//! marker resolves, so no late send can overtake an earlier queued one.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use super::error::BridgeError;
use crate::config::ServerConfig;
use crate::irc::irc_lower;
use crate::matrix::{MatrixClient, RoomCreateOpts, StateEvent};
use crate::store::{DataStore, MappingKind, MappingOrigin, RoomMapping};

/// Fixed reason used when a group-context contact is rejected.
pub const GROUP_CHAT_UNSUPPORTED: &str = "Group chat not supported.";

/// Unordered pair of a (server, nick) IRC user and a messaging-network user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PmKey {
    lo: String,
    hi: String,
}

impl PmKey {
    pub fn new(server_id: &str, irc_nick: &str, matrix_user: &str) -> Self {
        let a = format!("irc/{server_id}/{}", irc_lower(irc_nick));
        let b = format!("matrix/{matrix_user}");
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }
}

type Resolution = Result<String, String>;

struct Pending {
    queue: Vec<String>,
    tx: watch::Sender<Option<Resolution>>,
    rx: watch::Receiver<Option<Resolution>>,
}

#[derive(Default)]
struct CoordState {
    resolved: HashMap<PmKey, String>,
    pending: HashMap<PmKey, Pending>,
}

pub struct PmCoordinator {
    matrix: Arc<dyn MatrixClient>,
    store: Arc<dyn DataStore>,
    state: Mutex<CoordState>,
}

enum Role {
    Deliver(String),
    Queued,
    Creator,
}

impl PmCoordinator {
    pub fn new(matrix: Arc<dyn MatrixClient>, store: Arc<dyn DataStore>) -> Self {
        Self {
            matrix,
            store,
            state: Mutex::new(CoordState::default()),
        }
    }

    /// Deliver a private message from an IRC user to a messaging-network
    /// user, creating the 1:1 room on first contact.
    pub async fn send_pm(
        &self,
        server: &ServerConfig,
        irc_nick: &str,
        puppet_user: &str,
        matrix_user: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        let key = PmKey::new(&server.id, irc_nick, matrix_user);

        let role = {
            let mut st = self.state.lock().await;
            if let Some(room) = st.resolved.get(&key) {
                Role::Deliver(room.clone())
            } else if let Some(pending) = st.pending.get_mut(&key) {
                pending.queue.push(text.to_owned());
                Role::Queued
            } else {
                let (tx, rx) = watch::channel(None);
                st.pending.insert(
                    key.clone(),
                    Pending {
                        queue: vec![text.to_owned()],
                        tx,
                        rx,
                    },
                );
                Role::Creator
            }
        };

        match role {
            Role::Deliver(room) => {
                self.matrix.send_message(puppet_user, &room, text).await?;
                Ok(())
            }
            // Will be flushed, in arrival order, by the creating caller.
            Role::Queued => Ok(()),
            Role::Creator => self
                .create_and_flush(server, irc_nick, puppet_user, matrix_user, key)
                .await
                .map(|_| ()),
        }
    }

    /// The 1:1 room for a pair, creating it if no contact happened yet.
    /// Concurrent callers for the same pair observe one creation.
    pub async fn open_private_room(
        &self,
        server: &ServerConfig,
        irc_nick: &str,
        puppet_user: &str,
        matrix_user: &str,
    ) -> Result<String, BridgeError> {
        let key = PmKey::new(&server.id, irc_nick, matrix_user);

        enum Entry {
            Have(String),
            Wait(watch::Receiver<Option<Resolution>>),
            Create,
        }

        let entry = {
            let mut st = self.state.lock().await;
            if let Some(room) = st.resolved.get(&key) {
                Entry::Have(room.clone())
            } else if let Some(pending) = st.pending.get(&key) {
                Entry::Wait(pending.rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                st.pending.insert(
                    key.clone(),
                    Pending {
                        queue: Vec::new(),
                        tx,
                        rx,
                    },
                );
                Entry::Create
            }
        };

        match entry {
            Entry::Have(room) => Ok(room),
            Entry::Wait(mut rx) => loop {
                let settled = rx.borrow().clone();
                if let Some(resolution) = settled {
                    return resolution.map_err(BridgeError::RemoteRejection);
                }
                rx.changed().await.map_err(|_| {
                    BridgeError::RemoteRejection("pm room creation aborted".into())
                })?;
            },
            Entry::Create => {
                self.create_and_flush(server, irc_nick, puppet_user, matrix_user, key)
                    .await
            }
        }
    }

    /// Record a 1:1 room established from the messaging-network side (an
    /// `is_direct` invite) so later contact reuses it.
    pub async fn register_direct(
        &self,
        server: &ServerConfig,
        irc_nick: &str,
        matrix_user: &str,
        room_id: &str,
    ) -> Result<(), BridgeError> {
        let key = PmKey::new(&server.id, irc_nick, matrix_user);
        self.state
            .lock()
            .await
            .resolved
            .insert(key, room_id.to_owned());
        self.store
            .store_room_mapping(RoomMapping::new(
                room_id,
                &server.id,
                irc_nick,
                MappingOrigin::Join,
                MappingKind::Pm,
            ))
            .await?;
        Ok(())
    }

    async fn create_and_flush(
        &self,
        server: &ServerConfig,
        irc_nick: &str,
        puppet_user: &str,
        matrix_user: &str,
        key: PmKey,
    ) -> Result<String, BridgeError> {
        let created = self.create_pm_room(server, puppet_user, matrix_user).await;

        let room_id = match created {
            Ok(room_id) => room_id,
            Err(e) => {
                let mut st = self.state.lock().await;
                if let Some(pending) = st.pending.remove(&key) {
                    if !pending.queue.is_empty() {
                        warn!(
                            server = %server.id,
                            nick = %irc_nick,
                            dropped = pending.queue.len(),
                            "pm: dropping queued messages after failed room creation"
                        );
                    }
                    let _ = pending.tx.send(Some(Err(e.to_string())));
                }
                return Err(e);
            }
        };

        info!(
            server = %server.id,
            nick = %irc_nick,
            user = %matrix_user,
            room = %room_id,
            "pm: created 1:1 room"
        );

        if let Err(e) = self
            .store
            .store_room_mapping(RoomMapping::new(
                &room_id,
                &server.id,
                irc_nick,
                MappingOrigin::Provision,
                MappingKind::Pm,
            ))
            .await
        {
            // The room exists; routing still works from the in-memory map.
            warn!(room = %room_id, "pm: failed to persist mapping: {e}");
        }

        // Flush queued messages in arrival order, then resolve. Resolution
        // happens under the same lock as the final emptiness check so no
        // message can slip between them.
        loop {
            let batch: Option<Vec<String>> = {
                let mut st = self.state.lock().await;
                match st.pending.get_mut(&key) {
                    None => None,
                    Some(pending) if pending.queue.is_empty() => {
                        if let Some(pending) = st.pending.remove(&key) {
                            let _ = pending.tx.send(Some(Ok(room_id.clone())));
                        }
                        st.resolved.insert(key.clone(), room_id.clone());
                        None
                    }
                    Some(pending) => Some(std::mem::take(&mut pending.queue)),
                }
            };
            let Some(batch) = batch else {
                break;
            };
            for text in batch {
                if let Err(e) = self.matrix.send_message(puppet_user, &room_id, &text).await {
                    warn!(room = %room_id, "pm: queued message delivery failed: {e}");
                }
            }
        }

        Ok(room_id)
    }

    async fn create_pm_room(
        &self,
        server: &ServerConfig,
        puppet_user: &str,
        matrix_user: &str,
    ) -> Result<String, BridgeError> {
        let mut users = serde_json::Map::new();
        users.insert(matrix_user.to_owned(), json!(10));
        users.insert(puppet_user.to_owned(), json!(100));

        let power_levels = StateEvent::new(
            "m.room.power_levels",
            "",
            json!({
                "users": users,
                "events": {
                    "m.room.avatar": 10,
                    "m.room.name": 10,
                    "m.room.canonical_alias": 100,
                    "m.room.history_visibility": 100,
                    "m.room.power_levels": 100,
                    "m.room.encryption": 100
                },
                "invite": 100
            }),
        );

        let opts = RoomCreateOpts {
            visibility: "private".into(),
            federate: server.pm.federate,
            invite: vec![matrix_user.to_owned()],
            initial_state: vec![power_levels],
            ..Default::default()
        };

        Ok(self.matrix.create_room(puppet_user, opts).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm_key_is_unordered() {
        let a = PmKey::new("irc.example", "bob", "@alice:home.test");
        let b = PmKey::new("irc.example", "Bob", "@alice:home.test");
        assert_eq!(a, b);
    }

    #[test]
    fn pm_key_distinguishes_pairs() {
        let a = PmKey::new("irc.example", "bob", "@alice:home.test");
        let b = PmKey::new("irc.example", "bob", "@carol:home.test");
        let c = PmKey::new("irc.other", "bob", "@alice:home.test");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
