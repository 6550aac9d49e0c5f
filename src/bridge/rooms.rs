//! Room lifecycle — creating rooms for newly-tracked channels and migrating
//! bridge state when a room is superseded.
//!
//! Channel tracking is single-flighted per (server, channel): concurrent
//! triggers collapse into one bot-join + room-create, and late arrivals
//! observe the persisted mapping instead of re-creating. The bot joins the
//! channel *before* the room is created so channel state is observable;
//! channel modes are applied to the room's join rule asynchronously after
//! the mapping is persisted, and that step's failure is never surfaced.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::error::BridgeError;
use crate::config::{BridgeConfig, ServerConfig};
use crate::irc::{irc_lower, ConnectionPool, IrcTransport};
use crate::matrix::{joined_members, MatrixClient, RoomCreateOpts, StateEvent};
use crate::store::{DataStore, MappingKind, MappingOrigin, RoomMapping};

/// State event types carried across a room upgrade.
const UPGRADE_COPIED_TYPES: &[&str] = &[
    "m.room.bridging",
    "uk.half-shot.bridge",
    "m.room.related_groups",
];

pub struct RoomLifecycle {
    matrix: Arc<dyn MatrixClient>,
    transport: Arc<dyn IrcTransport>,
    store: Arc<dyn DataStore>,
    pool: Arc<ConnectionPool>,
    config: Arc<BridgeConfig>,
    /// Single-flight gates for channel tracking, keyed (server, channel).
    tracking: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl RoomLifecycle {
    pub fn new(
        matrix: Arc<dyn MatrixClient>,
        transport: Arc<dyn IrcTransport>,
        store: Arc<dyn DataStore>,
        pool: Arc<ConnectionPool>,
        config: Arc<BridgeConfig>,
    ) -> Self {
        Self {
            matrix,
            transport,
            store,
            pool,
            config,
            tracking: Mutex::new(HashMap::new()),
        }
    }

    /// Track a channel and create a room for it. Returns the room ID.
    pub async fn track_channel_and_create_room(
        &self,
        server: &ServerConfig,
        channel: &str,
        key: Option<&str>,
        invitees: &[String],
        origin: MappingOrigin,
    ) -> Result<String, BridgeError> {
        let chan = irc_lower(channel);

        let gate = {
            let mut tracking = self.tracking.lock().await;
            Arc::clone(
                tracking
                    .entry((server.id.clone(), chan.clone()))
                    .or_default(),
            )
        };
        let _tracking = gate.lock().await;

        // Re-read current mapping state — a concurrent trigger may have won.
        if let Some(existing) = self
            .store
            .get_rooms_for_channel(&server.id, &chan)
            .await?
            .into_iter()
            .find(|m| m.kind == MappingKind::Channel)
        {
            return Ok(existing.room_id);
        }

        // Bot joins first so channel state is observable.
        let bot = self.pool.get_bot(server).await?;
        {
            let _cmd = bot.cmd_lock.lock().await;
            if !bot.is_joined(&chan).await {
                self.transport
                    .join(&server.id, &bot.nick().await, &chan, key)
                    .await?;
                bot.confirm_join(&chan).await;
            }
        }

        let mut initial_state = vec![
            StateEvent::new(
                "m.room.join_rules",
                "",
                json!({"join_rule": server.join_rule.as_str()}),
            ),
            StateEvent::new(
                "m.room.history_visibility",
                "",
                json!({"history_visibility": "joined"}),
            ),
        ];
        if let Some(group_id) = &server.group_id {
            initial_state.push(StateEvent::new(
                "m.room.related_groups",
                "",
                json!({"groups": [group_id]}),
            ));
        }
        if server.bridge_info_state {
            initial_state.push(self.bridge_info_event(server, &chan));
        }

        let opts = RoomCreateOpts {
            name: Some(chan.clone()),
            visibility: "private".into(),
            preset: Some("public_chat".into()),
            federate: server.federate,
            room_alias_name: None,
            invite: invitees.to_vec(),
            initial_state,
        };
        let room_id = self
            .matrix
            .create_room(&self.config.bot_user_id, opts)
            .await?;

        self.store
            .store_room_mapping(RoomMapping::new(
                &room_id,
                &server.id,
                &chan,
                origin,
                MappingKind::Channel,
            ))
            .await?;
        info!(server = %server.id, channel = %chan, room = %room_id, "tracked channel");

        // Mode application happens after the mapping is persisted so +s/+i
        // observed meanwhile route through the mapping.
        self.spawn_mode_sync(server.id.clone(), chan, room_id.clone());

        Ok(room_id)
    }

    /// Apply currently-known channel modes to the room's join rule.
    /// Asynchronous; failure is logged and swallowed.
    fn spawn_mode_sync(&self, server_id: String, channel: String, room_id: String) {
        let matrix = Arc::clone(&self.matrix);
        let transport = Arc::clone(&self.transport);
        let bot_user = self.config.bot_user_id.clone();
        tokio::spawn(async move {
            match transport.channel_modes(&server_id, &channel).await {
                Ok(Some(modes)) if modes.secret || modes.invite_only || modes.key_set => {
                    let event = StateEvent::new(
                        "m.room.join_rules",
                        "",
                        json!({"join_rule": "invite"}),
                    );
                    if let Err(e) = matrix.send_state(&bot_user, &room_id, event).await {
                        warn!(channel = %channel, room = %room_id, "mode sync failed: {e}");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(channel = %channel, "mode lookup failed: {e}");
                }
            }
        });
    }

    /// Migrate bridge state from a superseded room to its replacement.
    ///
    /// Puppets leave the old room but do not auto-join the new one — they
    /// rejoin through the normal join-mirroring path once fresh membership
    /// is observed there.
    pub async fn migrate_on_upgrade(
        &self,
        old_room: &str,
        new_room: &str,
    ) -> Result<(), BridgeError> {
        info!(old = %old_room, new = %new_room, "migrating upgraded room");

        // Best-effort reconstitution of bridge state on the new room.
        let state = match self.matrix.room_state(old_room).await {
            Ok(state) => state,
            Err(e) => {
                warn!(room = %old_room, "could not read old room state: {e}");
                Vec::new()
            }
        };
        for event in state
            .iter()
            .filter(|ev| UPGRADE_COPIED_TYPES.contains(&ev.event_type.as_str()))
        {
            let mut event = event.clone();
            event.sender = None;
            if let Err(e) = self
                .matrix
                .send_state(&self.config.bot_user_id, new_room, event)
                .await
            {
                warn!(room = %new_room, "state copy failed: {e}");
            }
        }

        let moved = self.store.replace_room_mappings(old_room, new_room).await?;
        info!(old = %old_room, new = %new_room, moved, "mappings repointed");

        for member in joined_members(&state) {
            if member == self.config.bot_user_id {
                continue;
            }
            if self.config.puppet_owner(&member).is_some() {
                if let Err(e) = self.matrix.leave_room(&member, old_room).await {
                    warn!(user = %member, room = %old_room, "puppet leave failed: {e}");
                }
            }
        }

        Ok(())
    }

    fn bridge_info_event(&self, server: &ServerConfig, channel: &str) -> StateEvent {
        StateEvent::new(
            "uk.half-shot.bridge",
            &format!("irc/{}/{}", server.id, channel),
            json!({
                "bridgebot": self.config.bot_user_id,
                "protocol": {"id": "irc"},
                "network": {"id": server.id},
                "channel": {"id": channel},
            }),
        )
    }
}
