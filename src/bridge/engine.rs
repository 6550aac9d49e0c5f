//! The routing core — consumes membership and message events from both
//! protocols and issues the minimal set of mirrored actions to keep
//! membership convergent.
//!
//! Every mapped room/channel is mirrored independently: a failure against
//! one target is logged and does not block the others. Handlers re-read
//! current mapping state before acting and check the connection's joined
//! set, so replayed or racing events degrade to no-ops rather than
//! duplicate commands. Events referencing untracked rooms or channels are
//! silent no-ops, not errors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::pm::{PmCoordinator, GROUP_CHAT_UNSUPPORTED};
use super::provisioner::IdentityProvisioner;
use super::rooms::RoomLifecycle;
use crate::config::{BridgeConfig, ServerConfig};
use crate::irc::{irc_lower, ConnectionPool, IrcError, IrcTransport};
use crate::matrix::{joined_members, MatrixClient, MatrixError};
use crate::store::{DataStore, MappingKind, RoomMapping};

/// Notice sent into a 1:1 room when PM bridging is disabled for the server.
const PM_DISABLED_NOTICE: &str = "This bridge does not support private messaging.";

/// Whether an IRC numeric/error code means the join was rejected because
/// the nick must be registered.
pub fn registration_required(code: &str) -> bool {
    matches!(code, "err_needreggednick" | "477")
}

pub struct MembershipSyncEngine {
    config: Arc<BridgeConfig>,
    store: Arc<dyn DataStore>,
    matrix: Arc<dyn MatrixClient>,
    transport: Arc<dyn IrcTransport>,
    pool: Arc<ConnectionPool>,
    provisioner: Arc<IdentityProvisioner>,
    pm: Arc<PmCoordinator>,
    lifecycle: Arc<RoomLifecycle>,
    /// IRC-side membership bookkeeping: (server, channel) → real nicks
    /// currently present. Needed to fan a QUIT out to the right channels.
    channel_members: Mutex<HashMap<(String, String), HashSet<String>>>,
}

impl MembershipSyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<BridgeConfig>,
        store: Arc<dyn DataStore>,
        matrix: Arc<dyn MatrixClient>,
        transport: Arc<dyn IrcTransport>,
        pool: Arc<ConnectionPool>,
        provisioner: Arc<IdentityProvisioner>,
        pm: Arc<PmCoordinator>,
        lifecycle: Arc<RoomLifecycle>,
    ) -> Self {
        Self {
            config,
            store,
            matrix,
            transport,
            pool,
            provisioner,
            pm,
            lifecycle,
            channel_members: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn lifecycle(&self) -> &Arc<RoomLifecycle> {
        &self.lifecycle
    }

    pub fn pm(&self) -> &Arc<PmCoordinator> {
        &self.pm
    }

    fn bot(&self) -> &str {
        &self.config.bot_user_id
    }

    /// Whether a user ID belongs to the bridge itself (bot or any puppet).
    fn is_own_user(&self, user_id: &str) -> bool {
        user_id == self.bot() || self.config.puppet_owner(user_id).is_some()
    }

    // ── Messaging-network → IRC ──────────────────────────────────

    /// A user joined a mapped room: join its channels as that user.
    pub async fn on_matrix_join(&self, room_id: &str, user_id: &str) -> Result<(), BridgeError> {
        if self.is_own_user(user_id) {
            return Ok(());
        }
        let mappings = self.store.get_mappings_for_room(room_id).await?;
        for mapping in mappings.iter().filter(|m| m.kind == MappingKind::Channel) {
            let Some(server) = self.config.server(&mapping.server) else {
                warn!(server = %mapping.server, "mapping references unknown server");
                continue;
            };
            let lists = &server.membership_lists;
            if !lists.enabled || !lists.matrix_to_irc.incremental {
                continue;
            }
            if !server.authorises(user_id) {
                debug!(user = %user_id, server = %server.id, "join not authorised");
                continue;
            }
            if let Err(e) = self.mirror_join(server, user_id, &mapping.channel).await {
                warn!(
                    room = %room_id,
                    channel = %mapping.channel,
                    user = %user_id,
                    "join mirror failed: {e}"
                );
            }
        }
        Ok(())
    }

    async fn mirror_join(
        &self,
        server: &ServerConfig,
        user_id: &str,
        channel: &str,
    ) -> Result<(), BridgeError> {
        let config = self.provisioner.irc_config_for(server, user_id).await?;
        let conn = self.pool.get_user(server, &config).await?;
        if conn.is_joined(channel).await {
            return Ok(());
        }
        let _cmd = conn.cmd_lock.lock().await;
        if conn.is_joined(channel).await {
            return Ok(());
        }
        let nick = conn.nick().await;
        match self.transport.join(&server.id, &nick, channel, None).await {
            Ok(()) => {
                conn.confirm_join(channel).await;
                Ok(())
            }
            Err(IrcError::JoinRejected { code, .. }) if registration_required(&code) => {
                // Authoritative rejection — membership cannot be honored.
                self.kick_for_join_rejection(server, channel, user_id, &code)
                    .await;
                Err(IrcError::JoinRejected {
                    channel: channel.into(),
                    code,
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn kick_for_join_rejection(
        &self,
        server: &ServerConfig,
        channel: &str,
        user_id: &str,
        code: &str,
    ) {
        let reason = format!("Failed to join {channel}: registration required ({code})");
        let rooms = match self.store.get_rooms_for_channel(&server.id, channel).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(channel = %channel, "mapping lookup failed: {e}");
                return;
            }
        };
        for mapping in rooms.iter().filter(|m| m.kind == MappingKind::Channel) {
            if let Err(e) = self
                .matrix
                .kick(self.bot(), &mapping.room_id, user_id, &reason)
                .await
            {
                warn!(room = %mapping.room_id, user = %user_id, "rejection kick failed: {e}");
            }
        }
    }

    /// A user left or was kicked from a mapped room: mirror to IRC.
    pub async fn on_matrix_leave(
        &self,
        room_id: &str,
        user_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<(), BridgeError> {
        if user_id == self.bot() {
            return Ok(());
        }
        let mappings = self.store.get_mappings_for_room(room_id).await?;
        if mappings.is_empty() {
            return Ok(());
        }

        // A puppet was removed on the messaging-network side: the actor's
        // own connection kicks the real IRC user.
        if let Some((server, target_nick)) = self.config.puppet_owner(user_id) {
            if actor_id == user_id {
                // A puppet leaving by itself is bridge-initiated; nothing
                // to mirror back.
                return Ok(());
            }
            let reason_str = kick_reason(actor_id, reason);
            for mapping in mappings
                .iter()
                .filter(|m| m.kind == MappingKind::Channel && m.server == server.id)
            {
                let Some(conn) = self.pool.bridged_connection(&server.id, actor_id).await else {
                    debug!(actor = %actor_id, "kick actor has no connection");
                    continue;
                };
                let _cmd = conn.cmd_lock.lock().await;
                let nick = conn.nick().await;
                if let Err(e) = self
                    .transport
                    .kick(&server.id, &nick, &mapping.channel, target_nick, &reason_str)
                    .await
                {
                    warn!(channel = %mapping.channel, target = %target_nick, "kick failed: {e}");
                }
            }
            return Ok(());
        }

        // A real user left: their virtual connection parts each channel.
        for mapping in mappings.iter().filter(|m| m.kind == MappingKind::Channel) {
            let Some(server) = self.config.server(&mapping.server) else {
                continue;
            };
            let Some(conn) = self.pool.bridged_connection(&server.id, user_id).await else {
                continue;
            };
            if !conn.is_joined(&mapping.channel).await {
                continue;
            }
            let part_reason = if actor_id != user_id {
                Some(kick_reason(actor_id, reason))
            } else {
                None
            };
            let _cmd = conn.cmd_lock.lock().await;
            let nick = conn.nick().await;
            match self
                .transport
                .part(&server.id, &nick, &mapping.channel, part_reason.as_deref())
                .await
            {
                Ok(()) => conn.confirm_part(&mapping.channel).await,
                Err(e) => {
                    warn!(channel = %mapping.channel, user = %user_id, "part failed: {e}")
                }
            }
        }
        Ok(())
    }

    /// A message in a mapped room: deliver to the channel (or PM target),
    /// lazily provisioning the sender's connection.
    pub async fn on_matrix_message(
        &self,
        room_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        if self.is_own_user(user_id) {
            return Ok(());
        }
        let mappings = self.store.get_mappings_for_room(room_id).await?;
        for mapping in &mappings {
            let Some(server) = self.config.server(&mapping.server) else {
                continue;
            };
            if !server.authorises(user_id) {
                continue;
            }
            if let Err(e) = self.deliver_to_irc(server, mapping, user_id, text).await {
                warn!(
                    room = %room_id,
                    target = %mapping.channel,
                    user = %user_id,
                    "message delivery failed: {e}"
                );
            }
        }
        Ok(())
    }

    async fn deliver_to_irc(
        &self,
        server: &ServerConfig,
        mapping: &RoomMapping,
        user_id: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        let config = self.provisioner.irc_config_for(server, user_id).await?;
        let conn = self.pool.get_user(server, &config).await?;
        let _cmd = conn.cmd_lock.lock().await;
        let nick = conn.nick().await;
        if mapping.kind == MappingKind::Channel && !conn.is_joined(&mapping.channel).await {
            self.transport
                .join(&server.id, &nick, &mapping.channel, None)
                .await?;
            conn.confirm_join(&mapping.channel).await;
        }
        self.transport
            .privmsg(&server.id, &nick, &mapping.channel, text)
            .await?;
        Ok(())
    }

    /// An invite: admin room (bot target), 1:1 PM, or group rejection.
    pub async fn on_matrix_invite(
        &self,
        room_id: &str,
        target_id: &str,
        inviter_id: &str,
        is_direct: bool,
    ) -> Result<(), BridgeError> {
        if target_id == self.bot() {
            // Admin room: the bot always accepts, repeat invites included.
            self.matrix.join_room(self.bot(), room_id).await?;
            return Ok(());
        }
        let Some((server, nick)) = self.config.puppet_owner(target_id) else {
            return Ok(());
        };

        // The invite names a nick nobody holds on IRC? Abort before
        // creating an impersonatable puppet.
        let puppet = self
            .provisioner
            .verified_puppet_for(server, &server.bot_nick, nick)
            .await?;
        self.join_room_as(&puppet, room_id).await?;

        if inviter_id == self.bot() {
            return Ok(());
        }

        if is_direct {
            if !server.pm.enabled {
                if let Err(e) = self
                    .matrix
                    .send_message(&puppet, room_id, PM_DISABLED_NOTICE)
                    .await
                {
                    warn!(room = %room_id, "pm-disabled notice failed: {e}");
                }
                self.matrix.leave_room(&puppet, room_id).await?;
                return Ok(());
            }
            self.pm
                .register_direct(server, nick, inviter_id, room_id)
                .await?;
        } else {
            // Group context — 1:1 intent is never established.
            self.matrix
                .kick(&puppet, room_id, &puppet, GROUP_CHAT_UNSUPPORTED)
                .await?;
        }
        Ok(())
    }

    /// A room was tombstoned: migrate bridge state to the replacement.
    pub async fn on_room_upgrade(
        &self,
        old_room: &str,
        new_room: &str,
    ) -> Result<(), BridgeError> {
        self.lifecycle.migrate_on_upgrade(old_room, new_room).await
    }

    // ── IRC → messaging network ──────────────────────────────────

    /// An IRC user joined a mapped channel: join its rooms as the puppet.
    pub async fn on_irc_join(
        &self,
        server_id: &str,
        channel: &str,
        nick: &str,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        if self.is_bridge_nick(server, nick).await {
            return Ok(());
        }
        self.note_member(server_id, channel, nick, true).await;

        let rooms = self.channel_rooms(server_id, channel).await?;
        if rooms.is_empty() {
            return Ok(());
        }
        let lists = &server.membership_lists;
        if !lists.enabled || !lists.irc_to_matrix.incremental {
            return Ok(());
        }

        let puppet = self.provisioner.puppet_for(server, nick).await?;
        for mapping in &rooms {
            if let Err(e) = self.join_room_as(&puppet, &mapping.room_id).await {
                warn!(room = %mapping.room_id, nick = %nick, "room join failed: {e}");
            }
        }
        Ok(())
    }

    /// An IRC user parted: leave, or kick-with-reason so the part reason is
    /// visible account-wide.
    pub async fn on_irc_part(
        &self,
        server_id: &str,
        channel: &str,
        nick: &str,
        reason: Option<&str>,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        if self.is_bridge_nick(server, nick).await {
            return Ok(());
        }
        self.note_member(server_id, channel, nick, false).await;

        let Some(puppet) = self.provisioner.cached_puppet(server, nick).await else {
            return Ok(());
        };
        let rooms = self.channel_rooms(server_id, channel).await?;
        for mapping in &rooms {
            if let Err(e) = self
                .remove_puppet_from_room(&puppet, &mapping.room_id, "Part", reason)
                .await
            {
                warn!(room = %mapping.room_id, nick = %nick, "part mirror failed: {e}");
            }
        }
        Ok(())
    }

    /// An IRC user quit the network: mirrored as a part from every channel
    /// the nick was present in.
    pub async fn on_irc_quit(
        &self,
        server_id: &str,
        nick: &str,
        reason: Option<&str>,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        if self.is_bridge_nick(server, nick).await {
            return Ok(());
        }

        let lowered = irc_lower(nick);
        let channels: Vec<String> = {
            let mut members = self.channel_members.lock().await;
            let mut channels = Vec::new();
            for ((srv, chan), nicks) in members.iter_mut() {
                if srv == server_id && nicks.remove(&lowered) {
                    channels.push(chan.clone());
                }
            }
            channels
        };

        let Some(puppet) = self.provisioner.cached_puppet(server, nick).await else {
            return Ok(());
        };

        let mut seen_rooms = HashSet::new();
        for channel in &channels {
            for mapping in self.channel_rooms(server_id, channel).await? {
                if !seen_rooms.insert(mapping.room_id.clone()) {
                    continue;
                }
                if let Err(e) = self
                    .remove_puppet_from_room(&puppet, &mapping.room_id, "Quit", reason)
                    .await
                {
                    warn!(room = %mapping.room_id, nick = %nick, "quit mirror failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// A kick on IRC, mirrored with reason fidelity.
    pub async fn on_irc_kick(
        &self,
        server_id: &str,
        channel: &str,
        kickee: &str,
        kicker: &str,
        reason: &str,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        self.note_member(server_id, channel, kickee, false).await;

        let rooms = self.channel_rooms(server_id, channel).await?;
        if rooms.is_empty() {
            return Ok(());
        }

        if let Some(matrix_user) = self.pool.owner_of_nick(server_id, kickee).await {
            // A real user's virtual client was kicked: the bot removes the
            // user, naming the kicker.
            let reason_str = kick_reason(kicker, Some(reason));
            for mapping in &rooms {
                if let Err(e) = self
                    .matrix
                    .kick(self.bot(), &mapping.room_id, &matrix_user, &reason_str)
                    .await
                {
                    warn!(room = %mapping.room_id, user = %matrix_user, "kick mirror failed: {e}");
                }
            }
            return Ok(());
        }

        if let Some(kickee_puppet) = self.provisioner.cached_puppet(server, kickee).await {
            // An IRC user with a puppet was kicked: the kicker's puppet
            // performs the removal with the reason unmodified.
            let as_user = match self.provisioner.puppet_for(server, kicker).await {
                Ok(user) => user,
                Err(e) => {
                    debug!(kicker = %kicker, "no puppet for kicker, using bot: {e}");
                    self.bot().to_owned()
                }
            };
            for mapping in &rooms {
                if let Err(e) = self
                    .matrix
                    .kick(&as_user, &mapping.room_id, &kickee_puppet, reason)
                    .await
                {
                    warn!(room = %mapping.room_id, user = %kickee_puppet, "kick mirror failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// An asynchronous join error from IRC. Registration-required errors
    /// are authoritative rejections: the membership cannot be honored.
    pub async fn on_irc_join_error(
        &self,
        server_id: &str,
        channel: &str,
        nick: &str,
        code: &str,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        if !registration_required(code) {
            debug!(channel = %channel, nick = %nick, code = %code, "ignoring join error");
            return Ok(());
        }
        let Some(user_id) = self.pool.owner_of_nick(server_id, nick).await else {
            return Ok(());
        };
        info!(channel = %channel, user = %user_id, code = %code, "join rejected, kicking");
        self.kick_for_join_rejection(server, channel, &user_id, code)
            .await;
        Ok(())
    }

    /// A channel message on IRC: deliver into every mapped room.
    pub async fn on_irc_message(
        &self,
        server_id: &str,
        channel: &str,
        nick: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        if self.is_bridge_nick(server, nick).await {
            return Ok(());
        }
        self.note_member(server_id, channel, nick, true).await;

        let rooms = self.channel_rooms(server_id, channel).await?;
        if rooms.is_empty() {
            return Ok(());
        }
        let puppet = self.provisioner.puppet_for(server, nick).await?;
        for mapping in &rooms {
            if let Err(e) = self
                .send_as_puppet(&puppet, &mapping.room_id, text)
                .await
            {
                warn!(room = %mapping.room_id, nick = %nick, "message mirror failed: {e}");
            }
        }
        Ok(())
    }

    /// A private message to one of our virtual clients.
    pub async fn on_irc_pm(
        &self,
        server_id: &str,
        from_nick: &str,
        to_nick: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        let Some(target_user) = self.pool.owner_of_nick(server_id, to_nick).await else {
            debug!(to = %to_nick, "pm to unbridged nick dropped");
            return Ok(());
        };
        if !server.pm.enabled {
            debug!(server = %server_id, "pm bridging disabled, dropping");
            return Ok(());
        }
        // PMs can come from nicks we have never seen in a channel — verify
        // presence before provisioning.
        let puppet = self
            .provisioner
            .verified_puppet_for(server, &server.bot_nick, from_nick)
            .await?;
        self.pm
            .send_pm(server, from_nick, &puppet, &target_user, text)
            .await
    }

    // ── Connect-time reconciliation ──────────────────────────────

    /// Establish the bot connection for a server and, when the policy asks
    /// for it, reconcile full membership of every mapped room.
    pub async fn connect_server(&self, server_id: &str) -> Result<(), BridgeError> {
        let Some(server) = self.config.server(server_id) else {
            return Ok(());
        };
        self.pool.get_bot(server).await?;
        info!(server = %server_id, "bot connected");

        let lists = &server.membership_lists;
        if lists.enabled && lists.matrix_to_irc.initial {
            let mappings = self.store.get_mappings_for_server(server_id).await?;
            let syncs = mappings
                .iter()
                .map(|mapping| self.sync_room_membership(server, mapping));
            for (mapping, result) in
                mappings.iter().zip(futures::future::join_all(syncs).await)
            {
                if let Err(e) = result {
                    warn!(room = %mapping.room_id, "initial sync failed: {e}");
                }
            }
        }
        Ok(())
    }

    async fn sync_room_membership(
        &self,
        server: &ServerConfig,
        mapping: &RoomMapping,
    ) -> Result<(), BridgeError> {
        let state = self.matrix.room_state(&mapping.room_id).await?;
        for user_id in joined_members(&state) {
            if self.is_own_user(&user_id) || !server.authorises(&user_id) {
                continue;
            }
            if let Err(e) = self.mirror_join(server, &user_id, &mapping.channel).await {
                warn!(
                    room = %mapping.room_id,
                    user = %user_id,
                    "initial join mirror failed: {e}"
                );
            }
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Channel-kind mappings for a (server, channel).
    async fn channel_rooms(
        &self,
        server_id: &str,
        channel: &str,
    ) -> Result<Vec<RoomMapping>, BridgeError> {
        Ok(self
            .store
            .get_rooms_for_channel(server_id, channel)
            .await?
            .into_iter()
            .filter(|m| m.kind == MappingKind::Channel)
            .collect())
    }

    /// Whether a nick on IRC is the bot or one of our virtual clients.
    async fn is_bridge_nick(&self, server: &ServerConfig, nick: &str) -> bool {
        irc_lower(nick) == irc_lower(&server.bot_nick)
            || self.pool.owner_of_nick(&server.id, nick).await.is_some()
    }

    async fn note_member(&self, server_id: &str, channel: &str, nick: &str, present: bool) {
        let key = (server_id.to_owned(), irc_lower(channel));
        let mut members = self.channel_members.lock().await;
        let set = members.entry(key).or_default();
        if present {
            set.insert(irc_lower(nick));
        } else {
            set.remove(&irc_lower(nick));
        }
    }

    /// Join a room, falling back to invite-then-join when the room is
    /// invite-only.
    async fn join_room_as(&self, user_id: &str, room_id: &str) -> Result<(), BridgeError> {
        match self.matrix.join_room(user_id, room_id).await {
            Ok(()) => Ok(()),
            Err(MatrixError::Rejected(_)) => {
                self.matrix.invite(self.bot(), room_id, user_id).await?;
                self.matrix.join_room(user_id, room_id).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Leave, or kick-with-reason when a reason must survive the leave.
    async fn remove_puppet_from_room(
        &self,
        puppet: &str,
        room_id: &str,
        verb: &str,
        reason: Option<&str>,
    ) -> Result<(), BridgeError> {
        match reason {
            Some(r) if !r.is_empty() => {
                self.matrix
                    .kick(self.bot(), room_id, puppet, &format!("{verb}: {r}"))
                    .await?
            }
            _ => self.matrix.leave_room(puppet, room_id).await?,
        }
        Ok(())
    }

    async fn send_as_puppet(
        &self,
        puppet: &str,
        room_id: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        match self.matrix.send_message(puppet, room_id, text).await {
            Ok(()) => Ok(()),
            Err(MatrixError::Rejected(_)) => {
                // Not in the room yet — join and retry once.
                self.join_room_as(puppet, room_id).await?;
                self.matrix.send_message(puppet, room_id, text).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Reason string for a mirrored kick, naming the actor and carrying any
/// explicit reason verbatim.
fn kick_reason(actor: &str, reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!("Kicked by {actor}: {r}"),
        _ => format!("Kicked by {actor}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kick_reason_includes_actor_and_reason() {
        assert_eq!(
            kick_reason("@op:home.test", Some("spamming")),
            "Kicked by @op:home.test: spamming"
        );
        assert_eq!(kick_reason("@op:home.test", None), "Kicked by @op:home.test");
        assert_eq!(kick_reason("@op:home.test", Some("")), "Kicked by @op:home.test");
    }

    #[test]
    fn registration_required_codes() {
        assert!(registration_required("err_needreggednick"));
        assert!(registration_required("477"));
        assert!(!registration_required("err_bannedfromchan"));
    }
}
