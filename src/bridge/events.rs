//! Typed inbound events and the dispatch loop.
//!
//! Protocol collaborators push variants onto one unbounded channel; the
//! dispatcher spawns an independent task per event so a slow or failing
//! handler never blocks unrelated events. Handler failures are caught at
//! this boundary, logged with context, and dropped — the engine's own
//! no-op/error taxonomy decides what is worth surfacing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::engine::MembershipSyncEngine;

/// Events observed on an IRC network.
#[derive(Debug, Clone)]
pub enum IrcEvent {
    Join {
        server: String,
        channel: String,
        nick: String,
    },
    Part {
        server: String,
        channel: String,
        nick: String,
        reason: Option<String>,
    },
    Quit {
        server: String,
        nick: String,
        reason: Option<String>,
    },
    Kick {
        server: String,
        channel: String,
        kickee: String,
        kicker: String,
        reason: String,
    },
    Message {
        server: String,
        channel: String,
        nick: String,
        text: String,
    },
    /// A PRIVMSG directly to one of our virtual clients.
    Pm {
        server: String,
        from_nick: String,
        to_nick: String,
        text: String,
    },
    /// An asynchronous error numeric in response to a join.
    JoinError {
        server: String,
        channel: String,
        nick: String,
        code: String,
    },
}

/// Events observed on the messaging network.
#[derive(Debug, Clone)]
pub enum MatrixEvent {
    Join {
        room: String,
        user: String,
    },
    Invite {
        room: String,
        target: String,
        inviter: String,
        is_direct: bool,
    },
    /// Covers both voluntary leaves (`actor == user`) and kicks.
    Leave {
        room: String,
        user: String,
        actor: String,
        reason: Option<String>,
    },
    Message {
        room: String,
        user: String,
        text: String,
    },
    /// The room was replaced; bridge state must migrate.
    Tombstone {
        room: String,
        replacement: String,
    },
}

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Irc(IrcEvent),
    Matrix(MatrixEvent),
}

/// Spawn the dispatch loop. Returns the loop's join handle; it exits when
/// every sender is dropped.
pub fn spawn_dispatcher(
    engine: Arc<MembershipSyncEngine>,
    mut rx: mpsc::UnboundedReceiver<BridgeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                if let Err(e) = dispatch(&engine, &event).await {
                    warn!(?event, "event handler failed: {e}");
                }
            });
        }
    })
}

async fn dispatch(
    engine: &MembershipSyncEngine,
    event: &BridgeEvent,
) -> Result<(), super::error::BridgeError> {
    match event {
        BridgeEvent::Irc(ev) => match ev {
            IrcEvent::Join {
                server,
                channel,
                nick,
            } => engine.on_irc_join(server, channel, nick).await,
            IrcEvent::Part {
                server,
                channel,
                nick,
                reason,
            } => {
                engine
                    .on_irc_part(server, channel, nick, reason.as_deref())
                    .await
            }
            IrcEvent::Quit {
                server,
                nick,
                reason,
            } => engine.on_irc_quit(server, nick, reason.as_deref()).await,
            IrcEvent::Kick {
                server,
                channel,
                kickee,
                kicker,
                reason,
            } => {
                engine
                    .on_irc_kick(server, channel, kickee, kicker, reason)
                    .await
            }
            IrcEvent::Message {
                server,
                channel,
                nick,
                text,
            } => engine.on_irc_message(server, channel, nick, text).await,
            IrcEvent::Pm {
                server,
                from_nick,
                to_nick,
                text,
            } => engine.on_irc_pm(server, from_nick, to_nick, text).await,
            IrcEvent::JoinError {
                server,
                channel,
                nick,
                code,
            } => {
                engine
                    .on_irc_join_error(server, channel, nick, code)
                    .await
            }
        },
        BridgeEvent::Matrix(ev) => match ev {
            MatrixEvent::Join { room, user } => engine.on_matrix_join(room, user).await,
            MatrixEvent::Invite {
                room,
                target,
                inviter,
                is_direct,
            } => {
                engine
                    .on_matrix_invite(room, target, inviter, *is_direct)
                    .await
            }
            MatrixEvent::Leave {
                room,
                user,
                actor,
                reason,
            } => {
                engine
                    .on_matrix_leave(room, user, actor, reason.as_deref())
                    .await
            }
            MatrixEvent::Message { room, user, text } => {
                engine.on_matrix_message(room, user, text).await
            }
            MatrixEvent::Tombstone { room, replacement } => {
                engine.on_room_upgrade(room, replacement).await
            }
        },
    }
}
