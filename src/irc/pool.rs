//! Connection pool — one bot connection per server plus per-user virtual
//! connections.
//!
//! Each connection is owned by exactly one logical actor. Establishment is
//! single-flighted per (server, owner) so racing triggers collapse into one
//! connect; the loser of the race observes the winner's connection. Channel
//! membership is tracked per connection and updated only on confirmation
//! from the transport, never optimistically.
//!
//! Reconnection (`disconnect` with `is_reconnecting`) is the bridge's only
//! automatic retry path: a background task re-establishes the session with
//! exponential backoff, reloading the owner's persisted identity so
//! credential changes take effect on the new session.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::irc_lower;
use super::transport::{IrcError, IrcTransport};
use crate::config::ServerConfig;
use crate::store::{DataStore, IrcClientConfig};

/// Consecutive reconnect attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// The logical actor owning a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The bridge's own persistent connection, one per server.
    Bot,
    /// A virtual client acting for one messaging-network user.
    Matrix(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Connecting,
    Connected,
    Dead,
}

/// Why a connection was torn down. `AuthChanged` is the distinguished
/// reason used to force re-authentication after a credential change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Quit,
    AuthChanged,
    Error,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::AuthChanged => "auth_changed",
            Self::Error => "error",
        }
    }
}

#[derive(Debug)]
struct ConnState {
    liveness: Liveness,
    nick: String,
    joined: HashSet<String>,
}

/// One session to a server. Mutated only by the pool and the sync engine.
#[derive(Debug)]
pub struct Connection {
    pub server: String,
    pub owner: Owner,
    state: Mutex<ConnState>,
    /// Held while issuing a command so commands on one connection apply in
    /// the order the engine issues them.
    pub cmd_lock: Mutex<()>,
}

impl Connection {
    fn new(server: &str, owner: Owner, nick: String) -> Self {
        Self {
            server: server.into(),
            owner,
            state: Mutex::new(ConnState {
                liveness: Liveness::Connecting,
                nick,
                joined: HashSet::new(),
            }),
            cmd_lock: Mutex::new(()),
        }
    }

    pub async fn nick(&self) -> String {
        self.state.lock().await.nick.clone()
    }

    pub async fn liveness(&self) -> Liveness {
        self.state.lock().await.liveness
    }

    pub async fn is_joined(&self, channel: &str) -> bool {
        self.state.lock().await.joined.contains(&irc_lower(channel))
    }

    pub async fn joined_channels(&self) -> Vec<String> {
        self.state.lock().await.joined.iter().cloned().collect()
    }

    /// Record a confirmed join.
    pub async fn confirm_join(&self, channel: &str) {
        self.state.lock().await.joined.insert(irc_lower(channel));
    }

    /// Record a confirmed part.
    pub async fn confirm_part(&self, channel: &str) {
        self.state.lock().await.joined.remove(&irc_lower(channel));
    }

    pub async fn set_nick(&self, nick: &str) {
        self.state.lock().await.nick = nick.to_owned();
    }

    async fn mark(&self, liveness: Liveness) {
        self.state.lock().await.liveness = liveness;
    }
}

/// Owns every connection the bridge holds.
pub struct ConnectionPool {
    transport: Arc<dyn IrcTransport>,
    store: Arc<dyn DataStore>,
    conns: Mutex<HashMap<(String, Owner), Arc<Connection>>>,
    /// Single-flight gates for connection establishment.
    gates: Mutex<HashMap<(String, Owner), Arc<Mutex<()>>>>,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn IrcTransport>, store: Arc<dyn DataStore>) -> Self {
        Self {
            transport,
            store,
            conns: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// The bot connection for a server, establishing it if needed.
    pub async fn get_bot(&self, server: &ServerConfig) -> Result<Arc<Connection>, IrcError> {
        self.get_or_connect(server, Owner::Bot, server.bot_nick.clone(), None, None)
            .await
    }

    /// A user's virtual connection, establishing it if needed.
    pub async fn get_user(
        &self,
        server: &ServerConfig,
        config: &IrcClientConfig,
    ) -> Result<Arc<Connection>, IrcError> {
        self.get_or_connect(
            server,
            Owner::Matrix(config.user_id.clone()),
            config.nick.clone(),
            config.username.clone(),
            config.password.clone(),
        )
        .await
    }

    async fn get_or_connect(
        &self,
        server: &ServerConfig,
        owner: Owner,
        nick: String,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Arc<Connection>, IrcError> {
        let key = (server.id.clone(), owner.clone());

        if let Some(conn) = self.live(&key).await {
            return Ok(conn);
        }

        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(key.clone()).or_default())
        };
        let _establishing = gate.lock().await;

        // A racing caller may have connected while we waited on the gate.
        if let Some(conn) = self.live(&key).await {
            return Ok(conn);
        }

        let conn = Arc::new(Connection::new(&server.id, owner, nick.clone()));
        self.conns.lock().await.insert(key.clone(), Arc::clone(&conn));

        match self
            .transport
            .connect(&server.id, &nick, username.as_deref(), password.as_deref())
            .await
        {
            Ok(()) => {
                conn.mark(Liveness::Connected).await;
                info!(server = %server.id, nick = %nick, "pool: connected");
                Ok(conn)
            }
            Err(e) => {
                self.conns.lock().await.remove(&key);
                warn!(server = %server.id, nick = %nick, "pool: connect failed: {e}");
                Err(e)
            }
        }
    }

    async fn live(&self, key: &(String, Owner)) -> Option<Arc<Connection>> {
        let conn = self.conns.lock().await.get(key).cloned()?;
        if conn.liveness().await == Liveness::Connected {
            Some(conn)
        } else {
            None
        }
    }

    /// The live connection for a user on a server, if any. Never connects.
    pub async fn bridged_connection(
        &self,
        server_id: &str,
        user_id: &str,
    ) -> Option<Arc<Connection>> {
        self.live(&(server_id.to_owned(), Owner::Matrix(user_id.to_owned())))
            .await
    }

    /// All live connections held for one user, across servers.
    pub async fn bridged_connections_for_user(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let conns: Vec<Arc<Connection>> = self.conns.lock().await.values().cloned().collect();
        let mut out = Vec::new();
        for conn in conns {
            if conn.owner == Owner::Matrix(user_id.to_owned())
                && conn.liveness().await == Liveness::Connected
            {
                out.push(conn);
            }
        }
        out
    }

    /// The messaging-network user whose virtual connection uses `nick`,
    /// if that nick belongs to the bridge.
    pub async fn owner_of_nick(&self, server_id: &str, nick: &str) -> Option<String> {
        let nick = irc_lower(nick);
        let conns: Vec<Arc<Connection>> = self.conns.lock().await.values().cloned().collect();
        for conn in conns {
            if conn.server != server_id {
                continue;
            }
            if let Owner::Matrix(user_id) = &conn.owner {
                if irc_lower(&conn.nick().await) == nick {
                    return Some(user_id.clone());
                }
            }
        }
        None
    }

    /// Graceful teardown. With `is_reconnecting`, a background task
    /// re-establishes the session under the pool's backoff policy.
    pub async fn disconnect(
        self: &Arc<Self>,
        server: &ServerConfig,
        owner: &Owner,
        reason: ReasonCode,
        message: &str,
        is_reconnecting: bool,
    ) {
        let key = (server.id.clone(), owner.clone());
        let Some(conn) = self.conns.lock().await.remove(&key) else {
            return;
        };
        let nick = conn.nick().await;
        conn.mark(Liveness::Dead).await;
        if let Err(e) = self.transport.quit(&server.id, &nick, message).await {
            warn!(server = %server.id, nick = %nick, "pool: quit failed: {e}");
        }
        info!(
            server = %server.id,
            nick = %nick,
            reason = reason.as_str(),
            reconnecting = is_reconnecting,
            "pool: disconnected"
        );
        if is_reconnecting {
            self.spawn_reconnect(server.clone(), owner.clone());
        }
    }

    /// Disconnect every connection held for one user. Returns the count.
    pub async fn disconnect_all_for_user(
        self: &Arc<Self>,
        servers: &[ServerConfig],
        user_id: &str,
        message: &str,
    ) -> usize {
        let owner = Owner::Matrix(user_id.to_owned());
        let mut count = 0;
        for server in servers {
            let key = (server.id.clone(), owner.clone());
            let held = self.conns.lock().await.contains_key(&key);
            if held {
                self.disconnect(server, &owner, ReasonCode::Quit, message, false)
                    .await;
                count += 1;
            }
        }
        count
    }

    fn spawn_reconnect(self: &Arc<Self>, server: ServerConfig, owner: Owner) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
                tokio::time::sleep(backoff_delay(attempt)).await;

                // Reload the owner's identity so credential changes apply.
                let (nick, username, password) = match &owner {
                    Owner::Bot => (server.bot_nick.clone(), None, None),
                    Owner::Matrix(user_id) => {
                        match pool.store.get_irc_config(user_id, &server.id).await {
                            Ok(Some(c)) => (c.nick, c.username, c.password),
                            Ok(None) => {
                                warn!(
                                    server = %server.id,
                                    user = %user_id,
                                    "pool: no identity to reconnect with"
                                );
                                return;
                            }
                            Err(e) => {
                                warn!(server = %server.id, "pool: identity load failed: {e}");
                                continue;
                            }
                        }
                    }
                };

                match pool
                    .get_or_connect(&server, owner.clone(), nick, username, password)
                    .await
                {
                    Ok(_) => {
                        info!(server = %server.id, attempt, "pool: reconnected");
                        return;
                    }
                    Err(e) => {
                        warn!(server = %server.id, attempt, "pool: reconnect failed: {e}");
                    }
                }
            }
            warn!(
                server = %server.id,
                attempts = MAX_RECONNECT_ATTEMPTS,
                "pool: giving up reconnecting"
            );
        });
    }
}

/// Exponential backoff, capped at 60 seconds.
fn backoff_secs(attempt: u32) -> u64 {
    2u64.pow(attempt.min(6)).min(60)
}

/// Backoff with ±25% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = backoff_secs(attempt) * 1000;
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(base_ms * 3 / 4 + jitter)
}
