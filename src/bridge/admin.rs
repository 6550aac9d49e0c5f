//! Administrative commands — a closed command set over the engine's public
//! operations.
//!
//! Textual parsing and help output belong to the control-channel glue; this
//! is the boundary it talks to. Each command resolves to a human-readable
//! response line for the admin room.

use std::sync::Arc;

use tracing::info;

use super::error::BridgeError;
use super::provisioner::IdentityProvisioner;
use crate::config::BridgeConfig;
use crate::irc::{ConnectionPool, IrcTransport, Owner, ReasonCode};
use crate::store::{DataStore, UserFeatures};

/// The closed set of administrative commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Change the requester's nick on one server.
    Nick { server: String, nick: String },
    /// Set the requester's server password; forces re-authentication.
    Password { server: String, pass: String },
    RemovePassword { server: String },
    /// Directory lookup for a nick.
    Whois { server: String, nick: String },
    /// List the requester's bridged connections and channels.
    ListConnections,
    /// Disconnect the requester from one server.
    QuitServer { server: String },
    /// Disconnect the requester everywhere.
    QuitAll,
    /// Toggle a per-user feature flag.
    Feature { name: String, enabled: bool },
}

pub struct AdminHandler {
    config: Arc<BridgeConfig>,
    store: Arc<dyn DataStore>,
    transport: Arc<dyn IrcTransport>,
    pool: Arc<ConnectionPool>,
    provisioner: Arc<IdentityProvisioner>,
}

impl AdminHandler {
    pub fn new(
        config: Arc<BridgeConfig>,
        store: Arc<dyn DataStore>,
        transport: Arc<dyn IrcTransport>,
        pool: Arc<ConnectionPool>,
        provisioner: Arc<IdentityProvisioner>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            pool,
            provisioner,
        }
    }

    /// Execute a command on behalf of `requester`.
    pub async fn handle(
        &self,
        requester: &str,
        command: AdminCommand,
    ) -> Result<String, BridgeError> {
        info!(user = %requester, ?command, "admin command");
        match command {
            AdminCommand::Nick { server, nick } => self.change_nick(requester, &server, &nick).await,
            AdminCommand::Password { server, pass } => {
                self.set_password(requester, &server, &pass).await
            }
            AdminCommand::RemovePassword { server } => {
                let server = self.server(&server)?;
                self.provisioner.clear_password(server, requester).await?;
                Ok(format!("Password removed for {}.", server.id))
            }
            AdminCommand::Whois { server, nick } => {
                let server = self.server(&server)?;
                match self
                    .transport
                    .whois(&server.id, &server.bot_nick, &nick)
                    .await
                    .map_err(BridgeError::Irc)?
                {
                    Some(info) => Ok(format!(
                        "{} is connected to {} ({})",
                        info.nick,
                        server.id,
                        info.user.as_deref().unwrap_or("no ident")
                    )),
                    None => Ok(format!("No such nick: {nick}")),
                }
            }
            AdminCommand::ListConnections => {
                let conns = self.pool.bridged_connections_for_user(requester).await;
                if conns.is_empty() {
                    return Ok("You have no bridged connections.".into());
                }
                let mut lines = Vec::new();
                for conn in conns {
                    let mut channels = conn.joined_channels().await;
                    channels.sort();
                    lines.push(format!(
                        "{} as {}: {}",
                        conn.server,
                        conn.nick().await,
                        if channels.is_empty() {
                            "(no channels)".into()
                        } else {
                            channels.join(" ")
                        }
                    ));
                }
                Ok(lines.join("\n"))
            }
            AdminCommand::QuitServer { server } => {
                let server = self.server(&server)?.clone();
                self.pool
                    .disconnect(
                        &server,
                        &Owner::Matrix(requester.to_owned()),
                        ReasonCode::Quit,
                        "Requested by user",
                        false,
                    )
                    .await;
                Ok(format!("Disconnected from {}.", server.id))
            }
            AdminCommand::QuitAll => {
                let count = self
                    .pool
                    .disconnect_all_for_user(&self.config.servers, requester, "Requested by user")
                    .await;
                Ok(format!("Disconnected from {count} server(s)."))
            }
            AdminCommand::Feature { name, enabled } => {
                let mut features: UserFeatures = self.store.get_user_features(requester).await?;
                features.flags.insert(name.clone(), enabled);
                self.store.store_user_features(requester, features).await?;
                Ok(format!(
                    "Feature {name} {}.",
                    if enabled { "enabled" } else { "disabled" }
                ))
            }
        }
    }

    async fn change_nick(
        &self,
        requester: &str,
        server_id: &str,
        nick: &str,
    ) -> Result<String, BridgeError> {
        let server = self.server(server_id)?;
        self.provisioner.set_nick(server, requester, nick).await?;

        // Apply immediately when a session is live; otherwise the persisted
        // nick takes effect on the next connection.
        if let Some(conn) = self.pool.bridged_connection(&server.id, requester).await {
            let _cmd = conn.cmd_lock.lock().await;
            let old = conn.nick().await;
            self.transport
                .change_nick(&server.id, &old, nick)
                .await
                .map_err(BridgeError::Irc)?;
            conn.set_nick(nick).await;
        }
        Ok(format!("Nick changed to {nick} on {}.", server.id))
    }

    async fn set_password(
        &self,
        requester: &str,
        server_id: &str,
        pass: &str,
    ) -> Result<String, BridgeError> {
        let server = self.server(server_id)?.clone();
        self.provisioner
            .set_password(&server, requester, pass)
            .await?;

        // Re-authentication happens through the pool's reconnect policy —
        // the distinguished reason marks this teardown as credential-driven.
        self.pool
            .disconnect(
                &server,
                &Owner::Matrix(requester.to_owned()),
                ReasonCode::AuthChanged,
                "Authentication details changed",
                true,
            )
            .await;
        Ok(format!(
            "Password stored for {}. Reconnecting with new credentials.",
            server.id
        ))
    }

    fn server(&self, id: &str) -> Result<&crate::config::ServerConfig, BridgeError> {
        self.config
            .server(id)
            .ok_or_else(|| BridgeError::Provisioning(format!("unknown server: {id}")))
    }
}
