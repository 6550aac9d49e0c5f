//! Virtual identity provisioning in both directions.
//!
//! IRC nick → puppet account: localpart is `{server_id}_{nick}`, registered
//! with the homeserver exactly once and cached. Messaging-network user →
//! IRC client configuration: loaded from the store or created with a
//! derived default nick, re-persisted whenever the desired nick changes so
//! future (re)connections pick it up.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::BridgeError;
use crate::config::ServerConfig;
use crate::irc::{irc_lower, IrcTransport};
use crate::matrix::MatrixClient;
use crate::store::{DataStore, IrcClientConfig};

pub struct IdentityProvisioner {
    matrix: Arc<dyn MatrixClient>,
    transport: Arc<dyn IrcTransport>,
    store: Arc<dyn DataStore>,
    /// (server id, lowercased nick) → puppet user ID.
    puppets: Mutex<HashMap<(String, String), String>>,
}

impl IdentityProvisioner {
    pub fn new(
        matrix: Arc<dyn MatrixClient>,
        transport: Arc<dyn IrcTransport>,
        store: Arc<dyn DataStore>,
    ) -> Self {
        Self {
            matrix,
            transport,
            store,
            puppets: Mutex::new(HashMap::new()),
        }
    }

    /// The cached puppet for a nick, if one was ever provisioned.
    pub async fn cached_puppet(&self, server: &ServerConfig, nick: &str) -> Option<String> {
        self.puppets
            .lock()
            .await
            .get(&(server.id.clone(), irc_lower(nick)))
            .cloned()
    }

    /// Puppet account for an IRC nick, registering it on first use.
    pub async fn puppet_for(
        &self,
        server: &ServerConfig,
        nick: &str,
    ) -> Result<String, BridgeError> {
        let key = (server.id.clone(), irc_lower(nick));
        if let Some(user_id) = self.puppets.lock().await.get(&key).cloned() {
            return Ok(user_id);
        }

        let localpart = server.puppet_localpart(nick);
        let user_id = self.matrix.register_user(&localpart).await?;
        info!(server = %server.id, nick = %nick, user = %user_id, "provisioned puppet");

        // A racing provision for the same nick resolves to the same
        // deterministic localpart, so last-write-wins is harmless.
        self.puppets.lock().await.insert(key, user_id.clone());
        Ok(user_id)
    }

    /// Like [`puppet_for`], but for triggers from unverified nicks (e.g. an
    /// inbound private message): confirms presence on IRC via WHOIS first
    /// and aborts when the nick is absent.
    ///
    /// [`puppet_for`]: Self::puppet_for
    pub async fn verified_puppet_for(
        &self,
        server: &ServerConfig,
        bot_nick: &str,
        nick: &str,
    ) -> Result<String, BridgeError> {
        if let Some(user_id) = self.cached_puppet(server, nick).await {
            return Ok(user_id);
        }

        let whois = self
            .transport
            .whois(&server.id, bot_nick, nick)
            .await
            .map_err(|e| BridgeError::Provisioning(format!("whois {nick} failed: {e}")))?;
        if whois.is_none() {
            return Err(BridgeError::Provisioning(format!(
                "no such nick on {}: {nick}",
                server.id
            )));
        }

        self.puppet_for(server, nick).await
    }

    /// IRC client configuration for a messaging-network user, creating the
    /// default on first use.
    pub async fn irc_config_for(
        &self,
        server: &ServerConfig,
        user_id: &str,
    ) -> Result<IrcClientConfig, BridgeError> {
        if let Some(config) = self.store.get_irc_config(user_id, &server.id).await? {
            return Ok(config);
        }

        let config = IrcClientConfig {
            user_id: user_id.into(),
            server: server.id.clone(),
            nick: server.default_irc_nick(user_id),
            username: None,
            password: None,
        };
        debug!(server = %server.id, user = %user_id, nick = %config.nick, "created irc config");
        self.store.store_irc_config(config.clone()).await?;
        Ok(config)
    }

    /// Persist a new desired nick for future (re)connections.
    pub async fn set_nick(
        &self,
        server: &ServerConfig,
        user_id: &str,
        nick: &str,
    ) -> Result<IrcClientConfig, BridgeError> {
        let mut config = self.irc_config_for(server, user_id).await?;
        config.nick = nick.to_owned();
        self.store.store_irc_config(config.clone()).await?;
        Ok(config)
    }

    /// Persist a server password for a user. The caller is responsible for
    /// forcing a reconnect so the credential takes effect.
    pub async fn set_password(
        &self,
        server: &ServerConfig,
        user_id: &str,
        pass: &str,
    ) -> Result<(), BridgeError> {
        // Make sure a config row exists to attach the password to.
        self.irc_config_for(server, user_id).await?;
        self.store.store_pass(user_id, &server.id, pass).await?;
        Ok(())
    }

    pub async fn clear_password(
        &self,
        server: &ServerConfig,
        user_id: &str,
    ) -> Result<(), BridgeError> {
        self.store.remove_pass(user_id, &server.id).await?;
        Ok(())
    }
}
