//! Bridge configuration — per-server policy flags and identity derivation.
//!
//! Loaded once at startup from a JSON file and treated as immutable
//! afterwards. Everything the engine consults about a server (sync policy,
//! join rule, federation flags, the join-authorization predicate) lives on
//! [`ServerConfig`] so handlers never reach back into global state.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::matrix::localpart;

/// Membership-list sync policy for one propagation direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipSyncPolicy {
    /// Reconcile full membership when the bot connection is established.
    #[serde(default)]
    pub initial: bool,
    /// Mirror membership changes as events arrive.
    #[serde(default)]
    pub incremental: bool,
}

/// Membership-list sync configuration, independent per direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipListsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub irc_to_matrix: MembershipSyncPolicy,
    #[serde(default)]
    pub matrix_to_irc: MembershipSyncPolicy,
}

/// Private-message bridging policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PmConfig {
    /// When false, inbound 1:1 invites are joined, announced as unsupported,
    /// and left again.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Value of `m.federate` on created PM rooms.
    #[serde(default = "default_true")]
    pub federate: bool,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            federate: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Join rule applied to rooms created for channels on this server.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinRule {
    #[default]
    Public,
    Invite,
}

impl JoinRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Invite => "invite",
        }
    }
}

/// One IRC network the bridge connects to. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Short identifier, also the puppet localpart prefix (e.g. "irc.example").
    pub id: String,
    /// Network address for the transport collaborator ("host:port").
    pub addr: String,
    /// Nick of the bridge's own persistent connection.
    #[serde(default = "default_bot_nick")]
    pub bot_nick: String,
    /// Join rule for rooms created for this server's channels.
    #[serde(default)]
    pub join_rule: JoinRule,
    /// Value of `m.federate` on created channel rooms.
    #[serde(default = "default_true")]
    pub federate: bool,
    #[serde(default)]
    pub membership_lists: MembershipListsConfig,
    #[serde(default)]
    pub pm: PmConfig,
    /// External group linked from created rooms, when set.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Publish a bridge-info state block into created rooms.
    #[serde(default)]
    pub bridge_info_state: bool,
    /// Users never mirrored onto this server (the join-authorization
    /// predicate). Matched against full user IDs.
    #[serde(default)]
    pub excluded_users: Vec<String>,
}

fn default_bot_nick() -> String {
    "causeway-bot".into()
}

impl ServerConfig {
    /// Whether membership for this user may be mirrored onto IRC.
    pub fn authorises(&self, user_id: &str) -> bool {
        !self.excluded_users.iter().any(|u| u == user_id)
    }

    /// Deterministic puppet localpart for an IRC nick on this server.
    pub fn puppet_localpart(&self, nick: &str) -> String {
        format!("{}_{}", self.id, nick.to_ascii_lowercase())
    }

    /// Whether a user ID is a puppet this server owns, and if so which nick.
    pub fn nick_of_puppet<'a>(&self, user_id: &'a str) -> Option<&'a str> {
        let lp = localpart(user_id)?;
        lp.strip_prefix(&self.id)?.strip_prefix('_')
    }

    /// Default nick for a messaging-network user's virtual IRC client.
    pub fn default_irc_nick(&self, user_id: &str) -> String {
        let lp = localpart(user_id).unwrap_or(user_id);
        let safe: String = lp
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '[' | ']'))
            .collect();
        format!("M-{safe}")
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Domain puppet user IDs are minted under.
    pub homeserver_domain: String,
    /// The bridge's own messaging-network user.
    pub bot_user_id: String,
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate server id: {0}")]
    DuplicateServer(String),
}

impl BridgeConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse from a JSON string and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        for server in &config.servers {
            if !seen.insert(server.id.clone()) {
                return Err(ConfigError::DuplicateServer(server.id.clone()));
            }
        }
        Ok(config)
    }

    pub fn server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// The server owning a puppet user ID, with the puppet's nick.
    pub fn puppet_owner<'a, 'b>(&'a self, user_id: &'b str) -> Option<(&'a ServerConfig, &'b str)> {
        self.servers
            .iter()
            .find_map(|s| s.nick_of_puppet(user_id).map(|nick| (s, nick)))
    }
}
