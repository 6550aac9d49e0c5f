//! Transport trait for IRC networks.
//!
//! The raw wire client (framing, registration, keepalive) is a collaborator;
//! the engine sees it as a command sink keyed by (server, nick) — the
//! identity of the connection acting. Commands resolve once the network has
//! confirmed them, so callers can update membership bookkeeping
//! non-optimistically. The collaborator owns its own retry policy; a
//! `ConnectFailed` means that policy is exhausted.

use async_trait::async_trait;

/// Directory-lookup (WHOIS) result for a nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoisInfo {
    pub nick: String,
    pub user: Option<String>,
    pub server: Option<String>,
}

/// Currently-known channel modes relevant to room publicity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelModeHints {
    /// +s — hidden from listings.
    pub secret: bool,
    /// +i — invite only.
    pub invite_only: bool,
    /// +k — a key is set.
    pub key_set: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IrcError {
    #[error("connect to {server} failed after {attempts} attempts")]
    ConnectFailed { server: String, attempts: u32 },

    #[error("not connected to {server} as {nick}")]
    NotConnected { server: String, nick: String },

    #[error("join {channel} rejected ({code})")]
    JoinRejected { channel: String, code: String },

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("connection lost")]
    ConnectionLost,
}

/// Command sink towards one or more IRC networks.
///
/// `server` is the [`crate::config::ServerConfig`] id; `nick` identifies
/// which connection acts.
#[async_trait]
pub trait IrcTransport: Send + Sync {
    /// Establish a session. Resolves once registration completes.
    async fn connect(
        &self,
        server: &str,
        nick: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), IrcError>;

    async fn join(
        &self,
        server: &str,
        nick: &str,
        channel: &str,
        key: Option<&str>,
    ) -> Result<(), IrcError>;

    async fn part(
        &self,
        server: &str,
        nick: &str,
        channel: &str,
        reason: Option<&str>,
    ) -> Result<(), IrcError>;

    async fn kick(
        &self,
        server: &str,
        nick: &str,
        channel: &str,
        target: &str,
        reason: &str,
    ) -> Result<(), IrcError>;

    async fn privmsg(
        &self,
        server: &str,
        nick: &str,
        target: &str,
        text: &str,
    ) -> Result<(), IrcError>;

    /// Directory lookup. `Ok(None)` means the nick is not present.
    async fn whois(
        &self,
        server: &str,
        nick: &str,
        target: &str,
    ) -> Result<Option<WhoisInfo>, IrcError>;

    /// Channel modes as currently known, `None` when the channel is unknown.
    async fn channel_modes(
        &self,
        server: &str,
        channel: &str,
    ) -> Result<Option<ChannelModeHints>, IrcError>;

    async fn change_nick(&self, server: &str, old: &str, new: &str) -> Result<(), IrcError>;

    /// Graceful QUIT and teardown.
    async fn quit(&self, server: &str, nick: &str, message: &str) -> Result<(), IrcError>;
}
