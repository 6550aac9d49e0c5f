//! Causeway — membership and identity synchronization between a federated
//! messaging network and IRC.
//!
//! The engine consumes typed membership/message events from both protocols
//! and mirrors the minimal set of actions to the other side through
//! virtualized identities. Wire clients, storage, and the homeserver are
//! collaborators behind traits ([`irc::IrcTransport`], [`store::DataStore`],
//! [`matrix::MatrixClient`]); construct a [`bridge::MembershipSyncEngine`]
//! with your implementations and feed it through
//! [`bridge::spawn_dispatcher`].

pub mod bridge;
pub mod config;
pub mod irc;
pub mod matrix;
pub mod store;
