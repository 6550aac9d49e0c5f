//! Client trait for the messaging-network homeserver.
//!
//! The wire protocol is a collaborator: the engine only needs a command
//! sink it can act through as any of its virtual users. Every method takes
//! the acting user explicitly so one client instance serves the bot and
//! all puppets.

use async_trait::async_trait;
use serde_json::Value;

/// One state event, as read from or written to a room.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEvent {
    pub event_type: String,
    pub state_key: String,
    pub content: Value,
    /// Set on events read back from a room; ignored on writes.
    pub sender: Option<String>,
}

impl StateEvent {
    pub fn new(event_type: &str, state_key: &str, content: Value) -> Self {
        Self {
            event_type: event_type.into(),
            state_key: state_key.into(),
            content,
            sender: None,
        }
    }
}

/// Options for room creation.
#[derive(Debug, Clone, Default)]
pub struct RoomCreateOpts {
    pub name: Option<String>,
    /// "private" for everything the bridge creates.
    pub visibility: String,
    pub preset: Option<String>,
    /// Value of `m.federate` in the creation content.
    pub federate: bool,
    pub room_alias_name: Option<String>,
    pub invite: Vec<String>,
    pub initial_state: Vec<StateEvent>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MatrixError {
    /// The homeserver rejected the request (never retried automatically).
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Command sink towards the messaging network.
#[async_trait]
pub trait MatrixClient: Send + Sync {
    /// Register a new account; returns the full user ID. Registering an
    /// already-existing localpart returns the existing ID.
    async fn register_user(&self, localpart: &str) -> Result<String, MatrixError>;

    async fn create_room(&self, as_user: &str, opts: RoomCreateOpts)
        -> Result<String, MatrixError>;

    async fn invite(&self, as_user: &str, room_id: &str, target: &str)
        -> Result<(), MatrixError>;

    async fn join_room(&self, as_user: &str, room_id: &str) -> Result<(), MatrixError>;

    async fn leave_room(&self, as_user: &str, room_id: &str) -> Result<(), MatrixError>;

    async fn kick(
        &self,
        as_user: &str,
        room_id: &str,
        target: &str,
        reason: &str,
    ) -> Result<(), MatrixError>;

    async fn send_message(
        &self,
        as_user: &str,
        room_id: &str,
        body: &str,
    ) -> Result<(), MatrixError>;

    async fn send_state(
        &self,
        as_user: &str,
        room_id: &str,
        event: StateEvent,
    ) -> Result<(), MatrixError>;

    /// Full current state of a room, membership included.
    async fn room_state(&self, room_id: &str) -> Result<Vec<StateEvent>, MatrixError>;
}

/// User IDs currently joined, extracted from a room-state read.
pub fn joined_members(state: &[StateEvent]) -> Vec<String> {
    state
        .iter()
        .filter(|ev| {
            ev.event_type == "m.room.member"
                && ev.content.get("membership").and_then(Value::as_str) == Some("join")
        })
        .map(|ev| ev.state_key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joined_members_filters_membership() {
        let state = vec![
            StateEvent::new("m.room.member", "@a:x", json!({"membership": "join"})),
            StateEvent::new("m.room.member", "@b:x", json!({"membership": "leave"})),
            StateEvent::new("m.room.member", "@c:x", json!({"membership": "join"})),
            StateEvent::new("m.room.join_rules", "", json!({"join_rule": "public"})),
        ];
        assert_eq!(joined_members(&state), vec!["@a:x", "@c:x"]);
    }

    #[test]
    fn joined_members_empty_state() {
        assert!(joined_members(&[]).is_empty());
    }
}
