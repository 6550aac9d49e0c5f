//! Shared test harness: recording fakes for both protocol collaborators and
//! a fully wired engine over the in-memory store.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use causeway::bridge::{
    IdentityProvisioner, MembershipSyncEngine, PmCoordinator, RoomLifecycle,
};
use causeway::config::BridgeConfig;
use causeway::irc::{
    ChannelModeHints, ConnectionPool, IrcError, IrcTransport, WhoisInfo,
};
use causeway::matrix::{MatrixClient, MatrixError, RoomCreateOpts, StateEvent};
use causeway::store::{DataStore, MappingKind, MappingOrigin, MemoryStore, RoomMapping};

/// Every IRC command the engine issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcCall {
    Connect {
        server: String,
        nick: String,
    },
    Join {
        server: String,
        nick: String,
        channel: String,
    },
    Part {
        server: String,
        nick: String,
        channel: String,
        reason: Option<String>,
    },
    Kick {
        server: String,
        nick: String,
        channel: String,
        target: String,
        reason: String,
    },
    Privmsg {
        server: String,
        nick: String,
        target: String,
        text: String,
    },
    Whois {
        server: String,
        target: String,
    },
    ChangeNick {
        server: String,
        old: String,
        new: String,
    },
    Quit {
        server: String,
        nick: String,
    },
}

/// IRC command sink that records everything and succeeds unless told not to.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<IrcCall>>,
    /// channel → error code returned for joins of that channel.
    join_errors: Mutex<HashMap<String, String>>,
    /// Lowercased nicks that exist for WHOIS purposes.
    known_nicks: Mutex<HashSet<String>>,
    /// (server, channel) → modes reported after tracking.
    modes: Mutex<HashMap<(String, String), ChannelModeHints>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<IrcCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn joins(&self) -> Vec<IrcCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, IrcCall::Join { .. }))
            .collect()
    }

    pub fn kicks(&self) -> Vec<IrcCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, IrcCall::Kick { .. }))
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, IrcCall::Connect { .. }))
            .count()
    }

    pub fn fail_joins_of(&self, channel: &str, code: &str) {
        self.join_errors
            .lock()
            .unwrap()
            .insert(channel.to_owned(), code.to_owned());
    }

    pub fn add_known_nick(&self, nick: &str) {
        self.known_nicks
            .lock()
            .unwrap()
            .insert(nick.to_ascii_lowercase());
    }

    pub fn set_modes(&self, server: &str, channel: &str, modes: ChannelModeHints) {
        self.modes
            .lock()
            .unwrap()
            .insert((server.to_owned(), channel.to_owned()), modes);
    }

    fn record(&self, call: IrcCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IrcTransport for RecordingTransport {
    async fn connect(
        &self,
        server: &str,
        nick: &str,
        _username: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), IrcError> {
        self.record(IrcCall::Connect {
            server: server.into(),
            nick: nick.into(),
        });
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn join(
        &self,
        server: &str,
        nick: &str,
        channel: &str,
        _key: Option<&str>,
    ) -> Result<(), IrcError> {
        if let Some(code) = self.join_errors.lock().unwrap().get(channel).cloned() {
            return Err(IrcError::JoinRejected {
                channel: channel.into(),
                code,
            });
        }
        self.record(IrcCall::Join {
            server: server.into(),
            nick: nick.into(),
            channel: channel.into(),
        });
        Ok(())
    }

    async fn part(
        &self,
        server: &str,
        nick: &str,
        channel: &str,
        reason: Option<&str>,
    ) -> Result<(), IrcError> {
        self.record(IrcCall::Part {
            server: server.into(),
            nick: nick.into(),
            channel: channel.into(),
            reason: reason.map(str::to_owned),
        });
        Ok(())
    }

    async fn kick(
        &self,
        server: &str,
        nick: &str,
        channel: &str,
        target: &str,
        reason: &str,
    ) -> Result<(), IrcError> {
        self.record(IrcCall::Kick {
            server: server.into(),
            nick: nick.into(),
            channel: channel.into(),
            target: target.into(),
            reason: reason.into(),
        });
        Ok(())
    }

    async fn privmsg(
        &self,
        server: &str,
        nick: &str,
        target: &str,
        text: &str,
    ) -> Result<(), IrcError> {
        self.record(IrcCall::Privmsg {
            server: server.into(),
            nick: nick.into(),
            target: target.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn whois(
        &self,
        server: &str,
        _nick: &str,
        target: &str,
    ) -> Result<Option<WhoisInfo>, IrcError> {
        self.record(IrcCall::Whois {
            server: server.into(),
            target: target.into(),
        });
        let known = self
            .known_nicks
            .lock()
            .unwrap()
            .contains(&target.to_ascii_lowercase());
        Ok(known.then(|| WhoisInfo {
            nick: target.into(),
            user: Some(target.into()),
            server: Some(server.into()),
        }))
    }

    async fn channel_modes(
        &self,
        server: &str,
        channel: &str,
    ) -> Result<Option<ChannelModeHints>, IrcError> {
        Ok(self
            .modes
            .lock()
            .unwrap()
            .get(&(server.to_owned(), channel.to_owned()))
            .copied())
    }

    async fn change_nick(&self, server: &str, old: &str, new: &str) -> Result<(), IrcError> {
        self.record(IrcCall::ChangeNick {
            server: server.into(),
            old: old.into(),
            new: new.into(),
        });
        Ok(())
    }

    async fn quit(&self, server: &str, nick: &str, _message: &str) -> Result<(), IrcError> {
        self.record(IrcCall::Quit {
            server: server.into(),
            nick: nick.into(),
        });
        Ok(())
    }
}

/// Every homeserver request the engine issued.
#[derive(Debug, Clone)]
pub enum MatrixCall {
    Register {
        localpart: String,
    },
    CreateRoom {
        as_user: String,
        opts: RoomCreateOpts,
        room_id: String,
    },
    Invite {
        as_user: String,
        room: String,
        target: String,
    },
    Join {
        as_user: String,
        room: String,
    },
    Leave {
        as_user: String,
        room: String,
    },
    Kick {
        as_user: String,
        room: String,
        target: String,
        reason: String,
    },
    Send {
        as_user: String,
        room: String,
        body: String,
    },
    SendState {
        as_user: String,
        room: String,
        event_type: String,
    },
}

/// Homeserver client that records everything and mints sequential room IDs.
#[derive(Default)]
pub struct RecordingMatrix {
    calls: Mutex<Vec<MatrixCall>>,
    room_seq: AtomicUsize,
    /// room → canned state returned by `room_state`.
    state: Mutex<HashMap<String, Vec<StateEvent>>>,
    /// Rooms that reject direct joins until the joiner was invited.
    invite_only: Mutex<HashSet<String>>,
    invited: Mutex<HashSet<(String, String)>>,
}

impl RecordingMatrix {
    pub fn calls(&self) -> Vec<MatrixCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_rooms(&self) -> Vec<(String, RoomCreateOpts)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MatrixCall::CreateRoom { room_id, opts, .. } => Some((room_id, opts)),
                _ => None,
            })
            .collect()
    }

    pub fn kicks(&self) -> Vec<MatrixCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MatrixCall::Kick { .. }))
            .collect()
    }

    pub fn sends_to(&self, room: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MatrixCall::Send { room: r, body, .. } if r == room => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn set_room_state(&self, room: &str, state: Vec<StateEvent>) {
        self.state.lock().unwrap().insert(room.to_owned(), state);
    }

    pub fn make_invite_only(&self, room: &str) {
        self.invite_only.lock().unwrap().insert(room.to_owned());
    }

    fn record(&self, call: MatrixCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MatrixClient for RecordingMatrix {
    async fn register_user(&self, localpart: &str) -> Result<String, MatrixError> {
        self.record(MatrixCall::Register {
            localpart: localpart.into(),
        });
        Ok(format!("@{localpart}:home.test"))
    }

    async fn create_room(
        &self,
        as_user: &str,
        opts: RoomCreateOpts,
    ) -> Result<String, MatrixError> {
        // Yield so racing first-contact callers interleave with creation.
        tokio::task::yield_now().await;
        let n = self.room_seq.fetch_add(1, Ordering::SeqCst);
        let room_id = format!("!created-{n}:home.test");
        self.record(MatrixCall::CreateRoom {
            as_user: as_user.into(),
            opts,
            room_id: room_id.clone(),
        });
        Ok(room_id)
    }

    async fn invite(
        &self,
        as_user: &str,
        room_id: &str,
        target: &str,
    ) -> Result<(), MatrixError> {
        self.record(MatrixCall::Invite {
            as_user: as_user.into(),
            room: room_id.into(),
            target: target.into(),
        });
        self.invited
            .lock()
            .unwrap()
            .insert((room_id.to_owned(), target.to_owned()));
        Ok(())
    }

    async fn join_room(&self, as_user: &str, room_id: &str) -> Result<(), MatrixError> {
        let gated = self.invite_only.lock().unwrap().contains(room_id);
        if gated
            && !self
                .invited
                .lock()
                .unwrap()
                .contains(&(room_id.to_owned(), as_user.to_owned()))
        {
            return Err(MatrixError::Rejected("join rejected: invite only".into()));
        }
        self.record(MatrixCall::Join {
            as_user: as_user.into(),
            room: room_id.into(),
        });
        Ok(())
    }

    async fn leave_room(&self, as_user: &str, room_id: &str) -> Result<(), MatrixError> {
        self.record(MatrixCall::Leave {
            as_user: as_user.into(),
            room: room_id.into(),
        });
        Ok(())
    }

    async fn kick(
        &self,
        as_user: &str,
        room_id: &str,
        target: &str,
        reason: &str,
    ) -> Result<(), MatrixError> {
        self.record(MatrixCall::Kick {
            as_user: as_user.into(),
            room: room_id.into(),
            target: target.into(),
            reason: reason.into(),
        });
        Ok(())
    }

    async fn send_message(
        &self,
        as_user: &str,
        room_id: &str,
        body: &str,
    ) -> Result<(), MatrixError> {
        self.record(MatrixCall::Send {
            as_user: as_user.into(),
            room: room_id.into(),
            body: body.into(),
        });
        Ok(())
    }

    async fn send_state(
        &self,
        as_user: &str,
        room_id: &str,
        event: StateEvent,
    ) -> Result<(), MatrixError> {
        self.record(MatrixCall::SendState {
            as_user: as_user.into(),
            room: room_id.into(),
            event_type: event.event_type,
        });
        Ok(())
    }

    async fn room_state(&self, room_id: &str) -> Result<Vec<StateEvent>, MatrixError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub const SERVER: &str = "irc.example";
pub const BOT: &str = "@causeway:home.test";

/// A fully wired engine over recording fakes.
pub struct TestEnv {
    pub config: Arc<BridgeConfig>,
    pub store: Arc<MemoryStore>,
    pub matrix: Arc<RecordingMatrix>,
    pub transport: Arc<RecordingTransport>,
    pub pool: Arc<ConnectionPool>,
    pub provisioner: Arc<IdentityProvisioner>,
    pub engine: Arc<MembershipSyncEngine>,
}

pub fn env() -> TestEnv {
    env_with(default_config_json())
}

pub fn env_with(config_json: &str) -> TestEnv {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let config = Arc::new(BridgeConfig::from_json(config_json).unwrap());
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn DataStore> = store.clone();
    let matrix = Arc::new(RecordingMatrix::default());
    let matrix_dyn: Arc<dyn MatrixClient> = matrix.clone();
    let transport = Arc::new(RecordingTransport::default());
    let transport_dyn: Arc<dyn IrcTransport> = transport.clone();

    let pool = Arc::new(ConnectionPool::new(
        Arc::clone(&transport_dyn),
        Arc::clone(&store_dyn),
    ));
    let provisioner = Arc::new(IdentityProvisioner::new(
        Arc::clone(&matrix_dyn),
        Arc::clone(&transport_dyn),
        Arc::clone(&store_dyn),
    ));
    let pm = Arc::new(PmCoordinator::new(
        Arc::clone(&matrix_dyn),
        Arc::clone(&store_dyn),
    ));
    let lifecycle = Arc::new(RoomLifecycle::new(
        Arc::clone(&matrix_dyn),
        Arc::clone(&transport_dyn),
        Arc::clone(&store_dyn),
        Arc::clone(&pool),
        Arc::clone(&config),
    ));
    let engine = Arc::new(MembershipSyncEngine::new(
        Arc::clone(&config),
        store_dyn,
        matrix_dyn,
        transport_dyn,
        Arc::clone(&pool),
        Arc::clone(&provisioner),
        pm,
        lifecycle,
    ));

    TestEnv {
        config,
        store,
        matrix,
        transport,
        pool,
        provisioner,
        engine,
    }
}

pub fn default_config_json() -> &'static str {
    r#"{
        "homeserver_domain": "home.test",
        "bot_user_id": "@causeway:home.test",
        "servers": [{
            "id": "irc.example",
            "addr": "irc.example:6667",
            "bot_nick": "causeway-bot",
            "membership_lists": {
                "enabled": true,
                "irc_to_matrix": {"incremental": true},
                "matrix_to_irc": {"incremental": true}
            }
        }]
    }"#
}

impl TestEnv {
    /// Persist a channel mapping directly, as provisioned bridges do.
    pub async fn map_channel(&self, room: &str, channel: &str) {
        self.store
            .store_room_mapping(RoomMapping::new(
                room,
                SERVER,
                channel,
                MappingOrigin::Join,
                MappingKind::Channel,
            ))
            .await
            .unwrap();
    }
}
