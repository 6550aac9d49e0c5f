//! The administrative command surface over the engine's public operations.

mod common;

use std::sync::Arc;

use causeway::bridge::{AdminCommand, AdminHandler};
use causeway::irc::IrcTransport;
use causeway::store::DataStore;
use common::{IrcCall, SERVER};

const ALICE: &str = "@alice:home.test";

fn handler(env: &common::TestEnv) -> AdminHandler {
    let store: Arc<dyn DataStore> = env.store.clone();
    let transport: Arc<dyn IrcTransport> = env.transport.clone();
    AdminHandler::new(
        Arc::clone(&env.config),
        store,
        transport,
        Arc::clone(&env.pool),
        Arc::clone(&env.provisioner),
    )
}

async fn bring_alice_online(env: &common::TestEnv) {
    env.map_channel("!chan:home.test", "#chan").await;
    env.engine
        .on_matrix_join("!chan:home.test", ALICE)
        .await
        .unwrap();
}

#[tokio::test]
async fn nick_change_applies_live_and_persists() {
    let env = common::env();
    bring_alice_online(&env).await;
    let admin = handler(&env);

    admin
        .handle(
            ALICE,
            AdminCommand::Nick {
                server: SERVER.into(),
                nick: "alice2".into(),
            },
        )
        .await
        .unwrap();

    assert!(env.transport.calls().iter().any(|c| matches!(
        c,
        IrcCall::ChangeNick { old, new, .. } if old == "M-alice" && new == "alice2"
    )));
    let config = env
        .store
        .get_irc_config(ALICE, SERVER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.nick, "alice2", "the desired nick survives reconnects");
    let conn = env.pool.bridged_connection(SERVER, ALICE).await.unwrap();
    assert_eq!(conn.nick().await, "alice2");
}

#[tokio::test]
async fn nick_change_without_live_connection_only_persists() {
    let env = common::env();
    let admin = handler(&env);

    admin
        .handle(
            ALICE,
            AdminCommand::Nick {
                server: SERVER.into(),
                nick: "alice2".into(),
            },
        )
        .await
        .unwrap();

    assert!(env.transport.calls().is_empty());
    let config = env
        .store
        .get_irc_config(ALICE, SERVER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.nick, "alice2");
}

#[tokio::test]
async fn password_change_stores_and_tears_down_for_reconnect() {
    let env = common::env();
    bring_alice_online(&env).await;
    let admin = handler(&env);

    let reply = admin
        .handle(
            ALICE,
            AdminCommand::Password {
                server: SERVER.into(),
                pass: "hunter2".into(),
            },
        )
        .await
        .unwrap();
    assert!(reply.contains("Reconnecting"));

    let config = env
        .store
        .get_irc_config(ALICE, SERVER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.password.as_deref(), Some("hunter2"));

    // The old session was torn down; re-establishment is the pool's job.
    assert!(env
        .transport
        .calls()
        .iter()
        .any(|c| matches!(c, IrcCall::Quit { nick, .. } if nick == "M-alice")));
    assert!(env.pool.bridged_connection(SERVER, ALICE).await.is_none());
}

#[tokio::test]
async fn quit_all_disconnects_every_server() {
    let env = common::env();
    bring_alice_online(&env).await;
    let admin = handler(&env);

    let reply = admin.handle(ALICE, AdminCommand::QuitAll).await.unwrap();
    assert!(reply.contains("1 server"));
    assert!(env.pool.bridged_connection(SERVER, ALICE).await.is_none());
}

#[tokio::test]
async fn list_connections_reports_channels() {
    let env = common::env();
    bring_alice_online(&env).await;
    let admin = handler(&env);

    let reply = admin.handle(ALICE, AdminCommand::ListConnections).await.unwrap();
    assert!(reply.contains("irc.example"));
    assert!(reply.contains("M-alice"));
    assert!(reply.contains("#chan"));
}

#[tokio::test]
async fn feature_toggle_persists() {
    let env = common::env();
    let admin = handler(&env);

    admin
        .handle(
            ALICE,
            AdminCommand::Feature {
                name: "mentions".into(),
                enabled: true,
            },
        )
        .await
        .unwrap();

    let features = env.store.get_user_features(ALICE).await.unwrap();
    assert_eq!(features.flags.get("mentions"), Some(&true));
}

#[tokio::test]
async fn whois_reports_presence() {
    let env = common::env();
    env.transport.add_known_nick("bob");
    let admin = handler(&env);

    let found = admin
        .handle(
            ALICE,
            AdminCommand::Whois {
                server: SERVER.into(),
                nick: "bob".into(),
            },
        )
        .await
        .unwrap();
    assert!(found.contains("bob is connected"));

    let missing = admin
        .handle(
            ALICE,
            AdminCommand::Whois {
                server: SERVER.into(),
                nick: "ghost".into(),
            },
        )
        .await
        .unwrap();
    assert!(missing.contains("No such nick"));
}
