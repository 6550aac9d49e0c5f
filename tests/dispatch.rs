//! Event dispatch: handler failures are isolated and never block
//! subsequent unrelated events.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;

use causeway::bridge::{spawn_dispatcher, BridgeEvent, IrcEvent, MatrixEvent};
use causeway::store::DataStore;
use common::{MatrixCall, SERVER};

#[tokio::test]
async fn failing_event_does_not_block_later_events() {
    let env = common::env();
    env.map_channel("!a:home.test", "#a").await;
    env.engine
        .on_matrix_join("!a:home.test", "@alice:home.test")
        .await
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = spawn_dispatcher(std::sync::Arc::clone(&env.engine), rx);

    // A PM from a nick WHOIS knows nothing about — the handler fails.
    tx.send(BridgeEvent::Irc(IrcEvent::Pm {
        server: SERVER.into(),
        from_nick: "ghost".into(),
        to_nick: "M-alice".into(),
        text: "boo".into(),
    }))
    .unwrap();
    // An unrelated join that must still be processed.
    tx.send(BridgeEvent::Irc(IrcEvent::Join {
        server: SERVER.into(),
        channel: "#a".into(),
        nick: "bob".into(),
    }))
    .unwrap();

    let mut mirrored = false;
    for _ in 0..100 {
        if env.matrix.calls().iter().any(|c| matches!(
            c,
            MatrixCall::Join { as_user, room }
                if as_user == "@irc.example_bob:home.test" && room == "!a:home.test"
        )) {
            mirrored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(mirrored, "the join after the failing event was processed");

    drop(tx);
    dispatcher.await.unwrap();
}

#[tokio::test]
async fn tombstone_event_routes_to_migration() {
    let env = common::env();
    env.map_channel("!old:home.test", "#chan").await;

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = spawn_dispatcher(std::sync::Arc::clone(&env.engine), rx);

    tx.send(BridgeEvent::Matrix(MatrixEvent::Tombstone {
        room: "!old:home.test".into(),
        replacement: "!new:home.test".into(),
    }))
    .unwrap();
    drop(tx);
    dispatcher.await.unwrap();

    let mut migrated = false;
    for _ in 0..100 {
        if env
            .store
            .get_room("!new:home.test", SERVER, "#chan")
            .await
            .unwrap()
            .is_some()
        {
            migrated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(migrated, "the mapping moved to the replacement room");
}
