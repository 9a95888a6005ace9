//! Integration tests for playtimed
//!
//! These tests verify the end-to-end behavior of the daemon's components.

use chrono::{DateTime, Local, TimeZone};
use playtime_api::{Command, EventPayload, ResponsePayload, RewardKind};
use playtime_config::parse_config;
use playtime_core::{CoreEvent, EngineOptions, PlaytimeEngine};
use playtime_host_api::MockGrants;
use playtime_ipc::{IpcClient, IpcServer, ServerMessage};
use playtime_store::{JsonFileStore, Store};
use playtime_util::{UserId, LEDGER_FILENAME, MILLIS_PER_HOUR};
use std::sync::Arc;
use std::time::Duration;

const TEST_CONFIG: &str = r#"
config_version = 1

[rewards]
rules = [
    "1:group:apprentice",
    "2:permission:fly",
    "5:command:say Congratulations %player%",
]
"#;

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
}

fn hours(h: u64) -> DateTime<Local> {
    t0() + chrono::Duration::milliseconds((h * MILLIS_PER_HOUR) as i64)
}

fn make_engine(store: Arc<dyn Store>, grants: Arc<MockGrants>) -> PlaytimeEngine {
    let config = parse_config(TEST_CONFIG).unwrap();
    PlaytimeEngine::new(
        store,
        grants,
        config.rewards,
        EngineOptions::from_service(&config.service),
    )
}

#[test]
fn test_config_defaults() {
    let config = parse_config(TEST_CONFIG).unwrap();
    assert_eq!(config.rewards.rules.rule_count(), 3);
    assert!(config.rewards.enabled);
    assert_eq!(config.service.tick_interval, Duration::from_millis(50));
}

#[tokio::test]
async fn test_rewards_granted_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join(LEDGER_FILENAME)));
    let grants = Arc::new(MockGrants::new());
    let engine = make_engine(store, grants.clone());
    engine.start().unwrap();

    let user = UserId::new();
    engine.login(user, "Alex", t0()).await.unwrap();

    // Nothing due before the first hour
    assert!(engine.tick(hours(0)).await.is_empty());
    assert!(grants.calls().is_empty());

    let events = engine.logout(user, hours(3)).await.unwrap();
    assert!(events.contains(&CoreEvent::RewardGranted {
        user_id: user,
        rule_index: 0,
        kind: RewardKind::Group,
        payload: "apprentice".into(),
    }));
    assert!(events.contains(&CoreEvent::RewardGranted {
        user_id: user,
        rule_index: 1,
        kind: RewardKind::Permission,
        payload: "fly".into(),
    }));
    assert_eq!(grants.calls().len(), 2);

    // Second session crosses the five hour mark; earlier rules are not repeated
    engine.login(user, "Alex", hours(10)).await.unwrap();
    engine.logout(user, hours(12)).await.unwrap();

    let calls = grants.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].kind, RewardKind::Command);
    assert_eq!(calls[2].value, "say Congratulations Alex");

    let view = engine.playtime_view(user, hours(12));
    assert_eq!(view.total_ms, 5 * MILLIS_PER_HOUR);
    assert_eq!(view.granted_rewards, vec![0, 1, 2]);
    assert!(!view.online);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join(LEDGER_FILENAME);
    let user = UserId::new();

    {
        let grants = Arc::new(MockGrants::new());
        let engine = make_engine(Arc::new(JsonFileStore::new(&ledger_path)), grants.clone());
        engine.start().unwrap();

        engine.login(user, "Alex", t0()).await.unwrap();
        engine.tick(hours(1)).await;
        assert_eq!(grants.calls().len(), 1);

        // Shutdown folds the open session into the saved total
        let saved = engine.shutdown(hours(1)).await.unwrap();
        assert_eq!(saved, 1);
    }

    let content = std::fs::read_to_string(&ledger_path).unwrap();
    assert!(content.contains("\"playtimes\""));
    assert!(content.contains("\"givenRewards\""));

    let grants = Arc::new(MockGrants::new());
    let engine = make_engine(Arc::new(JsonFileStore::new(&ledger_path)), grants.clone());
    assert_eq!(engine.start().unwrap(), 1);
    assert_eq!(engine.current_total(&user, hours(2)), MILLIS_PER_HOUR);

    // Rule 0 was recorded before the restart and is not granted again
    engine.login(user, "Alex", hours(2)).await.unwrap();
    assert!(grants.calls().is_empty());
    assert!(engine.playtime_view(user, hours(2)).session_started_at.is_some());
}

#[tokio::test]
async fn test_override_triggers_rewards_for_online_user() {
    let dir = tempfile::tempdir().unwrap();
    let grants = Arc::new(MockGrants::new());
    let engine = make_engine(
        Arc::new(JsonFileStore::new(dir.path().join(LEDGER_FILENAME))),
        grants.clone(),
    );
    engine.start().unwrap();

    let online = UserId::new();
    let offline = UserId::new();
    engine.login(online, "Alex", t0()).await.unwrap();

    engine.set_playtime(online, "2h", t0()).await.unwrap();
    engine.set_playtime(offline, "10h", t0()).await.unwrap();

    let calls = grants.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.user_id == online));
    assert_eq!(engine.current_total(&offline, t0()), 10 * MILLIS_PER_HOUR);
}

#[tokio::test]
async fn test_failed_grant_retries_on_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let grants = Arc::new(MockGrants::new());
    grants.set_failing(RewardKind::Group, true);
    let engine = make_engine(
        Arc::new(JsonFileStore::new(dir.path().join(LEDGER_FILENAME))),
        grants.clone(),
    );
    engine.start().unwrap();

    let user = UserId::new();
    engine.login(user, "Alex", t0()).await.unwrap();

    let events = engine.tick(hours(1)).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::RewardFailed { rule_index: 0, .. })));
    assert!(engine.playtime_view(user, hours(1)).granted_rewards.is_empty());

    grants.set_failing(RewardKind::Group, false);
    engine.tick(hours(1)).await;
    assert_eq!(engine.playtime_view(user, hours(1)).granted_rewards, vec![0]);
}

#[tokio::test]
async fn test_ipc_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("playtimed.sock");

    let mut server = IpcServer::new(&socket_path);
    server.start().await.unwrap();
    let server = Arc::new(server);
    let mut messages = server.take_message_receiver().await.unwrap();

    let accept = server.clone();
    tokio::spawn(async move {
        let _ = accept.run().await;
    });

    // Minimal responder standing in for the daemon loop
    let responder = server.clone();
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            if let ServerMessage::Request { client_id, request } = msg {
                let payload = match request.command {
                    Command::Ping => ResponsePayload::Pong,
                    Command::SubscribeEvents => ResponsePayload::Subscribed { client_id },
                    _ => continue,
                };
                let response = playtime_api::Response::success(request.request_id, payload);
                let _ = responder.send_response(&client_id, response).await;
            }
        }
    });

    let mut client = IpcClient::connect(&socket_path).await.unwrap();
    let pong = client.call(Command::Ping).await.unwrap();
    assert!(matches!(pong, ResponsePayload::Pong));

    let mut events = client.subscribe().await.unwrap();
    server.broadcast_event(playtime_api::Event::new(EventPayload::LedgerSaved { user_count: 4 }));

    let event = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event.payload, EventPayload::LedgerSaved { user_count: 4 }));
}
