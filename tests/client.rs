//! Client behavior against a fake controller over real TCP

mod support;

use futures_util::future::join_all;
use russound_rio::{
    ClientConfig, ConnectionState, RioError, RussoundClient, SourceId, StateUpdate, ZoneId,
};
use std::sync::{Arc, Mutex};
use support::{accept_all, FakeDevice, TIMEOUT};
use tokio::time::timeout;

#[tokio::test]
async fn watched_zone_reads_come_from_cache() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;
    let zone = ZoneId::new(1);
    let mut updates = client.subscribe();

    client.watch_zone(zone).await.unwrap();
    device.push("N C[1].Z[1].Volume=\"30\"");
    timeout(TIMEOUT, updates.recv()).await.unwrap().unwrap();

    assert_eq!(
        client.get_zone_variable(zone, "volume").await.unwrap(),
        Some("30".to_string())
    );
    assert_eq!(client.get_cached_zone_variable(zone, "VOLUME"), Some("30".to_string()));
    assert_eq!(device.received(), vec!["WATCH C[1].Z[1] ON"]);
}

#[tokio::test]
async fn unwatched_zone_reads_go_to_the_device() {
    let device = FakeDevice::start(|command: &str| match command {
        "GET C[1].Z[2].volume" => vec!["S C[1].Z[2].volume=\"12\"".to_string()],
        _ => vec!["E Unknown".to_string()],
    })
    .await;
    let client = device.client().await;
    let zone = ZoneId::new(2);

    assert_eq!(
        client.get_zone_variable(zone, "volume").await.unwrap(),
        Some("12".to_string())
    );
    // Stored, but not readable until the zone is watched
    assert_eq!(client.get_cached_zone_variable(zone, "volume"), None);
    assert_eq!(client.zone_state(zone).get("volume").map(String::as_str), Some("12"));

    client.get_zone_variable(zone, "volume").await.unwrap();
    assert_eq!(device.received().len(), 2);
}

#[tokio::test]
async fn device_errors_reach_only_the_caller() {
    let device = FakeDevice::start(|command: &str| {
        if command.contains("Z[9]") {
            vec!["E Invalid Zone".to_string()]
        } else {
            vec!["S S[1].name=\"Tuner\"".to_string()]
        }
    })
    .await;
    let client = device.client().await;

    match client.get_zone_variable(ZoneId::new(9), "name").await {
        Err(RioError::Command(message)) => assert_eq!(message, "Invalid Zone"),
        other => panic!("expected command error, got {:?}", other),
    }
    assert!(client.zone_state(ZoneId::new(9)).is_empty());
    assert_eq!(
        client.get_source_variable(SourceId::new(1), "name").await.unwrap(),
        Some("Tuner".to_string())
    );
    assert_eq!(client.state(), ConnectionState::Running);
}

#[tokio::test]
async fn concurrent_commands_keep_issue_order() {
    let device = FakeDevice::start(|command: &str| {
        // Answer "GET S[n].name" with name "source n"
        let n = command
            .trim_start_matches("GET S[")
            .trim_end_matches("].name");
        vec![format!("S S[{}].name=\"source {}\"", n, n)]
    })
    .await;
    let client = device.client().await;

    let calls = (1..=10).map(|n| {
        let client = client.clone();
        async move { client.get_source_variable(SourceId::new(n), "name").await }
    });
    let results = join_all(calls).await;

    for (n, result) in (1..=10).zip(results) {
        assert_eq!(result.unwrap(), Some(format!("source {}", n)));
    }
    let expected: Vec<String> = (1..=10).map(|n| format!("GET S[{}].name", n)).collect();
    assert_eq!(device.received(), expected);
}

#[tokio::test]
async fn set_leaves_the_cache_to_the_device() {
    let device = FakeDevice::start(|command: &str| {
        if command.starts_with("SET") {
            vec![
                "N C[1].Z[1].name=\"Den\"".to_string(),
                "S".to_string(),
            ]
        } else {
            vec!["S".to_string()]
        }
    })
    .await;
    let client = device.client().await;
    let zone = ZoneId::new(1);

    client.watch_zone(zone).await.unwrap();
    client.set_zone_variable(zone, "name", "Den").await.unwrap();

    assert_eq!(device.received()[1], "SET C[1].Z[1].name=\"Den\"");
    // The value comes from the device's notification, not from the SET
    assert_eq!(client.get_cached_zone_variable(zone, "name"), Some("Den".to_string()));
}

#[tokio::test]
async fn failed_watch_does_not_mark_watched() {
    let device = FakeDevice::start(|_: &str| vec!["E Invalid Source".to_string()]).await;
    let client = device.client().await;

    assert!(client.watch_source(SourceId::new(7)).await.is_err());
    assert!(client.watched_sources().is_empty());
}

#[tokio::test]
async fn unwatch_twice_is_harmless() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;
    let source = SourceId::new(2);

    client.watch_source(source).await.unwrap();
    assert_eq!(client.watched_sources(), vec![source]);
    client.unwatch_source(source).await.unwrap();
    client.unwatch_source(source).await.unwrap();
    assert!(client.watched_sources().is_empty());
    assert_eq!(
        device.received(),
        vec!["WATCH S[2] ON", "WATCH S[2] OFF", "WATCH S[2] OFF"]
    );
}

#[tokio::test]
async fn events_are_formatted_for_the_wire() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;

    client
        .send_zone_event(ZoneId::with_controller(3, 2), "KeyPress", ["Volume", "40"])
        .await
        .unwrap();
    client
        .send_source_event(SourceId::new(1), "KeyRelease", Vec::<String>::new())
        .await
        .unwrap();
    client.zone(ZoneId::new(1)).set_volume(25).await.unwrap();

    assert_eq!(
        device.received(),
        vec![
            "EVENT C[2].Z[3]!KeyPress Volume 40",
            "EVENT S[1]!KeyRelease",
            "EVENT C[1].Z[1]!KeyPress Volume 25",
        ]
    );
}

#[tokio::test]
async fn observers_see_pushed_updates() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;
    let zone = ZoneId::new(1);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    let exact = client.add_zone_observer(Some(zone), move |id, variable, value| {
        log.lock().unwrap().push(format!("exact {} {}={}", id, variable, value));
    });
    let log = seen.clone();
    client.add_zone_observer(None, move |id, variable, value| {
        log.lock().unwrap().push(format!("any {} {}={}", id, variable, value));
    });
    let log = seen.clone();
    client.add_source_observer(None, move |id, variable, value| {
        log.lock().unwrap().push(format!("source {} {}={}", id, variable, value));
    });

    let mut updates = client.subscribe();
    client.watch_zone(zone).await.unwrap();
    device.push("N C[1].Z[1].Bass=\"2\"");
    device.push("N S[4].songName=\"Song\"");
    for _ in 0..2 {
        timeout(TIMEOUT, updates.recv()).await.unwrap().unwrap();
    }

    assert!(client.remove_zone_observer(Some(zone), exact));
    assert!(!client.remove_zone_observer(Some(zone), exact));
    device.push("N C[1].Z[1].Bass=\"3\"");
    let last = timeout(TIMEOUT, updates.recv()).await.unwrap().unwrap();
    assert_eq!(
        last,
        StateUpdate::Zone {
            id: zone,
            variable: "bass".to_string(),
            value: "3".to_string(),
        }
    );

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "exact 1:1 bass=2",
            "any 1:1 bass=2",
            "source 4 songname=Song",
            "any 1:1 bass=3",
        ]
    );
}

#[tokio::test]
async fn close_and_reconnect_keep_cache() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;
    let zone = ZoneId::new(1);
    let mut updates = client.subscribe();

    assert!(matches!(
        client.connect().await,
        Err(RioError::InvalidState(ConnectionState::Running))
    ));

    client.watch_zone(zone).await.unwrap();
    device.push("N C[1].Z[1].status=\"ON\"");
    timeout(TIMEOUT, updates.recv()).await.unwrap().unwrap();

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.watch_zone(zone).await,
        Err(RioError::NotConnected)
    ));
    // Cache and watch set survive the close
    assert_eq!(client.get_cached_zone_variable(zone, "status"), Some("ON".to_string()));

    device.connect(&client).await;
    assert_eq!(client.state(), ConnectionState::Running);
    client.watch_zone(zone).await.unwrap();
    assert_eq!(device.received().len(), 2);
}

#[tokio::test]
async fn device_hangup_closes_the_client() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;
    let mut state = client.state_changes();

    device.hangup();
    timeout(TIMEOUT, state.wait_for(|s| *s == ConnectionState::Closed))
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        client.get_zone_variable(ZoneId::new(1), "volume").await,
        Err(RioError::NotConnected)
    ));
    assert!(matches!(client.close().await, Err(RioError::ConnectionClosed)));

    // The owner decides to reconnect, and the new connection hears pushes
    device.connect(&client).await;
    let mut updates = client.subscribe();
    device.push("N C[1].Z[1].volume=\"5\"");
    timeout(TIMEOUT, updates.recv()).await.unwrap().unwrap();
}

#[tokio::test]
async fn pushes_right_after_connect_are_delivered() {
    let device = FakeDevice::start(accept_all).await;
    let client = device.client().await;
    let mut updates = client.subscribe();

    device.push("N S[3].name=\"Phono\"");
    let update = timeout(TIMEOUT, updates.recv()).await.unwrap().unwrap();
    assert_eq!(update.value(), "Phono");
    assert_eq!(
        client.source_state(SourceId::new(3)).get("name").map(String::as_str),
        Some("Phono")
    );
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = RussoundClient::new(
        ClientConfig::new(addr.ip().to_string())
            .with_port(addr.port())
            .with_connect_timeout(TIMEOUT),
    );

    assert!(matches!(client.connect().await, Err(RioError::Io(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn close_fails_waiting_callers() {
    // A device that never answers
    let device = FakeDevice::start(|_: &str| Vec::new()).await;
    let client = device.client().await;

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.get_zone_variable(ZoneId::new(1), "volume").await }
    });
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.get_zone_variable(ZoneId::new(2), "volume").await }
    });
    while device.received().is_empty() {
        tokio::task::yield_now().await;
    }

    client.close().await.unwrap();
    assert!(matches!(first.await.unwrap(), Err(RioError::ConnectionClosed)));
    assert!(matches!(second.await.unwrap(), Err(RioError::ConnectionClosed)));
}
