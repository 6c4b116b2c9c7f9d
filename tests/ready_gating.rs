use labbridge::rpc::transport::channel_pair;
use labbridge::rpc::{BridgeError, EndpointBuilder, ReadyPhase};
use serde_json::{Value, json};
use std::time::Duration;

#[tokio::test]
async fn test_operation_waits_for_ready() {
    let (transport, inbound, mut peer) = channel_pair();
    let endpoint = EndpointBuilder::new("GateTest", transport).build();
    endpoint.listen(inbound);
    assert_eq!(endpoint.phase(), ReadyPhase::Uninitialized);

    let call = tokio::spawn({
        let endpoint = endpoint.clone();
        async move { endpoint.call::<Value>("echo", json!({"x": 1})).await }
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(peer.try_recv().is_none());
    assert_eq!(endpoint.pending_count(), 0);

    peer.ready();
    let sent = peer.recv().await.unwrap().message;
    assert!(endpoint.is_ready());
    peer.respond(sent["requestId"].as_str().unwrap(), json!({"x": 1}));

    assert_eq!(call.await.unwrap().unwrap(), json!({"x": 1}));
}

#[tokio::test]
async fn test_initializing_clears_ready() {
    let (transport, _inbound, _peer) = channel_pair();
    let endpoint = EndpointBuilder::new("GateTest", transport).build();

    endpoint.mark_ready();
    assert!(endpoint.is_ready());
    endpoint.begin_init();
    assert_eq!(endpoint.phase(), ReadyPhase::Initializing);
    assert!(!endpoint.is_ready());
}

#[tokio::test]
async fn test_close_releases_gated_caller() {
    let (transport, _inbound, mut peer) = channel_pair();
    let endpoint = EndpointBuilder::new("GateTest", transport).build();

    let call = tokio::spawn({
        let endpoint = endpoint.clone();
        async move { endpoint.call::<Value>("echo", json!({})).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    endpoint.close();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Closed(_)));
    assert!(peer.try_recv().is_none());
}

#[tokio::test]
async fn test_after_close_fails_without_sending() {
    let (transport, _inbound, mut peer) = channel_pair();
    let endpoint = EndpointBuilder::new("GateTest", transport).build();
    endpoint.mark_ready();
    endpoint.close();

    let err = endpoint
        .schedule_operation("echo", json!({}), "raw")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Closed(_)));
    assert!(peer.try_recv().is_none());

    endpoint.mark_ready();
    assert_eq!(endpoint.phase(), ReadyPhase::Closed);
}
