use labbridge::rpc::transport::{FrontendPeer, channel_pair};
use labbridge::rpc::{BridgeConfig, BridgeError, Endpoint, EndpointBuilder, Resolved, TransformError};
use serde_json::json;

fn endpoint() -> (Endpoint, FrontendPeer) {
    let (transport, inbound, peer) = channel_pair();
    let endpoint = EndpointBuilder::new("TransformTest", transport)
        .config(BridgeConfig {
            require_ready: false,
            ..BridgeConfig::default()
        })
        .build();
    endpoint.listen(inbound);
    (endpoint, peer)
}

#[tokio::test]
async fn test_connection_transform_builds_handle() {
    let (endpoint, mut peer) = endpoint();
    let call = tokio::spawn({
        let endpoint = endpoint.clone();
        async move {
            endpoint
                .schedule_operation(
                    "createWidget",
                    json!({}),
                    &json!({"transform": "connection", "cid": "widget-abc"}),
                )
                .await
        }
    });

    let sent = peer.recv().await.unwrap().message;
    assert_eq!(sent["transform"], json!({"transform": "connection", "cid": "widget-abc"}));
    peer.respond(sent["requestId"].as_str().unwrap(), json!({"id": "W1"}));

    let resolved = call.await.unwrap().unwrap();
    let widget = resolved.as_connection().unwrap();
    assert_eq!(widget.cid(), "widget-abc");
    assert_eq!(widget.id(), "W1");
    assert!(widget.endpoint().is_some_and(|bound| bound.ptr_eq(&endpoint)));
}

#[tokio::test]
async fn test_function_without_code_fails_before_send() {
    let (endpoint, mut peer) = endpoint();
    let err = endpoint
        .schedule_operation("evaluate", json!({}), &json!({"transform": "function"}))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Transform(TransformError::MissingParameters(_))
    ));
    assert!(peer.try_recv().is_none());
    assert_eq!(endpoint.pending_count(), 0);
}

#[tokio::test]
async fn test_advanced_transform_maps_keys() {
    let (endpoint, mut peer) = endpoint();
    let call = tokio::spawn({
        let endpoint = endpoint.clone();
        async move {
            endpoint
                .schedule_operation(
                    "launch",
                    json!({}),
                    &json!({
                        "transform": "advanced",
                        "mappings": {
                            "panel": {"transform": "connection"},
                            "title": "raw",
                        }
                    }),
                )
                .await
        }
    });

    let sent = peer.recv().await.unwrap().message;
    peer.respond(
        sent["requestId"].as_str().unwrap(),
        json!({"panel": {"cid": "widget-scenario-panel", "id": "P"}, "title": "Console", "extra": 1}),
    );

    let resolved = call.await.unwrap().unwrap();
    let Resolved::Map(map) = &resolved else {
        panic!("expected advanced result");
    };
    assert_eq!(map.len(), 2);
    assert_eq!(resolved.get("title").and_then(Resolved::as_value), Some(&json!("Console")));
    let panel = resolved.get("panel").and_then(Resolved::as_connection).unwrap();
    assert_eq!(panel.cid(), "widget-scenario-panel");
}

#[tokio::test]
async fn test_transform_failure_on_reply_reaches_caller() {
    let (endpoint, mut peer) = endpoint();
    let call = tokio::spawn({
        let endpoint = endpoint.clone();
        async move {
            endpoint
                .schedule_operation("open", json!({}), &json!({"transform": "connection", "cid": "gizmo-1"}))
                .await
        }
    });

    let sent = peer.recv().await.unwrap().message;
    peer.respond(sent["requestId"].as_str().unwrap(), json!({"id": "G"}));

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
}
