//! Command bridge integration tests

use callbridge::application::{CallAuthorityAdapter, CallRegistry};
use callbridge::config::ProviderConfig;
use callbridge::domain::shared::value_objects::CallId;
use callbridge::domain::telephony::IncomingCallError;
use callbridge::infrastructure::authority::SimulatedAuthority;
use callbridge::infrastructure::service::SimulatedCallService;
use callbridge::interface::bridge::{
    BridgeError, CallChangedPayload, CallKitPlugin, CallbackPayload,
};
use callbridge::DomainError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn setup(config: ProviderConfig) -> (CallKitPlugin, Arc<SimulatedAuthority>) {
    let authority = SimulatedAuthority::spawn(config);
    let registry = Arc::new(CallRegistry::new(authority.clone()));
    let adapter = CallAuthorityAdapter::new(
        registry,
        authority.clone(),
        Arc::new(SimulatedCallService::new()),
    );
    (CallKitPlugin::new(adapter), authority)
}

/// Next payload on the callback channel
async fn next(rx: &mut mpsc::UnboundedReceiver<CallbackPayload>) -> CallbackPayload {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected payload before timeout")
        .expect("callback channel open")
}

fn call_changed(payload: CallbackPayload) -> CallChangedPayload {
    match payload {
        CallbackPayload::CallChanged(call) => call,
        other => panic!("expected callChanged, got {:?}", other),
    }
}

fn audio(message: &str) -> CallbackPayload {
    CallbackPayload::AudioSystem {
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_outgoing_call_round_trip() {
    let (plugin, authority) = setup(ProviderConfig::default());
    let mut rx = plugin.register();

    let id = plugin
        .start_call(&[json!("Alice"), json!(false)])
        .await
        .unwrap();
    authority.settle().await;

    assert_eq!(next(&mut rx).await, audio("configureAudio"));
    let added = call_changed(next(&mut rx).await);
    assert_eq!(added.handle, "Alice");
    assert!(added.is_outgoing);
    assert!(!added.has_started_connecting);
    let connecting = call_changed(next(&mut rx).await);
    assert!(connecting.has_started_connecting);
    assert!(!connecting.has_connected);
    assert!(!connecting.connecting_date.is_empty());
    assert_eq!(connecting.connect_date, "");
    // The system activates the session once the start action is fulfilled
    assert_eq!(next(&mut rx).await, audio("startAudio"));

    plugin.call_connected(&[json!(id)]).unwrap();
    let connected = call_changed(next(&mut rx).await);
    assert!(connected.has_connected);
    assert!(connected.connect_date.ends_with("+0000"));

    let call_id: CallId = id.parse().unwrap();
    authority.set_held(call_id, true).unwrap();
    authority.settle().await;
    assert!(call_changed(next(&mut rx).await).is_on_hold);
    assert_eq!(next(&mut rx).await, audio("stopAudio"));

    plugin.end_call(&[json!(id)]).await.unwrap();
    authority.settle().await;

    assert_eq!(next(&mut rx).await, audio("stopAudio"));
    let ended = call_changed(next(&mut rx).await);
    assert!(ended.has_ended);
    assert_eq!(ended.handle, "Alice");
    // Once removed, the registry is empty and the payload falls back to defaults
    assert_eq!(
        next(&mut rx).await,
        CallbackPayload::CallChanged(CallChangedPayload::default())
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_burst_of_changes_is_not_dropped() {
    let (plugin, authority) = setup(ProviderConfig::default());
    let mut rx = plugin.register();
    let id = plugin
        .start_call(&[json!("Alice"), json!(false)])
        .await
        .unwrap();
    authority.settle().await;
    for _ in 0..4 {
        next(&mut rx).await;
    }

    let call_id: CallId = id.parse().unwrap();
    for i in 0..300 {
        authority.set_held(call_id, i % 2 == 0).unwrap();
    }
    authority.settle().await;

    for i in 0..300 {
        let held = call_changed(next(&mut rx).await);
        assert_eq!(held.is_on_hold, i % 2 == 0);
        let expected = if i % 2 == 0 { "stopAudio" } else { "startAudio" };
        assert_eq!(next(&mut rx).await, audio(expected));
    }
}

#[tokio::test]
async fn test_incoming_call_returns_identifier() {
    let (plugin, authority) = setup(ProviderConfig::default());
    let mut rx = plugin.register();

    let id = plugin
        .report_incoming_call(&[json!("Bob"), json!(true), json!(false), json!(false), json!(true), json!(true)])
        .await
        .unwrap();

    let call = call_changed(next(&mut rx).await);
    assert_eq!(call.handle, "Bob");
    assert!(!call.is_outgoing);
    assert!(!call.has_started_connecting);

    // Positional capabilities reach the system UI
    let call_id: CallId = id.parse().unwrap();
    assert_eq!(authority.known_calls(), vec![call_id]);
    let shown = authority.call_update(call_id).unwrap();
    assert!(shown.has_video);
    assert!(!shown.supports_grouping);
    assert!(!shown.supports_ungrouping);
    assert!(shown.supports_dtmf);
    assert!(shown.supports_holding);
}

#[tokio::test]
async fn test_incoming_call_denied() {
    let (plugin, authority) = setup(ProviderConfig::default());
    authority.set_do_not_disturb(true);

    let result = plugin.report_incoming_call(&[json!("Bob")]).await;

    assert_eq!(
        result,
        Err(BridgeError::Domain(DomainError::AuthorityDenied(
            IncomingCallError::FilteredByDoNotDisturb
        )))
    );
}

#[tokio::test]
async fn test_malformed_identifier() {
    let (plugin, _authority) = setup(ProviderConfig::default());

    let result = plugin.end_call(&[json!("nope")]).await;
    assert_eq!(result, Err(BridgeError::InvalidCallId("nope".to_string())));

    let result = plugin.call_connected(&[]);
    assert_eq!(result, Err(BridgeError::InvalidCallId(String::new())));
}

#[tokio::test]
async fn test_start_call_rejected_by_authority() {
    let (plugin, _authority) = setup(ProviderConfig {
        supports_video: false,
        ..Default::default()
    });

    let result = plugin.start_call(&[json!("Alice"), json!(true)]).await;

    assert!(matches!(
        result,
        Err(BridgeError::Domain(DomainError::TransactionRejected(_)))
    ));
}

#[tokio::test]
async fn test_reregister_replaces_channel() {
    let (plugin, _authority) = setup(ProviderConfig::default());
    let mut first = plugin.register();
    let mut second = plugin.register();

    plugin.report_incoming_call(&[json!("Carol")]).await.unwrap();

    assert_eq!(call_changed(next(&mut second).await).handle, "Carol");
    // The first forwarder was stopped, so its channel closes
    let closed = tokio::time::timeout(Duration::from_secs(2), first.recv())
        .await
        .expect("first channel closes");
    assert!(closed.is_none());
}
