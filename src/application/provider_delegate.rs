//! Call authority adapter
//!
//! Sole delegate of the call-management authority. Every transition the
//! authority authorizes arrives here as an action; the adapter applies it to
//! the matching [`Call`], keeps the [`CallRegistry`] in step, reports outgoing
//! progress back to the authority and tells the audio controller what to do.
//!
//! | Trigger            | Call lookup | Effect                                         |
//! |--------------------|-------------|------------------------------------------------|
//! | incoming report    | must be new | add incoming call when the authority accepts   |
//! | start action       | must be new | create outgoing call, start it, add            |
//! | answer action      | must exist  | configure audio, start connecting              |
//! | end action         | must exist  | stop audio, end, remove                        |
//! | set-held action    | must exist  | hold or resume, stop or start audio            |
//! | action timeout     | none        | fulfill                                        |
//! | reset              | none        | stop audio, end every call, clear the registry |
//!
//! A missing call fails the action with [`DomainError::UnknownCall`]; it is
//! never treated as a fault of the adapter.
//!
//! Audio messages are published on the registry's ordered event stream right
//! where they happen, so they interleave correctly with call changes.

use crate::application::call_registry::{CallRegistry, DEFAULT_EVENT_CAPACITY};
use crate::application::event_stream::BridgeEvent;
use crate::domain::audio::AudioEvent;
use crate::domain::call::{Call, CallListener};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use crate::domain::telephony::{
    Action, AnswerCallAction, CallAction, CallEndedReason, CallProvider, CallService, CallUpdate,
    EndCallAction, ProviderDelegate, SetHeldCallAction, StartCallAction,
};
use crate::infrastructure::metrics;
use chrono::Utc;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Relays an outgoing call's progress to the authority so the system call
/// screen shows the right state.
struct OutgoingCallReporter {
    provider: Weak<dyn CallProvider>,
}

impl CallListener for OutgoingCallReporter {
    fn has_started_connecting_did_change(&self, call: &Call) {
        if let Some(provider) = self.provider.upgrade() {
            debug!("Reporting call {} started connecting", call.id());
            provider.report_outgoing_call_started_connecting(call.id(), call.connecting_date());
        }
    }

    fn has_connected_did_change(&self, call: &Call) {
        if let Some(provider) = self.provider.upgrade() {
            debug!("Reporting call {} connected", call.id());
            provider.report_outgoing_call_connected(call.id(), call.connect_date());
        }
    }
}

pub struct CallAuthorityAdapter {
    registry: Arc<CallRegistry>,
    provider: Arc<dyn CallProvider>,
    service: Arc<dyn CallService>,
    audio: broadcast::Sender<AudioEvent>,
}

impl CallAuthorityAdapter {
    /// Create the adapter and install it as the provider's delegate
    pub fn new(
        registry: Arc<CallRegistry>,
        provider: Arc<dyn CallProvider>,
        service: Arc<dyn CallService>,
    ) -> Arc<Self> {
        Self::with_capacity(registry, provider, service, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(
        registry: Arc<CallRegistry>,
        provider: Arc<dyn CallProvider>,
        service: Arc<dyn CallService>,
        capacity: usize,
    ) -> Arc<Self> {
        let (audio, _) = broadcast::channel(capacity.max(1));
        let adapter = Arc::new(Self {
            registry,
            provider,
            service,
            audio,
        });

        let weak = Arc::downgrade(&adapter);
        let delegate: Weak<dyn ProviderDelegate> = weak;
        adapter.provider.set_delegate(delegate);

        adapter
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    /// Subscribe to audio controller messages. Drop the receiver to unsubscribe.
    pub fn subscribe_audio(&self) -> broadcast::Receiver<AudioEvent> {
        self.audio.subscribe()
    }

    /// Subscribe to call changes and audio messages in emission order
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<BridgeEvent> {
        self.registry.events().subscribe()
    }

    // Incoming calls

    /// Ask the authority to surface an incoming call; register it if allowed.
    ///
    /// Calls can be denied for legitimate reasons (do not disturb, block
    /// list, ...). A denied call is never created. A call the authority shows
    /// but the registry refuses is reported back to the authority as failed.
    pub async fn report_incoming_call(&self, call_id: CallId, update: CallUpdate) -> Result<Arc<Call>> {
        let handle = update.remote_handle.value().to_string();

        if let Err(reason) = self.provider.report_new_incoming_call(call_id, update).await {
            warn!("Incoming call {} denied: {}", call_id, reason);
            metrics::record_incoming_report(false);
            return Err(DomainError::AuthorityDenied(reason));
        }

        metrics::record_incoming_report(true);

        let call = Arc::new(Call::incoming(call_id));
        call.set_handle(Some(handle));
        if let Err(e) = self.registry.add(Arc::clone(&call)) {
            warn!("Incoming call {} not registered: {}", call_id, e);
            self.provider
                .report_call_ended(call_id, Some(Utc::now()), CallEndedReason::Failed);
            return Err(e);
        }

        info!("Incoming call {} reported", call_id);
        Ok(call)
    }

    // Helpers

    fn post_audio(&self, event: AudioEvent) {
        debug!("Audio event: {}", event);
        self.registry.events().publish(event);
        if self.audio.send(event).is_err() {
            debug!("No subscribers for audio event {}", event);
        }
    }

    /// A registered call that can still change state
    fn live_call(&self, call_id: CallId) -> Result<Arc<Call>> {
        let call = self
            .registry
            .find(call_id)
            .ok_or(DomainError::UnknownCall(call_id))?;

        if call.has_ended() {
            return Err(DomainError::InvalidOperation(format!(
                "call {} has already ended",
                call_id
            )));
        }

        Ok(call)
    }

    fn complete(&self, action: &dyn Action, result: Result<()>) {
        match result {
            Ok(()) => {
                action.fulfill();
                metrics::record_action(action.kind().as_str(), "fulfilled");
            }
            Err(e) => {
                warn!("Failing {} for call {}: {}", action.kind(), action.call_id(), e);
                action.fail(e);
                metrics::record_action(action.kind().as_str(), "failed");
            }
        }
    }

    fn answer_call(&self, call_id: CallId) -> Result<()> {
        let call = self.live_call(call_id)?;

        // Audio starts only once the system activates the session
        self.post_audio(AudioEvent::ConfigureAudio);
        call.answer();

        info!("Call {} answered", call_id);
        Ok(())
    }

    fn set_held(&self, call_id: CallId, on_hold: bool) -> Result<()> {
        let call = self.live_call(call_id)?;

        call.set_on_hold(on_hold);
        if on_hold {
            self.post_audio(AudioEvent::StopAudio);
        } else {
            self.post_audio(AudioEvent::StartAudio);
        }

        info!("Call {} hold set to {}", call_id, on_hold);
        Ok(())
    }
}

impl ProviderDelegate for CallAuthorityAdapter {
    fn provider_did_reset(&self) {
        info!("Provider did reset");

        self.post_audio(AudioEvent::StopAudio);

        // Every call is invalid after a reset
        for call in self.registry.calls() {
            call.end();
        }
        self.registry.remove_all();
    }

    fn perform_start_call_action(&self, action: StartCallAction) {
        let call_id = action.call_id();

        if self.registry.find(call_id).is_some() {
            self.complete(&action, Err(DomainError::DuplicateCall(call_id)));
            return;
        }

        let call = Arc::new(Call::outgoing(call_id));
        call.set_handle(Some(action.handle().value().to_string()));

        // Audio starts only once the system activates the session
        self.post_audio(AudioEvent::ConfigureAudio);

        call.add_listener(Arc::new(OutgoingCallReporter {
            provider: Arc::downgrade(&self.provider),
        }));

        if let Err(e) = self.service.start_call(&call) {
            self.complete(&action, Err(e));
            return;
        }

        // Register before fulfilling so the authority never shows a call
        // the registry refused
        if let Err(e) = self.registry.add(Arc::clone(&call)) {
            self.complete(&action, Err(e));
            return;
        }
        self.complete(&action, Ok(()));
        call.start_connecting();

        info!("Outgoing call {} started", call_id);
    }

    fn perform_answer_call_action(&self, action: AnswerCallAction) {
        let result = self.answer_call(action.call_id());
        self.complete(&action, result);
    }

    fn perform_end_call_action(&self, action: EndCallAction) {
        let call_id = action.call_id();
        let Some(call) = self.registry.find(call_id) else {
            self.complete(&action, Err(DomainError::UnknownCall(call_id)));
            return;
        };

        self.post_audio(AudioEvent::StopAudio);
        call.end();
        self.complete(&action, Ok(()));
        self.registry.remove(&call);

        info!("Call {} ended", call_id);
    }

    fn perform_set_held_call_action(&self, action: SetHeldCallAction) {
        let result = self.set_held(action.call_id(), action.on_hold());
        self.complete(&action, result);
    }

    fn timed_out_performing_action(&self, action: CallAction) {
        warn!("Timed out performing {} for call {}", action.kind(), action.call_id());

        // Best effort: nothing is rolled back
        self.complete(&action, Ok(()));
    }

    fn did_activate_audio_session(&self) {
        info!("Audio session activated");
        self.post_audio(AudioEvent::StartAudio);
    }

    fn did_deactivate_audio_session(&self) {
        // Restoring non-call audio is up to the app
        info!("Audio session deactivated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::CallHandle;
    use crate::domain::telephony::port::{MockCallController, MockCallProvider, MockCallService};
    use crate::domain::telephony::{ActionOutcome, IncomingCallError};
    use tokio::sync::broadcast::error::TryRecvError;

    fn quiet_provider() -> MockCallProvider {
        let mut provider = MockCallProvider::new();
        provider.expect_set_delegate().return_const(());
        provider
            .expect_report_outgoing_call_started_connecting()
            .return_const(());
        provider.expect_report_outgoing_call_connected().return_const(());
        provider
            .expect_report_new_incoming_call()
            .returning(|_, _| Ok(()));
        provider
    }

    fn working_service() -> MockCallService {
        let mut service = MockCallService::new();
        service.expect_start_call().returning(|_| Ok(()));
        service
    }

    fn adapter_with(provider: MockCallProvider, service: MockCallService) -> Arc<CallAuthorityAdapter> {
        let registry = Arc::new(CallRegistry::new(Arc::new(MockCallController::new())));
        CallAuthorityAdapter::new(registry, Arc::new(provider), Arc::new(service))
    }

    fn adapter() -> Arc<CallAuthorityAdapter> {
        adapter_with(quiet_provider(), working_service())
    }

    fn audio_events(rx: &mut broadcast::Receiver<AudioEvent>) -> Vec<AudioEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    fn live_incoming(adapter: &CallAuthorityAdapter) -> Arc<Call> {
        let call = Arc::new(Call::incoming(CallId::new()));
        adapter.registry().add(call.clone()).unwrap();
        call
    }

    #[test]
    fn test_registers_as_delegate() {
        let mut provider = MockCallProvider::new();
        provider.expect_set_delegate().times(1).return_const(());

        let adapter = adapter_with(provider, MockCallService::new());

        assert!(adapter.registry().is_empty());
    }

    #[tokio::test]
    async fn test_incoming_call_accepted() {
        let adapter = adapter();
        let id = CallId::new();

        let call = adapter
            .report_incoming_call(id, CallUpdate::new(CallHandle::generic("Alice")))
            .await
            .unwrap();

        assert_eq!(adapter.registry().len(), 1);
        assert_eq!(call.id(), id);
        assert!(!call.is_outgoing());
        assert!(!call.has_started_connecting());
        assert_eq!(call.handle().as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_incoming_call_denied() {
        let mut provider = MockCallProvider::new();
        provider.expect_set_delegate().return_const(());
        provider
            .expect_report_new_incoming_call()
            .returning(|_, _| Err(IncomingCallError::FilteredByDoNotDisturb));
        let adapter = adapter_with(provider, MockCallService::new());

        let result = adapter
            .report_incoming_call(CallId::new(), CallUpdate::new(CallHandle::generic("Spam")))
            .await;

        assert_eq!(
            result.unwrap_err(),
            DomainError::AuthorityDenied(IncomingCallError::FilteredByDoNotDisturb)
        );
        assert!(adapter.registry().is_empty());
    }

    #[tokio::test]
    async fn test_incoming_call_refused_by_registry_is_ended() {
        let id = CallId::new();
        let mut provider = MockCallProvider::new();
        provider.expect_set_delegate().return_const(());
        provider
            .expect_report_new_incoming_call()
            .returning(|_, _| Ok(()));
        provider
            .expect_report_call_ended()
            .withf(move |call_id, at, reason| {
                *call_id == id && at.is_some() && *reason == CallEndedReason::Failed
            })
            .times(1)
            .return_const(());
        let adapter = adapter_with(provider, MockCallService::new());
        let existing = Arc::new(Call::incoming(id));
        adapter.registry().add(existing.clone()).unwrap();

        let result = adapter
            .report_incoming_call(id, CallUpdate::new(CallHandle::generic("Alice")))
            .await;

        assert_eq!(result.unwrap_err(), DomainError::DuplicateCall(id));
        assert_eq!(adapter.registry().len(), 1);
        assert!(Arc::ptr_eq(&adapter.registry().find(id).unwrap(), &existing));
    }

    #[test]
    fn test_start_action_success() {
        let id = CallId::new();
        let mut provider = MockCallProvider::new();
        provider.expect_set_delegate().return_const(());
        provider
            .expect_report_outgoing_call_started_connecting()
            .withf(move |call_id, at| *call_id == id && at.is_some())
            .times(1)
            .return_const(());
        let adapter = adapter_with(provider, working_service());
        let mut audio = adapter.subscribe_audio();

        let (action, mut outcome) = StartCallAction::new(id, CallHandle::generic("Bob"), false);
        adapter.perform_start_call_action(action);

        assert_eq!(outcome.try_recv().unwrap(), ActionOutcome::Fulfilled);
        let call = adapter.registry().find(id).unwrap();
        assert!(call.is_outgoing());
        assert!(call.has_started_connecting());
        assert_eq!(call.handle().as_deref(), Some("Bob"));
        assert_eq!(audio_events(&mut audio), vec![AudioEvent::ConfigureAudio]);
    }

    #[test]
    fn test_start_action_service_failure() {
        let mut service = MockCallService::new();
        service
            .expect_start_call()
            .returning(|_| Err(DomainError::ServiceFailure("no network".to_string())));
        let adapter = adapter_with(quiet_provider(), service);
        let id = CallId::new();

        let (action, mut outcome) = StartCallAction::new(id, CallHandle::generic("Bob"), false);
        adapter.perform_start_call_action(action);

        assert_eq!(
            outcome.try_recv().unwrap(),
            ActionOutcome::Failed(DomainError::ServiceFailure("no network".to_string()))
        );
        assert!(adapter.registry().find(id).is_none());
    }

    #[test]
    fn test_start_action_duplicate_identifier() {
        let adapter = adapter();
        let existing = live_incoming(&adapter);

        let (action, mut outcome) =
            StartCallAction::new(existing.id(), CallHandle::generic("Bob"), false);
        adapter.perform_start_call_action(action);

        assert_eq!(
            outcome.try_recv().unwrap(),
            ActionOutcome::Failed(DomainError::DuplicateCall(existing.id()))
        );
        assert_eq!(adapter.registry().len(), 1);
        assert!(!adapter.registry().find(existing.id()).unwrap().is_outgoing());
    }

    #[test]
    fn test_outgoing_connect_reported_to_authority() {
        let id = CallId::new();
        let mut provider = MockCallProvider::new();
        provider.expect_set_delegate().return_const(());
        provider
            .expect_report_outgoing_call_started_connecting()
            .return_const(());
        provider
            .expect_report_outgoing_call_connected()
            .withf(move |call_id, at| *call_id == id && at.is_some())
            .times(1)
            .return_const(());
        let adapter = adapter_with(provider, working_service());

        let (action, _outcome) = StartCallAction::new(id, CallHandle::generic("Bob"), false);
        adapter.perform_start_call_action(action);
        adapter.registry().find(id).unwrap().connect();
    }

    #[test]
    fn test_audio_interleaves_with_call_changes() {
        let adapter = adapter();
        let call = live_incoming(&adapter);
        let mut events = adapter.subscribe_events();

        let (hold, _held) = SetHeldCallAction::new(call.id(), true);
        adapter.perform_set_held_call_action(hold);
        let (end, _ended) = EndCallAction::new(call.id());
        adapter.perform_end_call_action(end);

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(match event {
                BridgeEvent::CallsChanged(event) => format!("calls:{}", event.call_count),
                BridgeEvent::Audio(audio) => audio.to_string(),
            });
        }
        assert_eq!(
            received,
            vec!["calls:1", "stopAudio", "stopAudio", "calls:1", "calls:0"]
        );
    }

    #[test]
    fn test_answer_action() {
        let adapter = adapter();
        let call = live_incoming(&adapter);
        let mut audio = adapter.subscribe_audio();

        let (action, mut outcome) = AnswerCallAction::new(call.id());
        adapter.perform_answer_call_action(action);

        assert_eq!(outcome.try_recv().unwrap(), ActionOutcome::Fulfilled);
        assert!(call.has_started_connecting());
        assert_eq!(audio_events(&mut audio), vec![AudioEvent::ConfigureAudio]);
    }

    #[test]
    fn test_answer_unknown_call_fails() {
        let adapter = adapter();
        let id = CallId::new();

        let (action, mut outcome) = AnswerCallAction::new(id);
        adapter.perform_answer_call_action(action);

        assert_eq!(
            outcome.try_recv().unwrap(),
            ActionOutcome::Failed(DomainError::UnknownCall(id))
        );
    }

    #[test]
    fn test_answer_ended_call_fails() {
        let adapter = adapter();
        let call = live_incoming(&adapter);
        call.end();

        let (action, mut outcome) = AnswerCallAction::new(call.id());
        adapter.perform_answer_call_action(action);

        assert!(matches!(
            outcome.try_recv().unwrap(),
            ActionOutcome::Failed(DomainError::InvalidOperation(_))
        ));
        assert!(!call.has_started_connecting());
    }

    #[test]
    fn test_end_action() {
        let adapter = adapter();
        let call = live_incoming(&adapter);
        let mut audio = adapter.subscribe_audio();

        let (action, mut outcome) = EndCallAction::new(call.id());
        adapter.perform_end_call_action(action);

        assert_eq!(outcome.try_recv().unwrap(), ActionOutcome::Fulfilled);
        assert!(call.has_ended());
        assert!(adapter.registry().find(call.id()).is_none());
        assert_eq!(audio_events(&mut audio), vec![AudioEvent::StopAudio]);
    }

    #[test]
    fn test_end_unknown_call_leaves_registry_untouched() {
        let adapter = adapter();
        let other = live_incoming(&adapter);
        let mut audio = adapter.subscribe_audio();
        let id = CallId::new();

        let (action, mut outcome) = EndCallAction::new(id);
        adapter.perform_end_call_action(action);

        assert_eq!(
            outcome.try_recv().unwrap(),
            ActionOutcome::Failed(DomainError::UnknownCall(id))
        );
        assert_eq!(adapter.registry().len(), 1);
        assert!(!other.has_ended());
        assert!(audio_events(&mut audio).is_empty());
    }

    #[test]
    fn test_set_held_toggles_audio() {
        let adapter = adapter();
        let call = live_incoming(&adapter);
        let mut audio = adapter.subscribe_audio();

        let (hold, mut held) = SetHeldCallAction::new(call.id(), true);
        adapter.perform_set_held_call_action(hold);
        assert_eq!(held.try_recv().unwrap(), ActionOutcome::Fulfilled);
        assert!(call.is_on_hold());

        let (resume, mut resumed) = SetHeldCallAction::new(call.id(), false);
        adapter.perform_set_held_call_action(resume);
        assert_eq!(resumed.try_recv().unwrap(), ActionOutcome::Fulfilled);
        assert!(!call.is_on_hold());

        assert_eq!(
            audio_events(&mut audio),
            vec![AudioEvent::StopAudio, AudioEvent::StartAudio]
        );
    }

    #[test]
    fn test_set_held_unknown_call_fails() {
        let adapter = adapter();
        let id = CallId::new();

        let (action, mut outcome) = SetHeldCallAction::new(id, true);
        adapter.perform_set_held_call_action(action);

        assert_eq!(
            outcome.try_recv().unwrap(),
            ActionOutcome::Failed(DomainError::UnknownCall(id))
        );
    }

    #[test]
    fn test_timeout_fulfills() {
        let adapter = adapter();

        let (action, mut outcome) = EndCallAction::new(CallId::new());
        adapter.timed_out_performing_action(CallAction::End(action));

        assert_eq!(outcome.try_recv().unwrap(), ActionOutcome::Fulfilled);
    }

    #[test]
    fn test_audio_session_callbacks() {
        let adapter = adapter();
        let mut audio = adapter.subscribe_audio();

        adapter.did_activate_audio_session();
        adapter.did_deactivate_audio_session();

        assert_eq!(audio_events(&mut audio), vec![AudioEvent::StartAudio]);
    }

    #[test]
    fn test_reset_ends_and_clears_everything() {
        let adapter = adapter();
        let ringing = live_incoming(&adapter);
        let held = live_incoming(&adapter);
        held.answer();
        held.connect();
        held.set_on_hold(true);
        let mut audio = adapter.subscribe_audio();

        adapter.provider_did_reset();

        assert!(adapter.registry().is_empty());
        assert!(ringing.has_ended());
        assert!(held.has_ended());
        assert_eq!(audio_events(&mut audio), vec![AudioEvent::StopAudio]);
    }

    #[test]
    fn test_reset_on_empty_registry() {
        let adapter = adapter();
        let mut calls = adapter.registry().subscribe();

        adapter.provider_did_reset();

        let event = calls.try_recv().unwrap();
        assert!(event.primary.is_none());
        assert!(adapter.registry().is_empty());
    }
}
