//! Listener session
//!
//! Follows the liveness record, joins the broadcast through an anonymous
//! registration, announces itself under the listeners path, and plays the
//! remote stream.

use std::future::Future;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::registry::register_anonymous;
use crate::store::{LivenessRecord, PresenceEntry, PresenceStore, StoreError, StorePath};
use crate::transport::{
    AudioFrame, CallEvent, CallOf, MediaCall, MediaTransport, PeerId, PeerRegistration,
    TransportError, TransportEvent,
};

use super::liveness::{LivenessChange, LivenessWatch};
use super::playback::Playback;
use super::state::ListenerStatus;

/// Input to the listener state machine
#[derive(Debug)]
pub enum ListenerEvent<C> {
    /// A new liveness record (None when absent)
    Liveness(Option<LivenessRecord>),
    /// An event from the listener's own registration
    Transport(TransportEvent<C>),
}

/// Listener state machine
pub struct ListenerSession<T: MediaTransport, S: PresenceStore> {
    config: SessionConfig,
    transport: T,
    store: S,

    status: ListenerStatus,
    message: Option<String>,

    liveness: LivenessWatch,

    /// Anonymous registration (exclusively owned)
    registration: Option<T::Registration>,

    /// Outbound call to the broadcaster
    active_call: Option<CallOf<T>>,

    /// Presence entry written for the current attempt
    presence_path: Option<StorePath>,

    playback: Playback,
}

impl<T, S> ListenerSession<T, S>
where
    T: MediaTransport,
    S: PresenceStore,
{
    /// Create an idle listener following the liveness record
    pub async fn new(config: SessionConfig, transport: T, store: S) -> Result<Self> {
        let liveness = LivenessWatch::attach(&store, &config.liveness_path).await?;
        let playback = Playback::new(config.autoplay);

        tracing::debug!(live = liveness.is_live(), "Listener attached to liveness");

        Ok(Self {
            config,
            transport,
            store,
            status: ListenerStatus::Idle,
            message: None,
            liveness,
            registration: None,
            active_call: None,
            presence_path: None,
            playback,
        })
    }

    pub fn status(&self) -> ListenerStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether the broadcaster is currently reported live
    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    pub fn liveness(&self) -> Option<&LivenessRecord> {
        self.liveness.record()
    }

    /// Whether joining is currently offered
    pub fn can_connect(&self) -> bool {
        self.is_live() && !self.status.is_attached()
    }

    /// Anonymous identifier while attached
    pub fn peer_id(&self) -> Option<&PeerId> {
        self.registration.as_ref().map(|r| r.peer_id())
    }

    /// Presence entry path while attached
    pub fn presence_path(&self) -> Option<&StorePath> {
        self.presence_path.as_ref()
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Join the broadcast
    ///
    /// Ignored while already connecting or connected. Failures end in
    /// `Offline` with a user-visible message.
    pub async fn connect(&mut self) -> Result<()> {
        if self.status.is_attached() {
            tracing::debug!(status = %self.status, "Connect ignored");
            return Ok(());
        }

        self.release().await;
        self.status = ListenerStatus::Connecting;
        self.message = None;

        let mut registration = match register_anonymous(&self.transport).await {
            Ok(registration) => registration,
            Err(Error::Registration(e)) => {
                return Err(self.go_offline(Error::Connection(e)).await);
            }
            Err(e) => return Err(self.go_offline(e).await),
        };
        let peer = registration.peer_id().clone();
        tracing::info!(peer = %peer, broadcaster = %self.config.broadcaster_id, "Joining broadcast");

        let path = self.config.listeners_path.child(peer.as_str());
        self.presence_path = Some(path.clone());
        if let Err(e) = self.announce(&path).await {
            self.registration = Some(registration);
            return Err(self.go_offline(e.into()).await);
        }

        let call = registration.call(&self.config.broadcaster_id, None);
        tracing::debug!(peer = %peer, call_id = call.id(), "Calling broadcaster");

        self.active_call = Some(call);
        self.registration = Some(registration);
        Ok(())
    }

    async fn announce(&self, path: &StorePath) -> std::result::Result<(), StoreError> {
        // Removal is armed first so the entry never outlives the connection
        self.store.arm_auto_revert(path, None).await?;
        self.store.write(path, PresenceEntry::active().into()).await
    }

    /// Leave the broadcast and return to idle; safe from any state
    pub async fn disconnect(&mut self) {
        let previous = self.status;
        self.release().await;
        self.status = ListenerStatus::Idle;
        self.message = None;

        if previous.is_attached() {
            tracing::info!(previous = %previous, "Listener disconnected");
        }
    }

    /// Disconnect and consume the session
    pub async fn close(mut self) {
        self.disconnect().await;
    }

    /// User gesture on the play control; returns whether audio is playing
    pub fn toggle_playback(&mut self) -> bool {
        let playing = self.playback.toggle();
        if playing && self.message == Some(Error::PlaybackBlocked.user_message()) {
            self.message = None;
        }
        playing
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.playback.set_volume(volume);
    }

    /// Frames received since the last call (empty while paused)
    pub fn drain_audio(&mut self) -> Vec<AudioFrame> {
        self.playback.drain_frames()
    }

    /// Apply one event
    pub async fn handle_event(&mut self, event: ListenerEvent<CallOf<T>>) {
        match event {
            ListenerEvent::Liveness(record) => {
                let change = self.liveness.update(record);
                tracing::debug!(change = ?change, status = %self.status, "Liveness update");

                if change == LivenessChange::WentOffline && self.status.is_attached() {
                    self.go_offline(Error::BroadcastEnded).await;
                }
            }
            ListenerEvent::Transport(event) => self.on_transport_event(event).await,
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent<CallOf<T>>) {
        match event {
            TransportEvent::Call { call_id, event } => {
                if self.active_call.as_ref().map(|c| c.id()) != Some(call_id) {
                    tracing::trace!(call_id = call_id, "Event for stale call ignored");
                    return;
                }

                match event {
                    CallEvent::RemoteStream(stream) => {
                        self.status = ListenerStatus::Connected;
                        tracing::info!(call_id = call_id, stream = stream.id(), "Connected to broadcast");

                        if let Err(e) = self.playback.attach(stream) {
                            self.message = Some(e.user_message());
                        }
                    }
                    CallEvent::Closed => {
                        self.go_offline(Error::BroadcastEnded).await;
                    }
                    CallEvent::Error(TransportError::PeerUnavailable(peer)) => {
                        self.go_offline(Error::ConnectionUnavailable(peer)).await;
                    }
                    CallEvent::Error(e) => {
                        self.go_offline(Error::Connection(e)).await;
                    }
                }
            }
            TransportEvent::Incoming(mut call) => {
                tracing::debug!(call_id = call.id(), from = %call.remote_peer(), "Inbound call rejected");
                call.close();
            }
            TransportEvent::Disconnected => {
                if self.registration.is_some() {
                    self.go_offline(Error::Connection(TransportError::Disconnected))
                        .await;
                }
            }
            TransportEvent::Error(e) => {
                if self.registration.is_some() {
                    self.go_offline(Error::Connection(e)).await;
                }
            }
        }
    }

    /// Apply every event already delivered, liveness first
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;

        while let Some(record) = self.liveness.try_next() {
            self.handle_event(ListenerEvent::Liveness(record)).await;
            handled += 1;
        }
        while let Some(event) = self.registration.as_mut().and_then(|r| r.try_next_event()) {
            self.handle_event(ListenerEvent::Transport(event)).await;
            handled += 1;
        }

        handled
    }

    /// Wait for the next liveness or transport event
    ///
    /// Returns None once neither source can produce anything.
    pub async fn next_event(&mut self) -> Option<ListenerEvent<CallOf<T>>> {
        let liveness = &mut self.liveness;
        let registration = &mut self.registration;

        tokio::select! {
            Some(record) = liveness.next() => Some(ListenerEvent::Liveness(record)),
            Some(event) = async {
                match registration.as_mut() {
                    Some(registration) => registration.next_event().await,
                    None => None,
                }
            } => Some(ListenerEvent::Transport(event)),
            else => None,
        }
    }

    /// Handle events until `shutdown` resolves, then disconnect
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => None,
                Some(event) = self.next_event() => Some(event),
            };

            match event {
                Some(event) => self.handle_event(event).await,
                None => break,
            }
        }

        self.disconnect().await;
    }

    async fn go_offline(&mut self, error: Error) -> Error {
        tracing::info!(status = %self.status, reason = %error, "Listener offline");

        self.release().await;
        self.status = ListenerStatus::Offline;
        self.message = Some(error.user_message());
        error
    }

    /// Release the call, registration, presence entry, and playback
    async fn release(&mut self) {
        if let Some(mut call) = self.active_call.take() {
            call.close();
        }
        if let Some(mut registration) = self.registration.take() {
            registration.teardown();
        }

        if let Some(path) = self.presence_path.take() {
            if let Err(e) = self.store.delete(&path).await {
                tracing::warn!(path = %path, error = %e, "Failed to remove presence entry");
            }
            if let Err(e) = self.store.cancel_auto_revert(&path).await {
                tracing::debug!(path = %path, error = %e, "Failed to cancel presence removal");
            }
        }

        self.playback.clear();
    }
}

impl<T, S> Drop for ListenerSession<T, S>
where
    T: MediaTransport,
    S: PresenceStore,
{
    fn drop(&mut self) {
        if let Some(mut call) = self.active_call.take() {
            call.close();
        }
        if let Some(mut registration) = self.registration.take() {
            registration.teardown();
        }

        if let Some(path) = self.presence_path.take() {
            let removed = self.store.release_now(&path, None, |_| true);
            tracing::debug!(path = %path, removed = removed, "Listener dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::capture::CaptureConstraints;
    use crate::session::AutoplayPolicy;
    use crate::store::{MemoryClient, MemoryStore, Value};
    use crate::transport::{LocalCall, LocalRegistration, LocalTransport, MediaStream, MediaTrack};

    type TestListener = ListenerSession<LocalTransport, Arc<MemoryClient>>;

    async fn listener(
        config: SessionConfig,
        transport: &LocalTransport,
        store: &MemoryStore,
    ) -> TestListener {
        ListenerSession::new(config, transport.clone(), Arc::new(store.client()))
            .await
            .unwrap()
    }

    /// Stand-in broadcaster: registers the well-known id and publishes liveness
    async fn fake_broadcaster(
        transport: &LocalTransport,
        store: &MemoryStore,
    ) -> (LocalRegistration, MemoryClient) {
        let config = SessionConfig::default();
        let registration = transport
            .register(Some(config.broadcaster_id.clone()))
            .await
            .unwrap();
        let client = store.client();
        client
            .write(
                &config.liveness_path,
                LivenessRecord::live(config.broadcaster_id).into(),
            )
            .await
            .unwrap();
        (registration, client)
    }

    /// Answer every waiting call; the calls stay open while the handles live
    fn answer_pending(registration: &mut LocalRegistration, stream: &MediaStream) -> Vec<LocalCall> {
        let mut calls = Vec::new();
        while let Some(event) = registration.try_next_event() {
            if let TransportEvent::Incoming(mut call) = event {
                call.answer(stream.clone());
                calls.push(call);
            }
        }
        calls
    }

    #[tokio::test]
    async fn test_new_reflects_liveness() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();

        let session = listener(SessionConfig::default(), &transport, &store).await;
        assert!(!session.is_live());
        assert!(!session.can_connect());
        assert_eq!(session.status(), ListenerStatus::Idle);

        let (_reg, _client) = fake_broadcaster(&transport, &store).await;
        let session = listener(SessionConfig::default(), &transport, &store).await;
        assert!(session.is_live());
        assert!(session.can_connect());
    }

    #[tokio::test]
    async fn test_connect_announces_presence_and_plays() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (mut broadcaster, _client) = fake_broadcaster(&transport, &store).await;
        let stream = MediaStream::empty();

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        assert_eq!(session.status(), ListenerStatus::Connecting);

        let path = session.presence_path().cloned().unwrap();
        assert_eq!(
            store.get(&path).as_ref().and_then(Value::as_presence),
            Some(&PresenceEntry::active())
        );

        let _calls = answer_pending(&mut broadcaster, &stream);
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Connected);
        assert!(session.playback().is_playing());
        assert!(!session.can_connect());
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (_broadcaster, _client) = fake_broadcaster(&transport, &store).await;

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        let path = session.presence_path().cloned().unwrap();
        let peer = session.peer_id().cloned().unwrap();

        session.disconnect().await;

        assert_eq!(session.status(), ListenerStatus::Idle);
        assert!(store.get(&path).is_none());
        assert!(!transport.is_registered(&peer));
        assert!(session.message().is_none());
        assert!(!session.playback().has_source());
    }

    #[tokio::test]
    async fn test_unavailable_broadcaster() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        let path = session.presence_path().cloned().unwrap();
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Offline);
        assert_eq!(session.message(), Some("Broadcast offline or signal lost."));
        assert!(store.get(&path).is_none());
        assert_eq!(transport.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_liveness_flip_forces_offline() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (mut broadcaster, client) = fake_broadcaster(&transport, &store).await;
        let stream = MediaStream::empty();

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        let _calls = answer_pending(&mut broadcaster, &stream);
        session.process_pending().await;
        assert_eq!(session.status(), ListenerStatus::Connected);

        client
            .write(
                &SessionConfig::default().liveness_path,
                LivenessRecord::offline().into(),
            )
            .await
            .unwrap();
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Offline);
        assert_eq!(session.message(), Some("Broadcast has ended."));
        assert!(!session.can_connect());
    }

    #[tokio::test]
    async fn test_liveness_while_idle_keeps_idle() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (_broadcaster, client) = fake_broadcaster(&transport, &store).await;

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        client
            .write(
                &SessionConfig::default().liveness_path,
                LivenessRecord::offline().into(),
            )
            .await
            .unwrap();
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Idle);
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn test_autoplay_blocked_then_toggled() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (mut broadcaster, _client) = fake_broadcaster(&transport, &store).await;
        let stream = MediaStream::new(vec![MediaTrack::new("mic", CaptureConstraints::default())], 8);

        let config = SessionConfig::default().autoplay(AutoplayPolicy::RequiresGesture);
        let mut session = listener(config, &transport, &store).await;
        session.connect().await.unwrap();
        let _calls = answer_pending(&mut broadcaster, &stream);
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Connected);
        assert_eq!(session.message(), Some("Tap to activate sound"));
        assert!(!session.playback().is_playing());

        assert!(session.toggle_playback());
        assert!(session.message().is_none());

        stream.send(AudioFrame::new(0, Bytes::from_static(b"pcm")));
        assert_eq!(session.drain_audio().len(), 1);
    }

    #[tokio::test]
    async fn test_registration_loss() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (_broadcaster, _client) = fake_broadcaster(&transport, &store).await;

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        let peer = session.peer_id().cloned().unwrap();

        transport.force_disconnect(&peer);
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Offline);
        assert!(session.presence_path().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_after_offline() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        session.process_pending().await;
        assert_eq!(session.status(), ListenerStatus::Offline);

        let (_broadcaster, _client) = fake_broadcaster(&transport, &store).await;
        session.process_pending().await;
        assert!(session.can_connect());

        session.connect().await.unwrap();
        assert_eq!(session.status(), ListenerStatus::Connecting);
        assert!(session.message().is_none());
    }

    #[tokio::test]
    async fn test_liveness_flip_while_connecting() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (_broadcaster, client) = fake_broadcaster(&transport, &store).await;

        let mut session = listener(SessionConfig::default(), &transport, &store).await;
        session.connect().await.unwrap();
        assert_eq!(session.status(), ListenerStatus::Connecting);
        let path = session.presence_path().cloned().unwrap();
        let peer = session.peer_id().cloned().unwrap();

        client
            .write(
                &SessionConfig::default().liveness_path,
                LivenessRecord::offline().into(),
            )
            .await
            .unwrap();
        session.process_pending().await;

        assert_eq!(session.status(), ListenerStatus::Offline);
        assert_eq!(session.message(), Some("Broadcast has ended."));
        assert!(store.get(&path).is_none());
        assert!(!transport.is_registered(&peer));
        assert!(session.peer_id().is_none());
    }

    #[tokio::test]
    async fn test_drop_removes_presence_while_client_stays_connected() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let (_broadcaster, _bc) = fake_broadcaster(&transport, &store).await;
        let client = Arc::new(store.client());

        let path = {
            let mut session = ListenerSession::new(
                SessionConfig::default(),
                transport.clone(),
                Arc::clone(&client),
            )
            .await
            .unwrap();
            session.connect().await.unwrap();
            session.presence_path().cloned().unwrap()
        };

        assert!(client.is_connected());
        assert!(store.get(&path).is_none());
        assert_eq!(store.armed_count(client.connection_id()), 0);
        assert_eq!(transport.registered_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_registration_reads_as_interrupted() {
        struct Unreachable;

        impl MediaTransport for Unreachable {
            type Registration = LocalRegistration;

            async fn register(
                &self,
                _id: Option<PeerId>,
            ) -> std::result::Result<LocalRegistration, TransportError> {
                Err(TransportError::Network("signaling unreachable".into()))
            }
        }

        let store = MemoryStore::new();
        let mut session =
            ListenerSession::new(SessionConfig::default(), Unreachable, Arc::new(store.client()))
                .await
                .unwrap();

        let result = session.connect().await;

        assert!(matches!(result, Err(Error::Connection(TransportError::Network(_)))));
        assert_eq!(session.status(), ListenerStatus::Offline);
        assert_eq!(session.message(), Some("Connection interrupted."));
        assert!(session.presence_path().is_none());
    }
}
