//! Broadcaster session
//!
//! Owns the microphone, the well-known transport registration, and every
//! inbound listener call. Publishes liveness to the presence store and
//! arms the store-side revert so an abrupt exit still flips the record.

use std::collections::HashMap;
use std::future::Future;

use crate::capture::AudioCapture;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::registry::claim_identity;
use crate::stats::BroadcastStats;
use crate::store::{LivenessRecord, PresenceStore, StoreError, Value};
use crate::transport::{
    AudioFrame, CallEvent, CallId, CallOf, MediaCall, MediaStream, MediaTransport, PeerId,
    PeerRegistration, TransportError, TransportEvent,
};

use super::state::BroadcastStatus;

/// Single broadcaster state machine
///
/// All transitions happen through `&mut self`: user actions ([`start`],
/// [`stop`]) and transport events ([`handle_event`]). [`stop`] is safe from
/// any state and is also what [`run_until`] performs on shutdown.
///
/// [`start`]: Self::start
/// [`stop`]: Self::stop
/// [`handle_event`]: Self::handle_event
/// [`run_until`]: Self::run_until
pub struct BroadcasterSession<T: MediaTransport, S: PresenceStore, C: AudioCapture> {
    config: SessionConfig,
    transport: T,
    store: S,
    capture: C,

    status: BroadcastStatus,

    /// User-visible text for the last failure
    message: Option<String>,

    /// Captured microphone stream (exclusively owned)
    local_stream: Option<MediaStream>,

    /// Registration under the well-known identifier (exclusively owned)
    registration: Option<T::Registration>,

    /// Answered listener calls by id
    active_calls: HashMap<CallId, CallOf<T>>,

    /// Session token of the live record this session wrote, while its revert is armed
    published: Option<String>,

    stats: BroadcastStats,
}

impl<T, S, C> BroadcasterSession<T, S, C>
where
    T: MediaTransport,
    S: PresenceStore,
    C: AudioCapture,
{
    pub fn new(config: SessionConfig, transport: T, store: S, capture: C) -> Self {
        Self {
            config,
            transport,
            store,
            capture,
            status: BroadcastStatus::Idle,
            message: None,
            local_stream: None,
            registration: None,
            active_calls: HashMap::new(),
            published: None,
            stats: BroadcastStats::default(),
        }
    }

    pub fn status(&self) -> BroadcastStatus {
        self.status
    }

    /// Status text for the last failure, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.status == BroadcastStatus::Live
    }

    /// Registered identifier while live
    pub fn peer_id(&self) -> Option<&PeerId> {
        self.registration.as_ref().map(|r| r.peer_id())
    }

    /// Number of listener calls currently answered
    pub fn active_calls(&self) -> usize {
        self.active_calls.len()
    }

    /// The captured stream while it is held
    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local_stream.as_ref()
    }

    pub fn stats(&self) -> &BroadcastStats {
        &self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Acquire the microphone, claim the identifier, and go live
    ///
    /// Ignored while already starting or live. Every failure releases what
    /// was acquired, leaves the session in `Error`, and is returned without
    /// any retry.
    pub async fn start(&mut self) -> Result<()> {
        if !self.status.can_start() {
            tracing::debug!(status = %self.status, "Start ignored");
            return Ok(());
        }

        self.release().await;
        self.status = BroadcastStatus::Starting;
        self.message = None;
        tracing::info!(peer = %self.config.broadcaster_id, "Starting broadcast");

        let stream = match self
            .capture
            .acquire(&self.config.capture, self.config.media_buffer)
            .await
        {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        self.local_stream = Some(stream);

        let registration = match claim_identity(&self.transport, &self.config.broadcaster_id).await
        {
            Ok(registration) => registration,
            Err(e) => return Err(self.fail(e).await),
        };
        self.registration = Some(registration);

        if let Err(e) = self.publish_live().await {
            return Err(self.fail(e.into()).await);
        }

        self.status = BroadcastStatus::Live;
        self.stats.on_live();
        tracing::info!(peer = %self.config.broadcaster_id, "Broadcast live");

        Ok(())
    }

    async fn publish_live(&mut self) -> std::result::Result<(), StoreError> {
        let path = &self.config.liveness_path;
        let record = LivenessRecord::live(self.config.broadcaster_id.clone());

        // Arm first: a drop between arming and publishing still leaves the record offline
        self.store
            .arm_auto_revert(path, Some(LivenessRecord::offline().into()))
            .await?;
        self.published = record.session.clone();

        self.store.write(path, record.into()).await
    }

    /// End the broadcast and release everything; safe from any state
    pub async fn stop(&mut self) {
        let previous = self.status;
        self.release().await;
        self.status = BroadcastStatus::Idle;

        if previous != BroadcastStatus::Idle {
            tracing::info!(
                previous = %previous,
                calls_accepted = self.stats.calls_accepted,
                "Broadcast stopped"
            );
        }
    }

    /// Stop and consume the session
    pub async fn close(mut self) {
        self.stop().await;
    }

    /// Push a captured frame to every connected listener
    ///
    /// Returns the number of receivers reached; 0 unless live.
    pub fn send_audio(&mut self, frame: AudioFrame) -> usize {
        if self.status != BroadcastStatus::Live {
            return 0;
        }
        let Some(stream) = self.local_stream.as_ref() else {
            return 0;
        };

        let size = frame.data.len();
        let receivers = stream.send(frame);
        self.stats.on_frame(size);
        receivers
    }

    /// Apply one transport event
    pub async fn handle_event(&mut self, event: TransportEvent<CallOf<T>>) {
        match event {
            TransportEvent::Incoming(call) => self.accept(call),
            TransportEvent::Call { call_id, event } => self.on_call_event(call_id, event),
            TransportEvent::Disconnected => {
                if self.registration.is_some() {
                    self.fail(Error::Registration(TransportError::Disconnected))
                        .await;
                }
            }
            TransportEvent::Error(e) => {
                if self.registration.is_some() {
                    self.fail(Error::Registration(e)).await;
                }
            }
        }
    }

    fn accept(&mut self, mut call: CallOf<T>) {
        let stream = match (self.status, self.local_stream.as_ref()) {
            (BroadcastStatus::Live, Some(stream)) => stream.clone(),
            _ => {
                tracing::debug!(call_id = call.id(), status = %self.status, "Call rejected, not live");
                call.close();
                self.stats.calls_rejected += 1;
                return;
            }
        };

        call.answer(stream);
        tracing::info!(
            call_id = call.id(),
            listener = %call.remote_peer(),
            active = self.active_calls.len() + 1,
            "Listener call accepted"
        );

        self.active_calls.insert(call.id(), call);
        self.stats.calls_accepted += 1;
    }

    fn on_call_event(&mut self, call_id: CallId, event: CallEvent) {
        match event {
            CallEvent::Closed => {
                if let Some(call) = self.active_calls.remove(&call_id) {
                    self.stats.calls_closed += 1;
                    tracing::info!(
                        call_id = call_id,
                        listener = %call.remote_peer(),
                        active = self.active_calls.len(),
                        "Listener call closed"
                    );
                }
            }
            CallEvent::Error(e) => {
                if let Some(mut call) = self.active_calls.remove(&call_id) {
                    call.close();
                    self.stats.calls_closed += 1;
                    tracing::warn!(call_id = call_id, error = %e, "Listener call failed");
                }
            }
            // Listeners are receive-only
            CallEvent::RemoteStream(_) => {}
        }
    }

    /// Apply every event already delivered; returns how many were handled
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.registration.as_mut().and_then(|r| r.try_next_event()) {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Wait for the next transport event (None while not registered)
    pub async fn next_event(&mut self) -> Option<TransportEvent<CallOf<T>>> {
        match self.registration.as_mut() {
            Some(registration) => registration.next_event().await,
            None => None,
        }
    }

    /// Handle events until `shutdown` resolves, then stop
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

        self.stop().await;
    }

    async fn fail(&mut self, error: Error) -> Error {
        tracing::warn!(status = %self.status, error = %error, "Broadcast failed");

        self.release().await;
        self.status = BroadcastStatus::Error;
        self.message = Some(error.user_message());
        error
    }

    /// Release capture, registration, calls, and the live record
    async fn release(&mut self) {
        if let Some(stream) = self.local_stream.take() {
            let stopped = stream.stop_tracks();
            tracing::debug!(stream = stream.id(), tracks = stopped, "Capture released");
        }

        if let Some(mut registration) = self.registration.take() {
            registration.teardown();
        }
        for (_, mut call) in self.active_calls.drain() {
            call.close();
        }

        if let Some(session) = self.published.take() {
            let path = &self.config.liveness_path;
            let offline = Some(LivenessRecord::offline().into());

            // A successor may already have published under the same identifier
            match self.store.write_if(path, offline, published_by(session)).await {
                Ok(true) => {}
                Ok(false) => tracing::info!("Liveness record no longer ours, left in place"),
                Err(e) => tracing::warn!(error = %e, "Failed to clear liveness record"),
            }
            if let Err(e) = self.store.cancel_auto_revert(path).await {
                tracing::debug!(error = %e, "Failed to cancel liveness revert");
            }
            self.stats.on_stopped();
        }
    }
}

impl<T, S, C> Drop for BroadcasterSession<T, S, C>
where
    T: MediaTransport,
    S: PresenceStore,
    C: AudioCapture,
{
    fn drop(&mut self) {
        if let Some(stream) = self.local_stream.take() {
            stream.stop_tracks();
        }
        if let Some(mut registration) = self.registration.take() {
            registration.teardown();
        }
        for (_, mut call) in self.active_calls.drain() {
            call.close();
        }

        if let Some(session) = self.published.take() {
            let offline = Some(LivenessRecord::offline().into());
            let path = &self.config.liveness_path;
            let cleared = self.store.release_now(path, offline, published_by(session));
            tracing::debug!(
                peer = %self.config.broadcaster_id,
                cleared = cleared,
                "Broadcaster dropped while published"
            );
        }
    }
}

/// Guard accepting only the live record written under `session`
fn published_by(session: String) -> impl FnOnce(Option<&Value>) -> bool + Send {
    move |current| {
        current
            .and_then(Value::as_liveness)
            .is_some_and(|record| record.published_by(&session))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::capture::SyntheticCapture;
    use crate::store::{MemoryClient, MemoryStore};
    use crate::transport::LocalTransport;

    type TestBroadcaster =
        BroadcasterSession<LocalTransport, Arc<MemoryClient>, Arc<SyntheticCapture>>;

    fn broadcaster(
        transport: &LocalTransport,
        store: &MemoryStore,
        capture: Arc<SyntheticCapture>,
    ) -> TestBroadcaster {
        BroadcasterSession::new(
            SessionConfig::default(),
            transport.clone(),
            Arc::new(store.client()),
            capture,
        )
    }

    fn is_live(store: &MemoryStore) -> bool {
        store
            .get(&SessionConfig::default().liveness_path)
            .as_ref()
            .and_then(Value::as_liveness)
            .is_some_and(|r| r.is_live)
    }

    #[tokio::test]
    async fn test_start_goes_live_and_publishes() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let capture = Arc::new(SyntheticCapture::new());
        let mut session = broadcaster(&transport, &store, Arc::clone(&capture));

        session.start().await.unwrap();

        assert_eq!(session.status(), BroadcastStatus::Live);
        assert!(is_live(&store));
        assert!(transport.is_registered(&SessionConfig::default().broadcaster_id));
        assert_eq!(capture.active_streams(), 1);
        assert!(session.stats().live_since.is_some());

        let record = store.get(&SessionConfig::default().liveness_path).unwrap();
        let record = record.as_liveness().unwrap();
        assert_eq!(record.broadcaster_id.as_ref(), session.peer_id());
        assert!(record.started_at.and_then(|t| t.millis()).is_some());
    }

    #[tokio::test]
    async fn test_start_is_ignored_while_live() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let capture = Arc::new(SyntheticCapture::new());
        let mut session = broadcaster(&transport, &store, Arc::clone(&capture));

        session.start().await.unwrap();
        session.start().await.unwrap();

        assert_eq!(capture.acquisitions(), 1);
        assert_eq!(session.status(), BroadcastStatus::Live);
    }

    #[tokio::test]
    async fn test_capture_denied() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let mut session = broadcaster(&transport, &store, Arc::new(SyntheticCapture::denied()));

        let result = session.start().await;

        assert!(matches!(result, Err(Error::Capture(_))));
        assert_eq!(session.status(), BroadcastStatus::Error);
        assert_eq!(session.message(), Some("Microphone access denied."));
        assert_eq!(transport.registered_count(), 0);
        assert!(store.get(&SessionConfig::default().liveness_path).is_none());
    }

    #[tokio::test]
    async fn test_collision_releases_capture() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let _squatter = transport
            .register(Some(SessionConfig::default().broadcaster_id))
            .await
            .unwrap();

        let capture = Arc::new(SyntheticCapture::new());
        let mut session = broadcaster(&transport, &store, Arc::clone(&capture));
        let result = session.start().await;

        assert!(matches!(result, Err(Error::RegistrationCollision(_))));
        assert_eq!(session.status(), BroadcastStatus::Error);
        assert_eq!(session.message(), Some("Another broadcast is already active."));
        assert_eq!(capture.active_streams(), 0);
        assert!(store.get(&SessionConfig::default().liveness_path).is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let capture = Arc::new(SyntheticCapture::new());
        let mut session = broadcaster(&transport, &store, Arc::clone(&capture));

        session.stop().await;
        session.start().await.unwrap();
        session.stop().await;
        session.stop().await;

        assert_eq!(session.status(), BroadcastStatus::Idle);
        assert_eq!(capture.active_streams(), 0);
        assert_eq!(transport.registered_count(), 0);
        assert!(!is_live(&store));
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let mut session = broadcaster(&transport, &store, Arc::new(SyntheticCapture::new()));

        session.start().await.unwrap();
        session.stop().await;
        session.start().await.unwrap();

        assert!(session.is_live());
        assert!(is_live(&store));
        assert_eq!(session.stats().sessions_started, 2);
    }

    #[tokio::test]
    async fn test_accepts_and_tracks_calls() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let mut session = broadcaster(&transport, &store, Arc::new(SyntheticCapture::new()));
        session.start().await.unwrap();

        let mut listener = transport.register(None).await.unwrap();
        let mut call = listener.call(&SessionConfig::default().broadcaster_id, None);

        assert_eq!(session.process_pending().await, 1);
        assert_eq!(session.active_calls(), 1);
        assert!(matches!(
            listener.try_next_event(),
            Some(TransportEvent::Call { event: CallEvent::RemoteStream(_), .. })
        ));

        call.close();
        session.process_pending().await;
        assert_eq!(session.active_calls(), 0);
        assert_eq!(session.stats().calls_closed, 1);
    }

    #[tokio::test]
    async fn test_send_audio_reaches_listener() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let mut session = broadcaster(&transport, &store, Arc::new(SyntheticCapture::new()));

        assert_eq!(session.send_audio(AudioFrame::new(0, Bytes::from_static(b"x"))), 0);
        session.start().await.unwrap();

        let remote = session.local_stream().unwrap().clone();
        let mut rx = remote.subscribe();

        let reached = session.send_audio(AudioFrame::new(20, Bytes::from_static(b"frame")));
        assert_eq!(reached, 1);
        assert_eq!(rx.recv().await.unwrap().data, Bytes::from_static(b"frame"));
        assert_eq!(session.stats().frames_sent, 1);
        assert_eq!(session.stats().bytes_sent, 5);
    }

    #[tokio::test]
    async fn test_transport_loss_while_live() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let capture = Arc::new(SyntheticCapture::new());
        let mut session = broadcaster(&transport, &store, Arc::clone(&capture));
        session.start().await.unwrap();

        transport.force_disconnect(&SessionConfig::default().broadcaster_id);
        session.process_pending().await;

        assert_eq!(session.status(), BroadcastStatus::Error);
        assert_eq!(session.message(), Some("Stream error: disconnected"));
        assert_eq!(capture.active_streams(), 0);
        assert!(!is_live(&store));
    }

    #[tokio::test]
    async fn test_dropped_store_connection_reverts_liveness() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let client = Arc::new(store.client());
        let mut session = BroadcasterSession::new(
            SessionConfig::default(),
            transport.clone(),
            Arc::clone(&client),
            SyntheticCapture::new(),
        );
        session.start().await.unwrap();
        assert!(is_live(&store));

        client.disconnect();

        assert!(!is_live(&store));
    }

    #[tokio::test]
    async fn test_drop_releases_registration() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let capture = Arc::new(SyntheticCapture::new());

        {
            let mut session = broadcaster(&transport, &store, Arc::clone(&capture));
            session.start().await.unwrap();
        }

        assert_eq!(transport.registered_count(), 0);
        assert_eq!(capture.active_streams(), 0);
        assert!(!is_live(&store));
    }

    #[tokio::test]
    async fn test_drop_clears_liveness_while_client_stays_connected() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let client = Arc::new(store.client());

        {
            let mut session = BroadcasterSession::new(
                SessionConfig::default(),
                transport.clone(),
                Arc::clone(&client),
                SyntheticCapture::new(),
            );
            session.start().await.unwrap();
            assert!(is_live(&store));
        }

        assert!(client.is_connected());
        assert!(!is_live(&store));
        assert_eq!(store.armed_count(client.connection_id()), 0);
        assert_eq!(transport.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_session_keeps_successor_record() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let first_client = Arc::new(store.client());
        let mut first = BroadcasterSession::new(
            SessionConfig::default(),
            transport.clone(),
            Arc::clone(&first_client),
            SyntheticCapture::new(),
        );
        let mut second = broadcaster(&transport, &store, Arc::new(SyntheticCapture::new()));

        first.start().await.unwrap();
        transport.force_disconnect(&SessionConfig::default().broadcaster_id);
        second.start().await.unwrap();

        // The first session only now learns it lost the identifier
        first.process_pending().await;

        assert_eq!(first.status(), BroadcastStatus::Error);
        assert_eq!(second.status(), BroadcastStatus::Live);
        assert!(is_live(&store));
        assert!(transport.is_registered(&SessionConfig::default().broadcaster_id));
        assert_eq!(store.armed_count(first_client.connection_id()), 0);

        // Neither a later drop nor a lost connection of the first session touches it
        drop(first);
        first_client.disconnect();
        assert!(is_live(&store));
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let transport = LocalTransport::new();
        let store = MemoryStore::new();
        let mut session = broadcaster(&transport, &store, Arc::new(SyntheticCapture::new()));
        session.start().await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();
        session
            .run_until(async {
                let _ = rx.await;
            })
            .await;

        assert_eq!(session.status(), BroadcastStatus::Idle);
        assert!(!is_live(&store));
    }
}
