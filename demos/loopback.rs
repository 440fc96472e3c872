//! In-process broadcast walkthrough
//!
//! Run with: cargo run --example loopback [LISTENERS]
//!
//! Starts a broadcaster against the in-memory presence store and local
//! transport, joins the given number of listeners (default 2), pushes a
//! few audio frames, then has one listener leave and ends the broadcast.
//!
//! Set RUST_LOG=livecast=trace to see every state transition.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use livecast::capture::SyntheticCapture;
use livecast::console::{PasscodeGate, View};
use livecast::transport::AudioFrame;
use livecast::{
    BroadcasterSession, ListenerCounter, ListenerSession, LocalTransport, MemoryStore,
    SessionConfig,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listeners: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 2,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("livecast=debug".parse()?)
                .add_directive("loopback=debug".parse()?),
        )
        .init();

    let config = SessionConfig::default();
    let store = MemoryStore::new();
    let transport = LocalTransport::new();

    // Listener count follows the presence entries in the background
    let observer = store.client();
    let counter = ListenerCounter::attach(&observer, &config.listeners_path).await?;
    let mut count = counter.watch();
    tokio::spawn(counter.run());
    tokio::spawn(async move {
        while count.changed().await.is_ok() {
            let current = *count.borrow();
            tracing::info!(listeners = current, "Listener count");
        }
    });

    let mut gate = PasscodeGate::new("loopback");
    let view = View::from_fragment("#broadcaster");
    if !gate.unlock("loopback") {
        return Err("broadcaster console locked".into());
    }
    tracing::info!(view = ?view, "Console unlocked");

    let mut broadcaster = BroadcasterSession::new(
        config.clone(),
        transport.clone(),
        Arc::new(store.client()),
        SyntheticCapture::with_label("Loopback microphone"),
    );
    broadcaster.start().await?;
    println!("Broadcaster: {}", broadcaster.status().label());

    let mut sessions = Vec::with_capacity(listeners);
    for _ in 0..listeners {
        let mut listener =
            ListenerSession::new(config.clone(), transport.clone(), Arc::new(store.client()))
                .await?;
        listener.connect().await?;
        sessions.push(listener);
    }

    broadcaster.process_pending().await;
    for listener in sessions.iter_mut() {
        listener.process_pending().await;
        println!(
            "Listener {}: {}",
            listener.peer_id().map(|p| p.as_str()).unwrap_or("-"),
            listener.status().label()
        );
    }

    for seq in 0..10u32 {
        let payload = Bytes::from(vec![(seq % 256) as u8; 160]);
        broadcaster.send_audio(AudioFrame::new(seq * 20, payload));
        tokio::time::sleep(FRAME_INTERVAL).await;
    }
    for listener in sessions.iter_mut() {
        println!("Received {} frames", listener.drain_audio().len());
    }

    if let Some(mut first) = sessions.pop() {
        first.disconnect().await;
        broadcaster.process_pending().await;
        println!("One listener left, {} still attached", broadcaster.active_calls());
    }

    broadcaster.stop().await;
    for listener in sessions.iter_mut() {
        listener.process_pending().await;
        println!(
            "Listener: {} ({})",
            listener.status().label(),
            listener.message().unwrap_or("")
        );
    }

    let stats = broadcaster.stats();
    println!(
        "Accepted {} calls, sent {} frames ({} bytes)",
        stats.calls_accepted, stats.frames_sent, stats.bytes_sent
    );

    // Give the count task a turn to report the final value
    tokio::time::sleep(FRAME_INTERVAL).await;
    Ok(())
}
