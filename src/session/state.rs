//! Session lifecycle states

/// Broadcaster lifecycle
///
/// ```text
///   Idle ──start──► Starting ──registered──► Live
///                      │                      │
///                      └──capture/claim──► Error ◄──transport failure
///   stop() from any state ──► Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    /// Nothing acquired
    Idle,
    /// Acquiring capture and claiming the identifier
    Starting,
    /// Registered, published, accepting listeners
    Live,
    /// Last attempt failed; everything was released
    Error,
}

impl BroadcastStatus {
    /// Whether a start request would begin a new attempt
    pub fn can_start(&self) -> bool {
        matches!(self, BroadcastStatus::Idle | BroadcastStatus::Error)
    }

    /// Console label
    pub fn label(&self) -> &'static str {
        match self {
            BroadcastStatus::Idle | BroadcastStatus::Error => "System Idle",
            BroadcastStatus::Starting => "Preparing...",
            BroadcastStatus::Live => "Live on Air",
        }
    }
}

impl std::fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BroadcastStatus::Idle => "idle",
            BroadcastStatus::Starting => "starting",
            BroadcastStatus::Live => "live",
            BroadcastStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Listener lifecycle
///
/// ```text
///   Idle ──connect──► Connecting ──remote stream──► Connected
///                         │                           │
///                         └──error / ended──► Offline ◄┘
///   disconnect() from any state ──► Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Idle,
    Connecting,
    Connected,
    Offline,
}

impl ListenerStatus {
    /// Whether the session currently holds a call attempt
    pub fn is_attached(&self) -> bool {
        matches!(self, ListenerStatus::Connecting | ListenerStatus::Connected)
    }

    /// Console label for the entry button
    pub fn label(&self) -> &'static str {
        match self {
            ListenerStatus::Connecting => "SYNCING...",
            ListenerStatus::Connected => "Receiving Signal",
            ListenerStatus::Idle | ListenerStatus::Offline => "ENTER STREAM",
        }
    }
}

impl std::fmt::Display for ListenerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ListenerStatus::Idle => "idle",
            ListenerStatus::Connecting => "connecting",
            ListenerStatus::Connected => "connected",
            ListenerStatus::Offline => "offline",
        };
        f.write_str(name)
    }
}
