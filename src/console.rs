//! Console surface helpers
//!
//! Routing between the home, broadcaster, and listener views, and the
//! passcode prompt in front of the broadcaster console. The gate is a
//! plain comparison that keeps casual visitors out; it is not access control.

/// Top-level console view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Home,
    Broadcaster,
    Listener,
}

impl View {
    /// Resolve a location fragment such as `#listener`
    ///
    /// Anything unrecognized, including an empty fragment, is the home view.
    pub fn from_fragment(fragment: &str) -> Self {
        match fragment.trim_start_matches('#') {
            "broadcaster" => View::Broadcaster,
            "listener" => View::Listener,
            _ => View::Home,
        }
    }

    /// Fragment that navigates to this view
    pub fn fragment(&self) -> &'static str {
        match self {
            View::Home => "",
            View::Broadcaster => "#broadcaster",
            View::Listener => "#listener",
        }
    }
}

/// Message shown after a wrong passcode
pub const INVALID_PASSCODE: &str = "Invalid passcode.";

/// Passcode prompt for the broadcaster console
#[derive(Debug, Clone)]
pub struct PasscodeGate {
    passcode: String,
    unlocked: bool,
    message: Option<&'static str>,
}

impl PasscodeGate {
    pub fn new(passcode: impl Into<String>) -> Self {
        Self {
            passcode: passcode.into(),
            unlocked: false,
            message: None,
        }
    }

    /// Try a passcode; returns whether the gate is now open
    pub fn unlock(&mut self, attempt: &str) -> bool {
        if attempt == self.passcode {
            self.unlocked = true;
            self.message = None;
        } else {
            tracing::debug!("Passcode rejected");
            self.message = Some(INVALID_PASSCODE);
        }
        self.unlocked
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Close the gate again, e.g. when leaving the console
    pub fn lock(&mut self) {
        self.unlocked = false;
        self.message = None;
    }

    /// Feedback for the last attempt
    pub fn message(&self) -> Option<&str> {
        self.message
    }
}
