use core::fmt;

/// A payload received on a rendezvous channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the payload was published on.
    pub channel: String,
    /// Opaque payload text.
    pub payload: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.channel, self.payload)
    }
}
