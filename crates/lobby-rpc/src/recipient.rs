//! Send targets.

/// Failure to deliver an outbound envelope.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The target's transport offers no way to write.
    #[error("Invalid user socket")]
    InvalidSocket,
    /// The envelope could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Anything that can receive serialized envelopes.
///
/// Each recipient owns an independent request-id counter, so ids are only
/// unique per connection.
pub trait Recipient {
    /// Advance and return the recipient's outbound request id.
    fn next_message_id(&mut self) -> u64;

    /// Write one serialized envelope.
    fn send_text(&mut self, text: &str) -> Result<(), SendError>;
}
