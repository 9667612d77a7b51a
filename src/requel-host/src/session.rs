//! Opaque host session handle.

/// Token identifying a host optimizer session.
///
/// The core never interprets the value; extractor and cost-estimator
/// implementations own whatever mapping it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Wrap a host-provided token.
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    /// The raw token.
    pub fn token(&self) -> u64 {
        self.0
    }
}
