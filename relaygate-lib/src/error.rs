use thiserror::Error;

/// Raised by any host-mutation step once the NAT rule is installed.
///
/// A single sentinel type so the supervisor has one catch point: everything
/// reaching it means "something we already mutated on the host needs a full
/// cleanup pass", regardless of which component raised it.
#[derive(Debug, Error)]
#[error("fatal host-mutation error: {0}")]
pub struct Fatal(pub String);

impl Fatal {
    pub fn new(msg: impl Into<String>) -> Self {
        Fatal(msg.into())
    }
}
