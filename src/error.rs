//! Crate error types.

use crate::al_state::AlState;

/// An error produced by the domain engine or a slave's request state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Error {
    /// Allocation of the domain's internal process image failed.
    OutOfMemory,

    /// A configuration problem was detected, e.g. no matching slave
    /// configuration was found, or an FMMU is larger than a single
    /// datagram can carry.
    Configuration,

    /// A datagram did not return before the scheduler gave up on it.
    LinkTimeout,

    /// A datagram returned with an unexpected working counter.
    WireMismatch {
        /// The working counter that was expected.
        expected: u16,

        /// The working counter that was actually received.
        received: u16,
    },

    /// The protocol-layer sub state machine (CoE, FoE, SoE) driving a
    /// request reported failure.
    SubFsmFailure,

    /// A request was submitted while the slave was in a state that forbids
    /// it (`ACK_ERR` set, or `INIT` for request kinds that require a later
    /// state).
    Precondition {
        /// The slave's AL state at the time the request was rejected.
        al_state: AlState,
    },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::OutOfMemory => f.write_str("out of memory"),
            Error::Configuration => f.write_str("configuration error"),
            Error::LinkTimeout => f.write_str("link timeout"),
            Error::WireMismatch { expected, received } => write!(
                f,
                "working counter mismatch: expected {}, received {}",
                expected, received
            ),
            Error::SubFsmFailure => f.write_str("sub state machine reported failure"),
            Error::Precondition { al_state } => {
                write!(f, "request precondition violated, slave state {}", al_state)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_values() {
        let e = Error::WireMismatch {
            expected: 3,
            received: 1,
        };
        assert_eq!(
            e.to_string(),
            "working counter mismatch: expected 3, received 1"
        );
    }
}
