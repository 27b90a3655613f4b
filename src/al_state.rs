//! Slave application-layer (AL) state, as reported in the AL status register.

use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// A slave's AL state, optionally combined with the `ACK_ERR` flag that
    /// the slave sets when it could not carry out a requested state
    /// transition.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct AlState: u8 {
        /// INIT.
        const INIT = 0x01;
        /// PRE-OP.
        const PREOP = 0x02;
        /// SAFE-OP.
        const SAFEOP = 0x04;
        /// OP.
        const OP = 0x08;
        /// Error acknowledge flag, set by the slave alongside the state it
        /// could not leave.
        const ACK_ERR = 0x10;
    }
}

impl Default for AlState {
    fn default() -> Self {
        AlState::INIT
    }
}

impl fmt::Display for AlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = *self & !AlState::ACK_ERR;

        let name = if base.contains(AlState::OP) {
            "OP"
        } else if base.contains(AlState::SAFEOP) {
            "SAFEOP"
        } else if base.contains(AlState::PREOP) {
            "PREOP"
        } else {
            "INIT"
        };

        if self.contains(AlState::ACK_ERR) {
            write!(f, "{}+ACK_ERR", name)
        } else {
            f.write_str(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(AlState::INIT.to_string(), "INIT");
        assert_eq!(
            (AlState::PREOP | AlState::ACK_ERR).to_string(),
            "PREOP+ACK_ERR"
        );
    }

    #[test]
    fn ack_err_is_separate_from_base_state() {
        let s = AlState::OP | AlState::ACK_ERR;
        assert!(s.contains(AlState::ACK_ERR));
        assert!(s.contains(AlState::OP));
    }
}
