//! Protocol-layer sub state machines and the transfer payloads they drive.
//!
//! CoE (SDO), FoE and SoE are each a black box here: the real protocol logic
//! (mailbox framing, segmentation, retries) lives outside this crate. All we
//! need is the cooperative polling shape: `transfer` to start, repeated
//! `exec` to drive it, `success` once `exec` reports done.

use crate::fmmu_config::Direction;

/// Result of one cooperative step of a [`SubFsm`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FsmPoll {
    /// More work remains; call `exec()` again next cycle.
    Pending,
    /// The transfer has finished, successfully or not - see
    /// [`SubFsm::success`].
    Done,
}

/// A protocol-layer sub state machine driving one transfer of type `T` to
/// completion, one cooperative step at a time.
///
/// Implemented by the real CoE/FoE/SoE engines in production; tests in this
/// crate use small scripted mocks (see `slave_fsm::tests`).
pub trait SubFsm<T> {
    /// Hand the sub-FSM a new transfer to drive. Called once, when the
    /// owning [`crate::slave_fsm::SlaveRequestFsm`] claims a request of this
    /// kind.
    fn transfer(&mut self, transfer: T);

    /// Cooperative step. Must not block.
    fn exec(&mut self) -> FsmPoll;

    /// Valid only after `exec()` has returned [`FsmPoll::Done`].
    fn success(&self) -> bool;
}

/// SDO (service data object) upload/download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdoTransfer {
    /// Object dictionary index.
    pub index: u16,
    /// Object dictionary subindex.
    pub subindex: u8,
    /// Download payload, or the buffer an upload's result is written into.
    pub data: Vec<u8>,
}

/// File-over-EtherCAT transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoeTransfer {
    /// Remote file name.
    pub filename: String,
    /// File contents being sent, or the buffer a read fills.
    pub data: Vec<u8>,
}

/// Servo-over-EtherCAT parameter transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoeTransfer {
    /// Target drive number within the slave.
    pub drive_no: u8,
    /// IDN (parameter identifier).
    pub idn: u16,
    /// Payload being written, or the buffer a read fills.
    pub data: Vec<u8>,
}

/// Raw register read/write request, handled inline without a sub-FSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTransfer {
    /// `input` reads the register into `data`; `output` writes `data` to it.
    pub direction: Direction,
    /// Physical register address within the slave.
    pub address: u16,
    /// Data to write (`output`), or the buffer a read fills (`input`).
    pub data: Vec<u8>,
}
