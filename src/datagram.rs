//! A single EtherCAT datagram: header plus a borrowed payload window.

use crate::wire::Command;
use core::fmt;

/// Which physical port a datagram goes out on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceIndex {
    /// Primary link.
    Main = 0,
    /// Redundant link.
    Backup = 1,
}

impl Default for DeviceIndex {
    fn default() -> Self {
        DeviceIndex::Main
    }
}

/// Lifecycle of a queued datagram, as observed by the core between calls to
/// [`crate::domain::Domain::queue`] and [`crate::domain::Domain::process`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DatagramState {
    /// Not yet handed to the scheduler this cycle.
    Unused,
    /// Handed to the scheduler, not yet sent.
    Queued,
    /// Sent, awaiting the scheduler's response.
    Sent,
    /// Returned with a working counter.
    Received,
    /// Did not return before the scheduler gave up.
    TimedOut,
    /// Returned but was rejected by the scheduler (e.g. malformed frame).
    Error,
}

impl DatagramState {
    /// Whether the datagram is still outstanding with the scheduler, i.e.
    /// [`crate::slave_fsm::SlaveRequestFsm::exec`] must not step this cycle.
    pub fn in_flight(self) -> bool {
        matches!(self, DatagramState::Queued | DatagramState::Sent)
    }
}

/// One EtherCAT datagram: header fields plus a borrowed payload window.
///
/// The payload itself is never owned by a `Datagram` - it is always a window
/// into someone else's buffer (a domain's process image for cyclic
/// datagrams, a slave's mailbox buffer for aperiodic ones). Callers pass the
/// backing slice alongside the datagram wherever its bytes are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Name used only for logging (e.g. `"domain0-pair1"`).
    pub name: &'static str,

    /// The command this datagram carries.
    pub command: Command,

    /// Logical address (`LRD`/`LWR`/`LRW`) or station address (`FPRD`/`FPWR`,
    /// packed together with the register address - see
    /// [`crate::wire::DatagramHeader`]).
    pub address: u32,

    /// Payload size in bytes.
    pub size: usize,

    /// Working counter, filled in by the wire once the datagram returns.
    pub working_counter: u16,

    /// Lifecycle state.
    pub state: DatagramState,

    /// Which link this datagram travels over.
    pub device_index: DeviceIndex,
}

impl Datagram {
    /// Construct a new, as yet unqueued datagram.
    pub fn new(name: &'static str, command: Command, address: u32, size: usize, device_index: DeviceIndex) -> Self {
        Self {
            name,
            command,
            address,
            size,
            working_counter: 0,
            state: DatagramState::Unused,
            device_index,
        }
    }

    /// Borrow this datagram's payload window out of `backing`, which must be
    /// at least `self.size` bytes starting at `offset`.
    pub fn window<'a>(&self, backing: &'a [u8], offset: usize) -> &'a [u8] {
        &backing[offset..offset + self.size]
    }

    /// Mutable counterpart of [`Self::window`].
    pub fn window_mut<'a>(&self, backing: &'a mut [u8], offset: usize) -> &'a mut [u8] {
        &mut backing[offset..offset + self.size]
    }
}

impl fmt::Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} addr={:#010x} size={} wc={} state={:?}",
            self.name, self.command, self.address, self.size, self.working_counter, self.state
        )
    }
}
