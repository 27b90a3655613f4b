//! External collaborator boundary: the master scheduler/dispatcher.
//!
//! The core never sends a frame itself. It hands finished datagrams to
//! whatever owns the actual link(s) through this trait, and later reads the
//! state/working counter the scheduler stamped back onto them.

use crate::datagram::{Datagram, DeviceIndex};

/// Interface the domain engine and slave request FSM consume to hand off
/// datagrams for transmission.
///
/// Implemented by the application's real link driver in production; tests in
/// this crate use small in-memory mocks (see each module's `tests`).
pub trait MasterScheduler {
    /// Enqueue a cyclic process-data datagram for the next frame on a
    /// specific link. `payload` is mutable because the real link driver
    /// overwrites it in place with the slave's response as the frame
    /// circulates - there is no separate receive buffer.
    fn queue_datagram(&mut self, datagram: &Datagram, payload: &mut [u8], device_index: DeviceIndex);

    /// Enqueue an aperiodic request datagram. The link is implied by the
    /// owning slave's own device index rather than passed explicitly.
    fn queue_external_datagram(&mut self, datagram: &Datagram, payload: &mut [u8]);

    /// Rate-limited per-datagram diagnostic log, called by the scheduler
    /// once it has a result for `datagram`.
    fn output_stats(&mut self, datagram: &Datagram);
}
