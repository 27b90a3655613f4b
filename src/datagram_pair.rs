//! Two sibling datagrams (main, backup) covering the same logical window.

use crate::datagram::{Datagram, DatagramState, DeviceIndex};
use crate::wire::Command;

/// Two sibling datagrams replicated over the main and backup links, plus the
/// bookkeeping needed to reconcile what each link actually returned.
///
/// The main datagram's payload window lives in the owning domain's process
/// image (the application reads and writes it directly). The backup
/// datagram's payload and the frozen "what did we just send" snapshot are
/// private to the pair, since neither is ever exposed to the application.
#[derive(Debug, Clone)]
pub struct DatagramPair {
    /// Datagram travelling over the main link. Its window is the domain's
    /// process image at `[offset, offset + size)`.
    pub main: Datagram,

    /// Datagram travelling over the backup link. Its window is
    /// `backup_buffer`.
    pub backup: Datagram,

    backup_buffer: Vec<u8>,
    send_staging: Vec<u8>,

    /// Byte offset of this pair's window within the domain's process image
    /// (domain-relative, i.e. already includes the domain's logical base
    /// address only insofar as `main.address`/`backup.address` do).
    pub(crate) offset: usize,

    /// Size in bytes, identical for both siblings and both private buffers.
    pub(crate) size: usize,

    expected_working_counter: u16,
    used_output: u32,
    used_input: u32,
}

impl DatagramPair {
    /// Construct a pair for the logical window `[offset, offset + size)`,
    /// with command and expected working counter derived from the slave
    /// counts `(used_output, used_input)` per the table in
    /// [`crate::domain::Domain::finish`].
    pub(crate) fn new(
        name: &'static str,
        logical_address: u32,
        offset: usize,
        size: usize,
        used_output: u32,
        used_input: u32,
    ) -> Self {
        let (command, expected_working_counter) = match (used_output, used_input) {
            (0, n_in) => (Command::Lrd, n_in as u16),
            (n_out, 0) => (Command::Lwr, n_out as u16),
            (n_out, n_in) => (Command::Lrw, (3 * n_out + n_in) as u16),
        };

        Self {
            main: Datagram::new(name, command, logical_address, size, DeviceIndex::Main),
            backup: Datagram::new(name, command, logical_address, size, DeviceIndex::Backup),
            backup_buffer: vec![0u8; size],
            send_staging: vec![0u8; size],
            offset,
            size,
            expected_working_counter,
            used_output,
            used_input,
        }
    }

    /// Expected working counter for this pair, per the command/used-counts
    /// table.
    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    /// `(used_output, used_input)` slave-config counts this pair's expected
    /// working counter was derived from.
    pub fn used_counts(&self) -> (u32, u32) {
        (self.used_output, self.used_input)
    }

    /// Stage this cycle's send: freeze what is about to go out (`main_bytes`,
    /// a window into the domain's process image) into the send-staging
    /// buffer, and give the backup datagram an identical copy to send.
    ///
    /// Called by [`crate::domain::Domain::queue`] once per pair, per cycle.
    pub(crate) fn queue(&mut self, main_bytes: &[u8]) {
        debug_assert_eq!(main_bytes.len(), self.size);
        self.send_staging.copy_from_slice(main_bytes);
        self.backup_buffer.copy_from_slice(main_bytes);
    }

    /// Mutable access to the backup link's private receive buffer, for the
    /// scheduler to write the backup datagram's response into.
    pub fn backup_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.backup_buffer
    }

    /// Aggregate working counter across both siblings. A sibling that did
    /// not come back as [`DatagramState::Received`] contributes zero.
    pub(crate) fn process(&self) -> u16 {
        let main_wc = match self.main.state {
            DatagramState::Received => self.main.working_counter,
            _ => 0,
        };
        let backup_wc = match self.backup.state {
            DatagramState::Received => self.backup.working_counter,
            _ => 0,
        };
        main_wc.saturating_add(backup_wc)
    }

    /// Redundancy reconciliation for one input-direction FMMU's slice of
    /// this pair:
    ///
    /// 1. If main changed relative to what was staged, accept main - no copy.
    /// 2. Else if backup changed, or the pair's WC equals its expected WC,
    ///    copy backup's bytes over main's.
    /// 3. Else leave main as-is (stale).
    pub(crate) fn reconcile(&self, fmmu_offset: usize, fmmu_size: usize, pair_wc: u16, image: &mut [u8]) {
        let base = self.offset + fmmu_offset;
        let staged = &self.send_staging[fmmu_offset..fmmu_offset + fmmu_size];
        let backup = &self.backup_buffer[fmmu_offset..fmmu_offset + fmmu_size];

        let main_changed = image[base..base + fmmu_size] != *staged;
        if main_changed {
            return;
        }

        let backup_changed = backup != staged;
        if backup_changed || pair_wc == self.expected_working_counter {
            image[base..base + fmmu_size].copy_from_slice(backup);
        }
    }
}
