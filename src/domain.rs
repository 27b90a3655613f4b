//! Domain: owns a process image and the FMMU configs/datagram pairs that
//! keep it in sync with the bus.

use crate::datagram::DeviceIndex;
use crate::datagram_pair::DatagramPair;
use crate::error::Error;
use crate::fmmu_config::{Direction, FmmuConfig, FmmuHandle};
use crate::scheduler::MasterScheduler;
use crate::wire::MAX_PAYLOAD;
use std::time::{Duration, Instant};

/// Where a domain's process image memory comes from.
#[derive(Debug)]
enum ProcessImage {
    /// Allocated and owned by the domain.
    Internal(Vec<u8>),
    /// Owned by the application; the domain only borrows it.
    External(&'static mut [u8]),
}

impl ProcessImage {
    fn as_slice(&self) -> &[u8] {
        match self {
            ProcessImage::Internal(v) => v,
            ProcessImage::External(s) => s,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            ProcessImage::Internal(v) => v,
            ProcessImage::External(s) => s,
        }
    }
}

/// Working counter health, as reported by [`Domain::state`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WcState {
    /// The working counter is zero - nothing responded.
    Zero,
    /// The working counter equals the domain's expected value.
    Complete,
    /// The working counter is nonzero but short of expected.
    Incomplete,
}

/// Snapshot returned by [`Domain::state`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DomainState {
    /// Last observed working counter, summed over all datagram pairs.
    pub working_counter: u16,
    /// Health derived from comparing `working_counter` to the domain's
    /// expected value.
    pub wc_state: WcState,
}

/// How often aggregated working-counter-change log lines are emitted.
const NOTIFY_INTERVAL: Duration = Duration::from_secs(1);

/// An application-defined group of FMMU configurations sharing one logical
/// address range, cycled together.
#[derive(Debug)]
pub struct Domain {
    index: usize,
    fmmu_configs: Vec<FmmuConfig>,
    data_size: usize,
    image: ProcessImage,
    logical_base_address: u32,
    pairs: Vec<DatagramPair>,
    working_counter: u16,
    expected_working_counter: u16,
    working_counter_changes: u32,
    last_notify: Option<Instant>,
}

impl Domain {
    /// Construct an empty domain with an internally-allocated process image
    /// (populated once [`Self::finish`] runs).
    pub fn new(index: usize) -> Self {
        Self {
            index,
            fmmu_configs: Vec::new(),
            data_size: 0,
            image: ProcessImage::Internal(Vec::new()),
            logical_base_address: 0,
            pairs: Vec::new(),
            working_counter: 0,
            expected_working_counter: 0,
            working_counter_changes: 0,
            last_notify: None,
        }
    }

    /// Domain index, used only for logging.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Link an FMMU config into this domain's tail-ordered list. No packing
    /// or address assignment happens here - that's [`Self::finish`]'s job.
    ///
    /// Must be called before `finish`. Rejects FMMUs that could never fit a
    /// single datagram - splitting a single FMMU across datagrams is not
    /// supported.
    pub fn add_fmmu(&mut self, mut fmmu: FmmuConfig) -> Result<FmmuHandle, Error> {
        if fmmu.data_size > MAX_PAYLOAD {
            return Err(Error::Configuration);
        }

        fmmu.logical_start = self.data_size as u32;
        self.data_size += fmmu.data_size;
        let added = fmmu.data_size;
        self.fmmu_configs.push(fmmu);

        debug!(
            "Domain {}: added {} bytes, total {}",
            self.index, added, self.data_size
        );

        Ok(FmmuHandle(self.fmmu_configs.len() - 1))
    }

    /// Number of FMMU configs registered so far.
    pub fn fmmu_count(&self) -> usize {
        self.fmmu_configs.len()
    }

    /// Look up a previously registered FMMU by handle.
    pub fn fmmu(&self, handle: FmmuHandle) -> &FmmuConfig {
        &self.fmmu_configs[handle.0]
    }

    /// Substitute the process image with caller-owned memory. Releases any
    /// internally allocated image first; since external memory is only
    /// borrowed, no subsequent call frees memory the domain does not own.
    pub fn external_memory(&mut self, mem: &'static mut [u8]) {
        debug!("Domain {}: switching to external memory", self.index);
        self.image = ProcessImage::External(mem);
    }

    /// Process image size in bytes, i.e. the sum of all registered FMMUs'
    /// sizes.
    pub fn size(&self) -> usize {
        self.data_size
    }

    /// Read-only view of the process image.
    pub fn data(&self) -> &[u8] {
        self.image.as_slice()
    }

    /// Mutable view of the process image, for the application to read
    /// inputs and write outputs between cycles.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.image.as_mut_slice()
    }

    /// True once an earlier FMMU in `[first..cur)` shares both slave config
    /// and direction with `self.fmmu_configs[cur]` - i.e. that slave/direction
    /// pair has already contributed to the current pair's working counter.
    fn fmmu_already_counted(&self, first: usize, cur: usize) -> bool {
        let candidate = &self.fmmu_configs[cur];
        self.fmmu_configs[first..cur]
            .iter()
            .any(|f| f.slave_config == candidate.slave_config && f.direction == candidate.direction)
    }

    /// Assign the domain its logical base address, allocate the process
    /// image if needed, and greedy-pack FMMU configs into datagram pairs
    /// such that no single datagram's payload exceeds [`MAX_PAYLOAD`].
    ///
    /// This is a single forward pass over the FMMU list that never reads an
    /// FMMU's pair assignment before writing it: each FMMU's `pair_index`
    /// and `offset_in_pair` are computed and stored as we go, so `process`
    /// can look them up directly instead of re-walking a cursor.
    pub fn finish(&mut self, base_address: u32) -> Result<(), Error> {
        self.logical_base_address = base_address;

        if self.data_size > 0 {
            if let ProcessImage::Internal(buf) = &mut self.image {
                if buf.is_empty() {
                    let mut allocated = Vec::new();
                    allocated
                        .try_reserve_exact(self.data_size)
                        .map_err(|_| Error::OutOfMemory)?;
                    allocated.resize(self.data_size, 0u8);
                    *buf = allocated;
                }
            }
        }

        let mut offset = 0usize;
        let mut current_size = 0usize;
        let mut used = [0u32; 2];
        let mut first_fmmu_of_current = 0usize;
        let mut pair_count = 0usize;

        for i in 0..self.fmmu_configs.len() {
            self.fmmu_configs[i].logical_start += base_address;

            if !self.fmmu_already_counted(first_fmmu_of_current, i) {
                let dir = self.fmmu_configs[i].direction;
                used[dir as usize] += 1;
            }

            let fmmu_size = self.fmmu_configs[i].data_size;

            if current_size + fmmu_size > MAX_PAYLOAD {
                self.emit_pair(offset, current_size, used);
                offset += current_size;
                current_size = 0;
                used = [0, 0];
                first_fmmu_of_current = i;
                pair_count += 1;
            }

            self.fmmu_configs[i].pair_index = pair_count;
            self.fmmu_configs[i].offset_in_pair = current_size;

            current_size += fmmu_size;
        }

        if current_size > 0 {
            self.emit_pair(offset, current_size, used);
        }

        info!(
            "Domain {}: logical address {:#010x}, {} bytes, expected working counter {}",
            self.index, self.logical_base_address, self.data_size, self.expected_working_counter
        );

        Ok(())
    }

    fn emit_pair(&mut self, offset: usize, size: usize, used: [u32; 2]) {
        let used_output = used[Direction::Output as usize];
        let used_input = used[Direction::Input as usize];
        // `size > 0` whenever this is called, and the first FMMU folded into
        // a pair is never "already counted" (the scan range is empty), so at
        // least one of the two counts is always nonzero here.
        debug_assert!(used_output > 0 || used_input > 0);

        let logical_address = self.logical_base_address + offset as u32;
        let pair = DatagramPair::new("domain-pair", logical_address, offset, size, used_output, used_input);

        self.expected_working_counter += pair.expected_working_counter();
        debug!(
            "Domain {}: adding datagram pair with expected WC {}",
            self.index,
            pair.expected_working_counter()
        );
        self.pairs.push(pair);
    }

    /// Domain's expected working counter, i.e. the sum over all pairs.
    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    /// The datagram pairs produced by `finish`.
    pub fn pairs(&self) -> &[DatagramPair] {
        &self.pairs
    }

    /// Per-cycle send preparation: for every pair, freeze the main payload
    /// into the send-staging buffer, mirror it into the backup datagram, and
    /// hand both siblings to the scheduler. Nothing is sent here.
    pub fn queue(&mut self, scheduler: &mut impl MasterScheduler) {
        let Domain { pairs, image, .. } = self;
        let image = image.as_mut_slice();

        for pair in pairs.iter_mut() {
            let main_bytes = &mut image[pair.offset..pair.offset + pair.size];
            pair.queue(main_bytes);
            scheduler.queue_datagram(&pair.main, main_bytes, DeviceIndex::Main);
            scheduler.queue_datagram(&pair.backup, pair.backup_buffer_mut(), DeviceIndex::Backup);
        }
    }

    /// Redundancy reconciliation: merge the two links' independent
    /// observations of each input FMMU's window into the process image, sum
    /// the working counters, and track/log changes.
    ///
    /// `now` is supplied by the caller's tick rather than read from the
    /// system clock, so the coarse timebase used for the once-a-second
    /// change log always comes from the scheduler's notion of time.
    pub fn process(&mut self, now: Instant) {
        let Domain {
            pairs,
            image,
            fmmu_configs,
            ..
        } = self;

        let image = image.as_mut_slice();
        let pair_wcs: Vec<u16> = pairs.iter().map(DatagramPair::process).collect();
        let working_counter_sum = pair_wcs.iter().fold(0u16, |acc, wc| acc.saturating_add(*wc));

        for fmmu in fmmu_configs.iter() {
            if fmmu.direction != Direction::Input {
                continue;
            }

            let pair = &pairs[fmmu.pair_index];
            let pair_wc = pair_wcs[fmmu.pair_index];
            pair.reconcile(fmmu.offset_in_pair, fmmu.data_size, pair_wc, image);
        }

        if working_counter_sum != self.working_counter {
            self.working_counter_changes += 1;
            self.working_counter = working_counter_sum;
        }

        let due = match self.last_notify {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= NOTIFY_INTERVAL,
        };

        if self.working_counter_changes > 0 && due {
            self.last_notify = Some(now);
            if self.working_counter_changes == 1 {
                info!(
                    "Domain {}: working counter changed to {}/{}",
                    self.index, self.working_counter, self.expected_working_counter
                );
            } else {
                info!(
                    "Domain {}: {} working counter changes - now {}/{}",
                    self.index, self.working_counter_changes, self.working_counter, self.expected_working_counter
                );
            }
            self.working_counter_changes = 0;
        }
    }

    /// Current working counter and derived health.
    pub fn state(&self) -> DomainState {
        let wc_state = if self.working_counter == 0 {
            WcState::Zero
        } else if self.working_counter == self.expected_working_counter {
            WcState::Complete
        } else {
            WcState::Incomplete
        };

        DomainState {
            working_counter: self.working_counter,
            wc_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagram::DatagramState;
    use crate::fmmu_config::SlaveConfigId;
    use crate::scheduler::MasterScheduler;
    use pretty_assertions::assert_eq;

    struct NullScheduler;
    impl MasterScheduler for NullScheduler {
        fn queue_datagram(&mut self, _datagram: &crate::datagram::Datagram, _payload: &mut [u8], _device_index: DeviceIndex) {}
        fn queue_external_datagram(&mut self, _datagram: &crate::datagram::Datagram, _payload: &mut [u8]) {}
        fn output_stats(&mut self, _datagram: &crate::datagram::Datagram) {}
    }

    fn sc(n: u32) -> SlaveConfigId {
        SlaveConfigId(n)
    }

    #[test]
    fn rejects_oversize_fmmu() {
        let mut d = Domain::new(0);
        let fmmu = FmmuConfig::new(sc(1), Direction::Input, MAX_PAYLOAD + 1);
        assert_eq!(d.add_fmmu(fmmu), Err(Error::Configuration));
    }

    #[test]
    fn scenario_pure_read_single_pair() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 8)).unwrap();
        d.finish(0x1000).unwrap();

        assert_eq!(d.pairs().len(), 1);
        assert_eq!(d.pairs()[0].main.command, crate::wire::Command::Lrd);
        assert_eq!(d.pairs()[0].main.address, 0x1000);
        assert_eq!(d.expected_working_counter(), 1);

        let mut scheduler = NullScheduler;
        d.queue(&mut scheduler);

        let main_bytes: Vec<u8> = (1u8..=8).collect();
        d.data_mut().copy_from_slice(&main_bytes);
        d.pairs[0].main.state = DatagramState::Received;
        d.pairs[0].main.working_counter = 1;
        d.pairs[0].backup.state = DatagramState::Received;
        d.pairs[0].backup.working_counter = 0;

        d.process(Instant::now());

        assert_eq!(d.data(), main_bytes.as_slice());
        let state = d.state();
        assert_eq!(state.working_counter, 1);
        assert_eq!(state.wc_state, WcState::Complete);
    }

    #[test]
    fn scenario_pure_write_single_pair() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Output, 4)).unwrap();
        d.finish(0x2000).unwrap();

        assert_eq!(d.pairs()[0].main.command, crate::wire::Command::Lwr);
        assert_eq!(d.expected_working_counter(), 1);

        d.data_mut().copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        let mut scheduler = NullScheduler;
        d.queue(&mut scheduler);

        assert_eq!(d.pairs()[0].backup.size, 4);
    }

    #[test]
    fn scenario_mixed_pair_expected_wc() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 2)).unwrap();
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Output, 2)).unwrap();
        d.finish(0).unwrap();

        assert_eq!(d.pairs().len(), 1);
        assert_eq!(d.pairs()[0].main.command, crate::wire::Command::Lrw);
        assert_eq!(d.expected_working_counter(), 3 * 1 + 1);
    }

    #[test]
    fn scenario_shared_slave_config_deduplication() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 1)).unwrap(); // A/in
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 1)).unwrap(); // A/in again
        d.add_fmmu(FmmuConfig::new(sc(2), Direction::Output, 1)).unwrap(); // B/out
        d.add_fmmu(FmmuConfig::new(sc(2), Direction::Input, 1)).unwrap(); // B/in
        d.finish(0).unwrap();

        assert_eq!(d.pairs().len(), 1);
        assert_eq!(d.pairs()[0].used_counts(), (1, 2));
        assert_eq!(d.expected_working_counter(), 3 * 1 + 2);
    }

    #[test]
    fn scenario_pair_split_on_max_payload() {
        let mut d = Domain::new(0);
        for i in 0..20 {
            d.add_fmmu(FmmuConfig::new(sc(i), Direction::Input, 100)).unwrap();
        }
        d.finish(0).unwrap();

        assert_eq!(d.pairs().len(), 2);
        assert_eq!(d.pairs()[0].size, (MAX_PAYLOAD / 100) * 100);
        let remaining = 2000 - d.pairs()[0].size;
        assert_eq!(d.pairs()[1].size, remaining);

        let split_index = d.pairs()[0].size / 100;
        assert_eq!(d.fmmu_configs[split_index].pair_index, 1);
        assert_eq!(d.fmmu_configs[split_index].offset_in_pair, 0);
        assert_eq!(d.fmmu_configs[split_index - 1].pair_index, 0);
    }

    #[test]
    fn scenario_redundancy_merge_main_wins_on_change() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 4)).unwrap();
        d.finish(0).unwrap();

        let mut scheduler = NullScheduler;
        d.queue(&mut scheduler); // staging = [0,0,0,0]

        d.data_mut().copy_from_slice(&[0x11, 0, 0, 0]);
        d.pairs[0].main.state = DatagramState::Received;
        d.pairs[0].main.working_counter = 0;
        d.pairs[0].backup.state = DatagramState::Received;
        d.pairs[0].backup.working_counter = 0;

        d.process(Instant::now());
        assert_eq!(d.data(), &[0x11, 0, 0, 0]);
    }

    #[test]
    fn scenario_redundancy_merge_no_change_stays_stale() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 4)).unwrap();
        d.finish(0).unwrap();

        let mut scheduler = NullScheduler;
        d.data_mut().copy_from_slice(&[0, 0, 0, 0]);
        d.queue(&mut scheduler);

        d.pairs[0].main.state = DatagramState::Received;
        d.pairs[0].main.working_counter = 0;
        d.pairs[0].backup.state = DatagramState::Received;
        d.pairs[0].backup.working_counter = 0;

        d.process(Instant::now());
        assert_eq!(d.data(), &[0, 0, 0, 0]);
        assert_eq!(d.state().wc_state, WcState::Zero);
    }

    #[test]
    fn external_memory_round_trips_and_frees_nothing_not_owned() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 4)).unwrap();

        let leaked: &'static mut [u8] = Box::leak(Box::new([0u8; 4]));
        let ptr = leaked.as_mut_ptr();
        d.external_memory(leaked);
        assert_eq!(d.data().as_ptr(), ptr);

        let leaked2: &'static mut [u8] = Box::leak(Box::new([1u8; 4]));
        d.external_memory(leaked2);
        assert_eq!(d.data(), &[1, 1, 1, 1]);
    }

    #[test]
    fn working_counter_passes_through_without_clamping() {
        let mut d = Domain::new(0);
        d.add_fmmu(FmmuConfig::new(sc(1), Direction::Input, 4)).unwrap();
        d.finish(0).unwrap();

        let mut scheduler = NullScheduler;
        d.queue(&mut scheduler);
        d.pairs[0].main.state = DatagramState::Received;
        d.pairs[0].main.working_counter = 9;
        d.pairs[0].backup.state = DatagramState::Received;
        d.pairs[0].backup.working_counter = 9;

        d.process(Instant::now());
        // A malicious/broken wire could still report > expected; the domain
        // just passes the sum through rather than clamping it. This test
        // documents that `working_counter` is whatever the wire said, not a
        // clamp.
        assert!(d.state().working_counter >= d.expected_working_counter());
    }
}
