//! Per-slave aperiodic request state machine.
//!
//! One instance per slave, stepped once a cycle by [`SlaveRequestFsm::exec`].
//! Dequeues at most one request at a time from the slave's four queues,
//! drives it to completion (inline for register requests, delegated to a
//! protocol sub state machine for SDO/FoE/SoE), wakes the submitter, and
//! returns to `ready` for the next one.

use crate::al_state::AlState;
use crate::datagram::{Datagram, DatagramState, DeviceIndex};
use crate::error::Error;
use crate::fmmu_config::Direction;
use crate::request::Request;
use crate::scheduler::MasterScheduler;
use crate::slave::Slave;
use crate::sub_fsm::{FoeTransfer, FsmPoll, RegisterTransfer, SdoTransfer, SoeTransfer, SubFsm};
use crate::wire::{pack_physical_address, Command};

/// State of a [`SlaveRequestFsm`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FsmState {
    /// Nothing queued, or waiting for an external [`SlaveRequestFsm::ready`] call.
    Idle,
    /// Will attempt to claim a queued request on the next `exec()`.
    Ready,
    /// Driving a claimed SDO request.
    SdoRequest,
    /// Driving a claimed register request.
    RegRequest,
    /// Driving a claimed FoE request.
    FoeRequest,
    /// Driving a claimed SoE request.
    SoeRequest,
}

/// The request currently claimed by the FSM, if any. At most one variant is
/// ever non-`None`, and it always matches the FSM's current
/// [`FsmState`] - the sum type makes a runtime invariant a compile-time one.
enum CurrentRequest {
    None,
    Sdo(Request<SdoTransfer>),
    Register(Request<RegisterTransfer>),
    Foe(Request<FoeTransfer>),
    Soe(Request<SoeTransfer>),
}

/// Cooperative per-slave request multiplexer.
///
/// Generic over the three protocol sub state machines so tests can supply
/// scripted mocks; production code instantiates this with the real CoE, FoE
/// and SoE engines.
pub struct SlaveRequestFsm<C, F, S> {
    state: FsmState,
    current: CurrentRequest,
    datagram: Datagram,
    mailbox: Vec<u8>,
    coe: C,
    foe: F,
    soe: S,
}

impl<C, F, S> SlaveRequestFsm<C, F, S>
where
    C: SubFsm<SdoTransfer>,
    F: SubFsm<FoeTransfer>,
    S: SubFsm<SoeTransfer>,
{
    /// Construct an idle FSM around the given sub state machines.
    pub fn new(coe: C, foe: F, soe: S) -> Self {
        Self {
            state: FsmState::Idle,
            current: CurrentRequest::None,
            datagram: Datagram::new("slave-request", Command::Fprd, 0, 0, DeviceIndex::Main),
            mailbox: Vec::new(),
            coe,
            foe,
            soe,
        }
    }

    /// Hand the FSM its shared aperiodic datagram slot.
    pub fn init(&mut self, datagram: Datagram) {
        self.datagram = datagram;
    }

    /// Current state, for diagnostics and tests.
    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Lift `idle` to `ready`, allowing `exec()` to start claiming queued
    /// requests again. A no-op in any other state.
    pub fn ready(&mut self) {
        if self.state == FsmState::Idle {
            self.state = FsmState::Ready;
        }
    }

    /// Drop any claimed request without completing it and return to `idle`.
    /// Used for teardown; does not wake a waiter.
    pub fn clear(&mut self) {
        self.current = CurrentRequest::None;
        self.datagram.state = DatagramState::Unused;
        self.state = FsmState::Idle;
    }

    /// Step the FSM once. Skipped entirely if the shared datagram is still
    /// in flight with the scheduler.
    pub fn exec(&mut self, slave: &mut Slave, scheduler: &mut impl MasterScheduler) -> Result<(), Error> {
        if self.datagram.state.in_flight() {
            return Ok(());
        }

        let result = match self.state {
            FsmState::Idle => Ok(()),
            FsmState::Ready => self.dispatch_ready(slave, scheduler),
            FsmState::SdoRequest => self.drive_sdo(scheduler),
            FsmState::RegRequest => self.drive_register(scheduler),
            FsmState::FoeRequest => self.drive_foe(scheduler),
            FsmState::SoeRequest => self.drive_soe(scheduler),
        };

        scheduler.output_stats(&self.datagram);
        result
    }

    fn dispatch_ready(&mut self, slave: &mut Slave, scheduler: &mut impl MasterScheduler) -> Result<(), Error> {
        let al_state = slave.al_state;

        if let Some(req) = slave.pop_sdo() {
            return self.claim_gated("SDO", req, al_state, true, FsmState::SdoRequest, CurrentRequest::Sdo, |fsm, payload| {
                fsm.coe.transfer(payload);
            });
        }
        if let Some(req) = slave.pop_register() {
            return self.claim_register(req, al_state, slave.station_address, slave.device_index, scheduler);
        }
        if let Some(req) = slave.pop_foe() {
            return self.claim_gated("FoE", req, al_state, false, FsmState::FoeRequest, CurrentRequest::Foe, |fsm, payload| {
                fsm.foe.transfer(payload);
            });
        }
        if let Some(req) = slave.pop_soe() {
            return self.claim_gated("SoE", req, al_state, true, FsmState::SoeRequest, CurrentRequest::Soe, |fsm, payload| {
                fsm.soe.transfer(payload);
            });
        }

        Ok(())
    }

    /// Shared eligibility + claim + sub-FSM handoff for the three
    /// sub-FSM-backed kinds. `gate_init` additionally aborts a request found
    /// while the slave is in `INIT` (true for SDO and SoE, false for FoE).
    /// `kind` names the request for the abort log line.
    fn claim_gated<T: Clone>(
        &mut self,
        kind: &str,
        req: Request<T>,
        al_state: AlState,
        gate_init: bool,
        next_state: FsmState,
        wrap: impl FnOnce(Request<T>) -> CurrentRequest,
        start: impl FnOnce(&mut Self, T),
    ) -> Result<(), Error> {
        let _ = req.claim();

        if al_state.contains(AlState::ACK_ERR) {
            warn!("Aborting {} request, slave has error flag set.", kind);
            req.complete(false);
            self.state = FsmState::Idle;
            return Ok(());
        }
        if gate_init && al_state.contains(AlState::INIT) {
            warn!("Aborting {} request, slave is in INIT.", kind);
            req.complete(false);
            self.state = FsmState::Idle;
            return Ok(());
        }

        let payload = req.with_payload(|t| t.clone());
        start(self, payload);
        self.current = wrap(req);
        self.state = next_state;
        Ok(())
    }

    fn claim_register(
        &mut self,
        req: Request<RegisterTransfer>,
        al_state: AlState,
        station_address: u16,
        device_index: DeviceIndex,
        scheduler: &mut impl MasterScheduler,
    ) -> Result<(), Error> {
        let _ = req.claim();

        if !eligible(al_state, false) {
            warn!("Aborting register request, slave has error flag set.");
            req.complete(false);
            self.state = FsmState::Idle;
            return Ok(());
        }

        let (direction, register, size) = req.with_payload(|t| (t.direction, t.address, t.data.len()));
        self.mailbox = vec![0u8; size];
        if direction == Direction::Output {
            req.with_payload(|t| self.mailbox.copy_from_slice(&t.data));
        }

        let command = match direction {
            Direction::Input => Command::Fprd,
            Direction::Output => Command::Fpwr,
        };
        let address = pack_physical_address(station_address, register);
        self.datagram = Datagram::new("slave-register", command, address, size, device_index);
        self.datagram.state = DatagramState::Queued;
        scheduler.queue_external_datagram(&self.datagram, &mut self.mailbox);
        self.current = CurrentRequest::Register(req);
        self.state = FsmState::RegRequest;
        Ok(())
    }

    fn drive_sdo(&mut self, scheduler: &mut impl MasterScheduler) -> Result<(), Error> {
        let req = match &self.current {
            CurrentRequest::Sdo(r) => r.clone(),
            _ => {
                self.state = FsmState::Ready;
                return Ok(());
            }
        };

        match self.coe.exec() {
            FsmPoll::Pending => {
                scheduler.queue_external_datagram(&self.datagram, &mut self.mailbox);
            }
            FsmPoll::Done => {
                let success = self.coe.success();
                if !success {
                    error!("Failed to process SDO request.");
                }
                req.complete(success);
                self.current = CurrentRequest::None;
                self.state = FsmState::Ready;
            }
        }
        Ok(())
    }

    fn drive_foe(&mut self, scheduler: &mut impl MasterScheduler) -> Result<(), Error> {
        let req = match &self.current {
            CurrentRequest::Foe(r) => r.clone(),
            _ => {
                self.state = FsmState::Ready;
                return Ok(());
            }
        };

        match self.foe.exec() {
            FsmPoll::Pending => {
                scheduler.queue_external_datagram(&self.datagram, &mut self.mailbox);
            }
            FsmPoll::Done => {
                let success = self.foe.success();
                if !success {
                    error!("Failed to handle FoE request.");
                }
                req.complete(success);
                self.current = CurrentRequest::None;
                self.state = FsmState::Ready;
            }
        }
        Ok(())
    }

    fn drive_soe(&mut self, scheduler: &mut impl MasterScheduler) -> Result<(), Error> {
        let req = match &self.current {
            CurrentRequest::Soe(r) => r.clone(),
            _ => {
                self.state = FsmState::Ready;
                return Ok(());
            }
        };

        match self.soe.exec() {
            FsmPoll::Pending => {
                scheduler.queue_external_datagram(&self.datagram, &mut self.mailbox);
            }
            FsmPoll::Done => {
                let success = self.soe.success();
                if !success {
                    error!("Failed to process SoE request.");
                }
                req.complete(success);
                self.current = CurrentRequest::None;
                self.state = FsmState::Ready;
            }
        }
        Ok(())
    }

    fn drive_register(&mut self, scheduler: &mut impl MasterScheduler) -> Result<(), Error> {
        let req = match &self.current {
            CurrentRequest::Register(r) => r.clone(),
            _ => {
                self.state = FsmState::Ready;
                return Ok(());
            }
        };

        match self.datagram.state {
            DatagramState::Received => {
                let success = self.datagram.working_counter == 1;
                if success {
                    if req.with_payload(|t| t.direction) == Direction::Input {
                        let mailbox = self.mailbox.clone();
                        req.with_payload(|t| t.data.copy_from_slice(&mailbox));
                    }
                } else {
                    error!(
                        "Register request failed (working counter is {}).",
                        self.datagram.working_counter
                    );
                }
                req.complete(success);
                self.current = CurrentRequest::None;
                self.datagram.state = DatagramState::Unused;
                self.state = FsmState::Ready;
            }
            DatagramState::TimedOut | DatagramState::Error => {
                error!("Failed to receive register request datagram.");
                req.complete(false);
                self.current = CurrentRequest::None;
                self.datagram.state = DatagramState::Unused;
                self.state = FsmState::Ready;
            }
            _ => {
                // Still in flight; the top-of-exec guard normally prevents
                // reaching here. Re-queue defensively since register
                // requests have no sub-FSM of their own to report pending.
                scheduler.queue_external_datagram(&self.datagram, &mut self.mailbox);
            }
        }
        Ok(())
    }
}

/// `ACK_ERR` always aborts; `gate_init` additionally aborts while the slave
/// is in `INIT` (true for SDO/SoE, false for register/FoE).
fn eligible(al_state: AlState, gate_init: bool) -> bool {
    if al_state.contains(AlState::ACK_ERR) {
        return false;
    }
    if gate_init && al_state.contains(AlState::INIT) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagram::Datagram;
    use pretty_assertions::assert_eq;

    struct ScriptedFsm {
        steps: std::collections::VecDeque<FsmPoll>,
        ok: bool,
    }

    impl ScriptedFsm {
        fn new(steps: Vec<FsmPoll>, ok: bool) -> Self {
            Self {
                steps: steps.into_iter().collect(),
                ok,
            }
        }
    }

    impl<T> SubFsm<T> for ScriptedFsm {
        fn transfer(&mut self, _transfer: T) {}
        fn exec(&mut self) -> FsmPoll {
            self.steps.pop_front().unwrap_or(FsmPoll::Done)
        }
        fn success(&self) -> bool {
            self.ok
        }
    }

    struct RecordingScheduler {
        queued_external: u32,
    }

    impl MasterScheduler for RecordingScheduler {
        fn queue_datagram(&mut self, _datagram: &Datagram, _payload: &mut [u8], _device_index: DeviceIndex) {}
        fn queue_external_datagram(&mut self, _datagram: &Datagram, _payload: &mut [u8]) {
            self.queued_external += 1;
        }
        fn output_stats(&mut self, _datagram: &Datagram) {}
    }

    fn fsm() -> SlaveRequestFsm<ScriptedFsm, ScriptedFsm, ScriptedFsm> {
        SlaveRequestFsm::new(
            ScriptedFsm::new(vec![FsmPoll::Done], true),
            ScriptedFsm::new(vec![FsmPoll::Done], true),
            ScriptedFsm::new(vec![FsmPoll::Done], true),
        )
    }

    #[test]
    fn idle_ignores_queued_requests_until_ready() {
        let mut f = fsm();
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        let req = Request::new(SdoTransfer {
            index: 0x1018,
            subindex: 1,
            data: vec![],
        });
        slave.submit_sdo(req.clone());

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f.state(), FsmState::Idle);
        assert_eq!(req.state(), crate::request::RequestState::Queued);
    }

    #[test]
    fn sdo_completes_after_pending_then_done() {
        let mut f = SlaveRequestFsm::new(
            ScriptedFsm::new(vec![FsmPoll::Pending, FsmPoll::Done], true),
            ScriptedFsm::new(vec![], true),
            ScriptedFsm::new(vec![], true),
        );
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        let req = Request::new(SdoTransfer {
            index: 0x1018,
            subindex: 1,
            data: vec![],
        });
        slave.submit_sdo(req.clone());
        f.ready();

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap(); // claims, enters SdoRequest
        assert_eq!(f.state(), FsmState::SdoRequest);

        f.exec(&mut slave, &mut sched).unwrap(); // sub-fsm pending
        assert_eq!(f.state(), FsmState::SdoRequest);
        assert_eq!(sched.queued_external, 1);

        f.exec(&mut slave, &mut sched).unwrap(); // sub-fsm done
        assert_eq!(f.state(), FsmState::Ready);
        assert_eq!(req.wait(), crate::request::RequestState::Success);
    }

    #[test]
    fn ack_err_aborts_to_idle_and_fails_request() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut f = fsm();
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        slave.al_state = AlState::OP | AlState::ACK_ERR;
        let req = Request::new(SdoTransfer {
            index: 1,
            subindex: 0,
            data: vec![],
        });
        slave.submit_sdo(req.clone());
        f.ready();

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f.state(), FsmState::Idle);
        assert_eq!(req.wait(), crate::request::RequestState::Failure);
    }

    #[test]
    fn sdo_in_init_is_rejected_but_register_is_not() {
        let mut f = fsm();
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        slave.al_state = AlState::INIT;
        let sdo = Request::new(SdoTransfer {
            index: 1,
            subindex: 0,
            data: vec![],
        });
        slave.submit_sdo(sdo.clone());
        f.ready();

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(sdo.wait(), crate::request::RequestState::Failure);
        assert_eq!(f.state(), FsmState::Idle);

        let mut f2 = fsm();
        let reg = Request::new(RegisterTransfer {
            direction: Direction::Output,
            address: 0x10,
            data: vec![0xaa, 0xbb],
        });
        slave.submit_register(reg.clone());
        f2.ready();
        f2.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f2.state(), FsmState::RegRequest);
    }

    #[test]
    fn register_write_then_read_round_trips_via_mailbox() {
        let mut f = fsm();
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        let reg = Request::new(RegisterTransfer {
            direction: Direction::Input,
            address: 0x20,
            data: vec![0u8; 2],
        });
        slave.submit_register(reg.clone());
        f.ready();

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f.state(), FsmState::RegRequest);

        // Simulate the scheduler/link filling the mailbox and stamping WC.
        f.mailbox = vec![0x42, 0x43];
        f.datagram.state = DatagramState::Received;
        f.datagram.working_counter = 1;

        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f.state(), FsmState::Ready);
        assert_eq!(reg.wait(), crate::request::RequestState::Success);
        reg.with_payload(|t| assert_eq!(t.data, vec![0x42, 0x43]));
    }

    #[test]
    fn register_timeout_fails_request() {
        let mut f = fsm();
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        let reg = Request::new(RegisterTransfer {
            direction: Direction::Output,
            address: 0x20,
            data: vec![1, 2],
        });
        slave.submit_register(reg.clone());
        f.ready();

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        f.datagram.state = DatagramState::TimedOut;
        f.exec(&mut slave, &mut sched).unwrap();

        assert_eq!(reg.wait(), crate::request::RequestState::Failure);
        assert_eq!(f.state(), FsmState::Ready);
    }

    #[test]
    fn priority_sdo_beats_register() {
        let mut f = fsm();
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        slave.submit_register(Request::new(RegisterTransfer {
            direction: Direction::Input,
            address: 1,
            data: vec![0],
        }));
        slave.submit_sdo(Request::new(SdoTransfer {
            index: 1,
            subindex: 0,
            data: vec![],
        }));
        f.ready();

        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f.state(), FsmState::SdoRequest);
        assert_eq!(slave.queued_len(), 1); // register request still queued
    }

    #[test]
    fn in_flight_datagram_skips_exec() {
        let mut f = fsm();
        f.datagram.state = DatagramState::Sent;
        let mut slave = Slave::new(0x1001, DeviceIndex::Main);
        f.ready();
        let mut sched = RecordingScheduler { queued_external: 0 };
        f.exec(&mut slave, &mut sched).unwrap();
        assert_eq!(f.state(), FsmState::Ready); // unchanged, exec() skipped
    }
}
