//! A slave's request queues, as seen by the request FSM.
//!
//! Everything else about a slave - its alias/position, SII contents, PDO
//! entry bookkeeping - belongs to the scanning/configuration collaborator
//! out of scope here; this module only carries what the per-slave request
//! FSM needs to dequeue and gate work.

use crate::al_state::AlState;
use crate::datagram::DeviceIndex;
use crate::request::Request;
use crate::sub_fsm::{FoeTransfer, RegisterTransfer, SdoTransfer, SoeTransfer};
use std::collections::VecDeque;

/// A slave's AL state plus its queued aperiodic requests.
///
/// Register requests are served from two queues: `config_reg_requests`
/// (attached to the slave's configuration, checked first and left in place
/// until picked) before `reg_requests` (the slave's own ad hoc queue,
/// dequeued immediately on pick).
#[derive(Default)]
pub struct Slave {
    /// Station address used to address physical (`FPRD`/`FPWR`) datagrams.
    pub station_address: u16,

    /// Which physical link this slave's aperiodic datagram travels over.
    pub device_index: DeviceIndex,

    /// Last known AL state, including `ACK_ERR` if set.
    pub al_state: AlState,

    sdo_requests: VecDeque<Request<SdoTransfer>>,
    config_reg_requests: VecDeque<Request<RegisterTransfer>>,
    reg_requests: VecDeque<Request<RegisterTransfer>>,
    foe_requests: VecDeque<Request<FoeTransfer>>,
    soe_requests: VecDeque<Request<SoeTransfer>>,
}

impl Slave {
    /// Construct a slave with no queued requests and AL state `INIT`.
    pub fn new(station_address: u16, device_index: DeviceIndex) -> Self {
        Self {
            station_address,
            device_index,
            al_state: AlState::default(),
            sdo_requests: VecDeque::new(),
            config_reg_requests: VecDeque::new(),
            reg_requests: VecDeque::new(),
            foe_requests: VecDeque::new(),
            soe_requests: VecDeque::new(),
        }
    }

    /// Queue an SDO request for later servicing.
    pub fn submit_sdo(&mut self, request: Request<SdoTransfer>) {
        self.sdo_requests.push_back(request);
    }

    /// Queue a register request against the slave's configuration (checked
    /// first by the FSM, ahead of [`Self::submit_register`]'s queue).
    pub fn submit_config_register(&mut self, request: Request<RegisterTransfer>) {
        self.config_reg_requests.push_back(request);
    }

    /// Queue an ad hoc register request.
    pub fn submit_register(&mut self, request: Request<RegisterTransfer>) {
        self.reg_requests.push_back(request);
    }

    /// Queue an FoE request for later servicing.
    pub fn submit_foe(&mut self, request: Request<FoeTransfer>) {
        self.foe_requests.push_back(request);
    }

    /// Queue an SoE request for later servicing.
    pub fn submit_soe(&mut self, request: Request<SoeTransfer>) {
        self.soe_requests.push_back(request);
    }

    pub(crate) fn pop_sdo(&mut self) -> Option<Request<SdoTransfer>> {
        self.sdo_requests.pop_front()
    }

    /// Pop the next register request, config queue first. The config queue
    /// is only consulted (not drained) until its front request successfully
    /// claims itself - checked first, left in place if it can't be claimed.
    pub(crate) fn pop_register(&mut self) -> Option<Request<RegisterTransfer>> {
        if let Some(front) = self.config_reg_requests.front() {
            if front.claim() {
                return self.config_reg_requests.pop_front();
            }
        }
        self.reg_requests.pop_front()
    }

    pub(crate) fn pop_foe(&mut self) -> Option<Request<FoeTransfer>> {
        self.foe_requests.pop_front()
    }

    pub(crate) fn pop_soe(&mut self) -> Option<Request<SoeTransfer>> {
        self.soe_requests.pop_front()
    }

    /// Number of requests of all kinds currently queued (for tests/metrics).
    pub fn queued_len(&self) -> usize {
        self.sdo_requests.len()
            + self.config_reg_requests.len()
            + self.reg_requests.len()
            + self.foe_requests.len()
            + self.soe_requests.len()
    }
}
