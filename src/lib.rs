//! Process-data plane of an EtherCAT fieldbus master.
//!
//! This crate owns the two tightly coupled subsystems that make up cyclic
//! process-data exchange and aperiodic per-slave service requests:
//!
//! - [`domain`]: packs application-registered [`fmmu_config::FmmuConfig`]s
//!   into [`datagram_pair::DatagramPair`]s, allocates the shared process
//!   image, and each cycle stages sends ([`domain::Domain::queue`]) and
//!   reconciles redundant link responses
//!   ([`domain::Domain::process`]).
//! - [`slave_fsm`]: a cooperative per-slave state machine multiplexing SDO,
//!   register, FoE and SoE requests over one shared aperiodic datagram.
//!
//! Everything that actually puts bytes on a wire - frame scheduling, the CoE
//! /FoE/SoE protocol engines, slave scanning - is an external collaborator,
//! expressed here only as the [`scheduler::MasterScheduler`] and
//! [`sub_fsm::SubFsm`] trait boundaries.

#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod al_state;
pub mod datagram;
pub mod datagram_pair;
pub mod domain;
pub mod error;
pub mod fmmu_config;
pub mod request;
pub mod scheduler;
pub mod slave;
pub mod slave_fsm;
pub mod sub_fsm;
pub mod wire;

pub use al_state::AlState;
pub use datagram::{Datagram, DatagramState, DeviceIndex};
pub use datagram_pair::DatagramPair;
pub use domain::{Domain, DomainState, WcState};
pub use error::Error;
pub use fmmu_config::{Direction, FmmuConfig, FmmuHandle, SlaveConfigId};
pub use request::{Request, RequestState};
pub use scheduler::MasterScheduler;
pub use slave::Slave;
pub use slave_fsm::{FsmState, SlaveRequestFsm};
pub use sub_fsm::{FoeTransfer, FsmPoll, RegisterTransfer, SdoTransfer, SoeTransfer, SubFsm};
pub use wire::{Command, DatagramHeader, MAX_PAYLOAD};
