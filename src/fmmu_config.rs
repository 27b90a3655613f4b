//! FMMU configuration: a slave's memory-mapping descriptor within a domain.

use core::fmt;

/// A lightweight, non-owning reference to a slave configuration.
///
/// The real slave configuration object (alias/position lookup, PDO entry
/// bookkeeping, SII access) lives outside this crate's scope, owned by the
/// application's configuration/scanning collaborator. Within a domain we
/// only ever need to tell two FMMUs' slave configs apart, so a small opaque
/// id suffices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SlaveConfigId(pub u32);

/// The direction of an FMMU mapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Direction {
    /// Slave writes into the logical process image (input to the master).
    Input = 0,
    /// Master writes into the slave's memory (output from the master).
    Output = 1,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// A handle to an [`FmmuConfig`] registered in a domain, returned by
/// [`crate::domain::Domain::add_fmmu`].
///
/// A back-pointer from FMMU to domain, recast for a `Vec`-owned layout:
/// since the domain owns its FMMU configs directly in an ordered `Vec`
/// rather than an intrusive list threaded through slave-owned objects, the
/// handle is simply the FMMU's position in that `Vec`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FmmuHandle(pub(crate) usize);

/// Descriptor mapping one slave-internal sync-manager window to a byte range
/// in a domain's process image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FmmuConfig {
    /// The slave configuration this FMMU belongs to.
    pub slave_config: SlaveConfigId,

    /// Read (`input`) or write (`output`) direction.
    pub direction: Direction,

    /// Logical address of this FMMU's window.
    ///
    /// Before [`crate::domain::Domain::finish`] this is the FMMU's offset
    /// within the domain (assigned at [`crate::domain::Domain::add_fmmu`]
    /// time); `finish` rewrites it in place by adding the domain's logical
    /// base address.
    pub logical_start: u32,

    /// Size of this FMMU's mapped window, in bytes.
    pub data_size: usize,

    /// Index of the datagram pair this FMMU's window falls into. Populated
    /// by `finish`; `0` beforehand and meaningless until then.
    pub(crate) pair_index: usize,

    /// Byte offset of this FMMU's window within its datagram pair's window.
    /// Populated by `finish`.
    pub(crate) offset_in_pair: usize,
}

impl FmmuConfig {
    /// Construct a new FMMU config. `logical_start` and the pair mapping
    /// fields are assigned later by the owning domain; pass `0` here.
    pub fn new(slave_config: SlaveConfigId, direction: Direction, data_size: usize) -> Self {
        Self {
            slave_config,
            direction,
            logical_start: 0,
            data_size,
            pair_index: 0,
            offset_in_pair: 0,
        }
    }
}
