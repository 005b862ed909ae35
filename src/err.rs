use thiserror::Error;

use crate::pool::PoolKind;

pub type Result<T> = core::result::Result<T, PcieError>;

/// Errors surfaced by the controller core. Variants carry the pool, index
/// or attempted value they refer to.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PcieError {
    /// A resource pool has no free index. Recoverable: retry after a
    /// release, or report the capacity limit upward.
    #[error("no free index in {pool:?} pool")]
    ResourceExhausted { pool: PoolKind },

    /// Releasing an index that is not currently allocated.
    #[error("double free of index {index} in {pool:?} pool")]
    DoubleFree { pool: PoolKind, index: usize },

    /// Address range is empty, inverted, or not aligned to the minimum
    /// region granularity.
    #[error("invalid address range {base:#x}..={limit:#x}")]
    InvalidRange { base: u64, limit: u64 },

    /// Caller passed an out-of-domain argument (index, size, lane count).
    #[error("invalid argument: {what}")]
    InvalidArgument { what: &'static str },

    /// A function with this number is already registered.
    #[error("function {func} already present")]
    DuplicateFunction { func: u8 },

    /// The link never reported both SMLH and RDLH up within the retry
    /// budget. Fatal to bring-up; there is no automatic re-train.
    #[error("link training timed out after {retries} retries")]
    LinkTrainingTimeout { retries: u32 },

    /// Directed speed change did not complete. Non-fatal: the link stays
    /// up at its previous speed.
    #[error("speed negotiation to gen{target_gen} failed")]
    SpeedNegotiationFailed { target_gen: u8 },

    /// Requested BAR size is not in the resizable-BAR capability bitmap,
    /// or the capability is absent.
    #[error("unsupported resize of BAR {bar} to {size:#x}")]
    UnsupportedResize { bar: u8, size: u64 },

    /// Region type not valid for the requested direction.
    #[error("unsupported region type {type_code:#x} for this direction")]
    UnsupportedType { type_code: u32 },
}
