#![no_std]

extern crate alloc;

mod access;
mod atu;
mod bar;
mod controller;
mod ecc;
mod edma;
pub mod err;
mod func;
mod link;
mod msi;
mod pool;
pub mod reg;

pub use access::{MmioIo, PcieIo};
pub use atu::{AtuDirection, AtuRegionType, WindowConfig, WindowHandle, ATU_MIN_REGION_SIZE};
pub use bar::{BarFlags, BarHandle};
pub use controller::{
    EpMode, Mode, ModeFeatures, ModeOps, PcieConfig, RcMode, SocData, SunxiPcie,
};
pub use ecc::EccReport;
pub use edma::{EdmaChannel, EdmaDirection};
pub use err::PcieError;
pub use func::{EpFunction, FunctionTable};
pub use link::LinkState;
pub use msi::VectorHandle;
pub use pool::PoolKind;
