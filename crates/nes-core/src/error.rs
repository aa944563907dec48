//! Crate-level error type

use thiserror::Error;

use crate::cartridge::CartridgeError;
use crate::cpu::CpuError;

/// Errors surfaced by [`crate::system::NesSystem`]
#[derive(Debug, Error)]
pub enum NesError {
    /// The ROM image could not be loaded; the running system is untouched
    #[error("cartridge load failed: {0}")]
    Cartridge(#[from] CartridgeError),
    /// Emulation hit an instruction it cannot execute
    #[error("CPU halted: {0}")]
    Cpu(#[from] CpuError),
}
