//! AXI SPI Controller - polled driver for a memory-mapped AXI SPI master
//!
//! The driver binds to a register block someone else has already mapped,
//! programs it once through `init`, then exchanges single command words with
//! the peripheral, polling its status registers with a bounded timeout.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod poll;
pub mod regs;
pub mod sim;
pub mod transfer;

// Re-export main types for convenience
pub use command::{Command, Opcode};
pub use config::{Config, ControllerConfig, Transfer};
pub use controller::{AxiSpiController, TransferState};
pub use error::{AxiSpiError, Result};
pub use poll::{Condition, Delay, ThreadDelay};
pub use regs::{MmioRegisters, Register, Registers};
pub use sim::SimRegisters;
pub use transfer::TransferRunner;
