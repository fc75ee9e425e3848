//! AXI SPI register block layout and volatile access
//!
//! The peripheral exposes nine consecutive 32-bit words. Every access goes
//! straight to the device: values are never cached between calls.

use crate::error::{AxiSpiError, Result};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

pub const REGISTER_COUNT: usize = 9;
pub const REGISTER_BLOCK_SIZE: usize = REGISTER_COUNT * 4;

pub const STATUS_CMD_INT_ENABLE: u32 = 1 << 0;
pub const STATUS_RSP_INT_ENABLE: u32 = 1 << 1;
pub const STATUS_CMD_INT_FLAG: u32 = 1 << 8;
pub const STATUS_RSP_INT_FLAG: u32 = 1 << 9;
/// Free command queue slots live in the upper half of `status`
pub const STATUS_CMD_SLOTS_MASK: u32 = 0xffff_0000;
pub const STATUS_CMD_SLOTS_SHIFT: u32 = 16;

pub const CONFIG_CPOL: u32 = 1 << 0;
pub const CONFIG_CPHA: u32 = 1 << 1;

/// Highest chip-select index accepted by select/deselect
pub const MAX_DEVICES: u8 = 8;

/// Registers in word order, starting at the base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Data = 0,
    Status = 1,
    Config = 2,
    SclkToggle = 3,
    SsSetup = 4,
    SsHold = 5,
    SsDisable = 6,
    CmdPopCond = 7,
    SsSignal = 8,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Data,
        Register::Status,
        Register::Config,
        Register::SclkToggle,
        Register::SsSetup,
        Register::SsHold,
        Register::SsDisable,
        Register::CmdPopCond,
        Register::SsSignal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Byte offset from the base address
    pub fn offset(self) -> usize {
        self.index() * 4
    }
}

/// Number of free command slots encoded in a `status` value
pub fn command_slots(status: u32) -> u32 {
    (status & STATUS_CMD_SLOTS_MASK) >> STATUS_CMD_SLOTS_SHIFT
}

/// `ss_signal` value with all `width` chip-select lines deasserted
pub fn ss_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Word-level access to an AXI SPI register block.
///
/// Implementations must observe and affect live device state on every call.
pub trait Registers {
    fn read(&self, reg: Register) -> u32;
    fn write(&mut self, reg: Register, value: u32);
}

/// Non-owning handle over a memory-mapped register block.
///
/// The mapping is owned elsewhere and must outlive `'a`. Dropping the handle
/// leaves the registers and the mapping untouched.
#[derive(Debug)]
pub struct MmioRegisters<'a> {
    base: NonNull<u32>,
    _mapping: PhantomData<&'a mut [u32; REGISTER_COUNT]>,
}

impl<'a> MmioRegisters<'a> {
    /// Bind to an already-mapped register block.
    ///
    /// # Safety
    /// `base` must point at `REGISTER_BLOCK_SIZE` bytes of mapped device
    /// memory that stay valid for `'a` and are not accessed through other
    /// Rust references meanwhile.
    pub unsafe fn from_ptr(base: *mut u8) -> Result<Self> {
        let base = NonNull::new(base.cast::<u32>()).ok_or(AxiSpiError::NoDevice)?;
        if base.as_ptr() as usize % std::mem::align_of::<u32>() != 0 {
            return Err(AxiSpiError::InvalidArgument(format!(
                "register base {:p} is not word aligned",
                base.as_ptr()
            )));
        }
        Ok(MmioRegisters {
            base,
            _mapping: PhantomData,
        })
    }

    /// Bind to a plain word array laid out like the device.
    pub fn from_words(words: &'a mut [u32; REGISTER_COUNT]) -> Self {
        MmioRegisters {
            base: NonNull::from(words).cast::<u32>(),
            _mapping: PhantomData,
        }
    }

    pub fn base(&self) -> *const u32 {
        self.base.as_ptr()
    }
}

impl Registers for MmioRegisters<'_> {
    #[inline]
    fn read(&self, reg: Register) -> u32 {
        // SAFETY: the index is below REGISTER_COUNT and the block is valid for 'a
        unsafe { ptr::read_volatile(self.base.as_ptr().add(reg.index())) }
    }

    #[inline]
    fn write(&mut self, reg: Register, value: u32) {
        // SAFETY: see read
        unsafe { ptr::write_volatile(self.base.as_ptr().add(reg.index()), value) }
    }
}
