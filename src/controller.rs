//! AXI SPI command controller
//!
//! Drives a memory-mapped AXI SPI master one command word at a time. Every
//! hardware operation waits, by polling, for the peripheral to be ready,
//! then performs a single register access.

use crate::command::Command;
use crate::config::ControllerConfig;
use crate::error::{AxiSpiError, Result};
use crate::poll::{self, Condition, Delay, ThreadDelay};
use crate::regs::{self, MmioRegisters, Register, Registers, MAX_DEVICES};
use log::{debug, info, warn};

/// Continuous-mode transfer gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Streaming,
}

pub struct AxiSpiController<R: Registers, D: Delay = ThreadDelay> {
    regs: R,
    delay: D,
    timeout_ms: u16,
    continuous: bool,
    ss_width: u8,
    state: TransferState,
}

impl<'a> AxiSpiController<MmioRegisters<'a>> {
    /// Bind a controller to an already-mapped register block.
    ///
    /// # Safety
    /// Same contract as [`MmioRegisters::from_ptr`].
    pub unsafe fn from_raw(base: *mut u8) -> Result<Self> {
        let regs = MmioRegisters::from_ptr(base)?;
        debug!("Bound AXI SPI controller at {:p}", regs.base());
        Ok(Self::new(regs))
    }
}

impl<R: Registers> AxiSpiController<R> {
    pub fn new(regs: R) -> Self {
        Self::with_delay(regs, ThreadDelay)
    }
}

impl<R: Registers, D: Delay> AxiSpiController<R, D> {
    /// Bind with a custom sleep implementation.
    ///
    /// Until `init` runs the timeout is zero, so waits succeed immediately.
    pub fn with_delay(regs: R, delay: D) -> Self {
        AxiSpiController {
            regs,
            delay,
            timeout_ms: 0,
            continuous: false,
            ss_width: 1,
            state: TransferState::Idle,
        }
    }

    /// Program clock mode, interrupts and timing, and latch the software settings.
    ///
    /// May be called again; every setting is overwritten.
    pub fn init(&mut self, config: &ControllerConfig) -> Result<()> {
        config.validate()?;

        let mode = config.config_word();
        debug!(
            "Programming config=0x{:x} sclk_toggle={} ss_setup={} ss_hold={} ss_disable={}",
            mode, config.sclk_toggle, config.ss_setup, config.ss_hold, config.ss_disable
        );
        self.regs.write(Register::Config, mode);
        self.regs.write(
            Register::Status,
            regs::STATUS_CMD_INT_ENABLE | regs::STATUS_RSP_INT_ENABLE,
        );
        self.regs.write(Register::SclkToggle, config.sclk_toggle);
        self.regs.write(Register::SsSetup, config.ss_setup);
        self.regs.write(Register::SsHold, config.ss_hold);
        self.regs.write(Register::SsDisable, config.ss_disable);

        self.timeout_ms = config.timeout_ms;
        self.continuous = config.continuous;
        self.ss_width = config.ss_width;
        self.state = TransferState::Idle;

        info!(
            "AXI SPI controller initialized: mode={} timeout={}ms continuous={} ss_width={}",
            mode, self.timeout_ms, self.continuous, self.ss_width
        );
        Ok(())
    }

    /// Shift `byte` out, ignoring whatever comes back.
    pub fn write(&mut self, byte: u8) -> Result<()> {
        self.issue(Command::write(byte))
    }

    /// Clock in one byte. The response must be collected with `read`.
    pub fn read_request(&mut self) -> Result<()> {
        self.issue(Command::read())
    }

    /// Full-duplex exchange; the received byte is collected with `read`.
    pub fn read_write_request(&mut self, byte: u8) -> Result<()> {
        self.issue(Command::read_write(byte))
    }

    /// Collect the response of an earlier read request.
    ///
    /// Pairing requests with reads is up to the caller.
    pub fn read(&mut self) -> Result<u8> {
        self.wait(Condition::Response)?;
        let rsp = self.regs.read(Register::Data);
        debug!("Response 0x{:08x}", rsp);
        Ok((rsp & 0xff) as u8)
    }

    /// `read_write_request` followed by `read`.
    pub fn transfer(&mut self, byte: u8) -> Result<u8> {
        self.read_write_request(byte)?;
        self.read()
    }

    pub fn select(&mut self, index: u8) -> Result<()> {
        check_device_index(index)?;
        self.issue(Command::select(index))
    }

    pub fn deselect(&mut self, index: u8) -> Result<()> {
        check_device_index(index)?;
        self.issue(Command::deselect(index))
    }

    /// Open the continuous-mode gate. Takes effect immediately.
    pub fn on(&mut self) -> Result<()> {
        self.require_continuous()?;
        self.regs.write(Register::CmdPopCond, 1);
        self.state = TransferState::Streaming;
        debug!("Continuous transfer started");
        Ok(())
    }

    /// Close the continuous-mode gate once every chip-select line is idle.
    pub fn off(&mut self) -> Result<()> {
        self.require_continuous()?;
        self.wait(Condition::ContinuousCancel)?;
        self.regs.write(Register::CmdPopCond, 0);
        self.state = TransferState::Idle;
        debug!("Continuous transfer stopped");
        Ok(())
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn timeout_ms(&self) -> u16 {
        self.timeout_ms
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn ss_width(&self) -> u8 {
        self.ss_width
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Tear down the software side and hand back the register handle.
    /// The hardware is left as it is.
    pub fn release(self) -> R {
        self.regs
    }

    fn issue(&mut self, cmd: Command) -> Result<()> {
        self.wait(Condition::CommandSlot)?;
        debug!("Issuing {}", cmd);
        self.regs.write(Register::Data, cmd.encode());
        Ok(())
    }

    fn wait(&mut self, condition: Condition) -> Result<()> {
        let regs = &self.regs;
        let ss_width = self.ss_width;
        let result = poll::wait_for(self.timeout_ms, &mut self.delay, || {
            condition.check(regs, ss_width)
        });
        if let Err(e) = &result {
            warn!("Waiting for {:?} failed: {}", condition, e);
        }
        result
    }

    fn require_continuous(&self) -> Result<()> {
        if self.continuous {
            Ok(())
        } else {
            Err(AxiSpiError::InvalidArgument(
                "controller not configured for continuous mode".to_string(),
            ))
        }
    }
}

fn check_device_index(index: u8) -> Result<()> {
    if index > MAX_DEVICES {
        return Err(AxiSpiError::InvalidArgument(format!(
            "device index {} exceeds maximum {}",
            index, MAX_DEVICES
        )));
    }
    Ok(())
}
