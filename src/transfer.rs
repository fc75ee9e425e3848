use crate::config::Transfer;
use crate::controller::AxiSpiController;
use crate::poll::Delay;
use crate::regs::Registers;
use anyhow::{Context, Result};
use log::{debug, info, warn};

/// Byte value clocked out while reading
pub const READ_FILL: u8 = 0x00;

/// Runs configured chip-select framed transfers on a controller.
pub struct TransferRunner<'c, R: Registers, D: Delay> {
    ctrl: &'c mut AxiSpiController<R, D>,
}

impl<'c, R: Registers, D: Delay> TransferRunner<'c, R, D> {
    pub fn new(ctrl: &'c mut AxiSpiController<R, D>) -> Self {
        TransferRunner { ctrl }
    }

    /// Run every transfer in order, returning the bytes read by each.
    pub fn run(&mut self, transfers: &[Transfer]) -> Result<Vec<Vec<u8>>> {
        let mut received = Vec::with_capacity(transfers.len());
        for (i, transfer) in transfers.iter().enumerate() {
            let rx = self.run_one(transfer).with_context(|| {
                format!(
                    "Transfer {} ({}) failed",
                    i,
                    transfer.description.as_deref().unwrap_or("unnamed")
                )
            })?;
            received.push(rx);
        }
        Ok(received)
    }

    pub fn run_one(&mut self, transfer: &Transfer) -> Result<Vec<u8>> {
        let cs = transfer.chip_select;
        debug!(
            "Transfer on cs {}: write {} byte(s), read {} byte(s)",
            cs,
            transfer.write.len(),
            transfer.read
        );

        let continuous = self.ctrl.is_continuous();
        if continuous {
            self.ctrl.on().context("Failed to start continuous transfer")?;
        }

        let result = self.framed(transfer);

        // Close the gate even when the framed exchange failed
        if continuous {
            if let Err(e) = self.ctrl.off() {
                warn!("Failed to stop continuous transfer: {}", e);
                if result.is_ok() {
                    return Err(e).context("Failed to stop continuous transfer");
                }
            }
        }

        let rx = result?;
        info!(
            "Transfer {:?} complete, received {:02x?}",
            transfer.description, rx
        );
        Ok(rx)
    }

    fn framed(&mut self, transfer: &Transfer) -> Result<Vec<u8>> {
        let cs = transfer.chip_select;
        self.ctrl
            .select(cs)
            .context(format!("Failed to select device {}", cs))?;

        let result = self.exchange(transfer);

        // Release the line even when the exchange failed
        if let Err(e) = self.ctrl.deselect(cs) {
            warn!("Failed to deselect device {}: {}", cs, e);
            if result.is_ok() {
                return Err(e).context(format!("Failed to deselect device {}", cs));
            }
        }
        result
    }

    fn exchange(&mut self, transfer: &Transfer) -> Result<Vec<u8>> {
        for &byte in &transfer.write {
            self.ctrl
                .write(byte)
                .context(format!("Failed to write 0x{:02x}", byte))?;
        }

        let mut rx = Vec::with_capacity(transfer.read);
        for n in 0..transfer.read {
            let byte = self
                .ctrl
                .transfer(READ_FILL)
                .context(format!("Failed to read byte {}", n))?;
            rx.push(byte);
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::controller::TransferState;
    use crate::config::ControllerConfig;
    use crate::error::AxiSpiError;
    use crate::poll::tests::RecordingDelay;
    use crate::regs::Register;
    use crate::sim::SimRegisters;

    fn controller(continuous: bool) -> AxiSpiController<SimRegisters, RecordingDelay> {
        let mut ctrl =
            AxiSpiController::with_delay(SimRegisters::new(2), RecordingDelay::default());
        let config = ControllerConfig {
            continuous,
            ss_width: 2,
            timeout_ms: 20,
            ..ControllerConfig::default()
        };
        ctrl.init(&config).unwrap();
        ctrl.registers_mut().clear_log();
        ctrl
    }

    fn jedec() -> Transfer {
        Transfer {
            chip_select: 1,
            write: vec![0x9f],
            read: 3,
            description: Some("jedec id".to_string()),
        }
    }

    #[test]
    fn test_run_transfer_sequence() {
        let mut ctrl = controller(false);
        ctrl.registers().queue_miso(&[0xef, 0x40, 0x18]);

        let rx = TransferRunner::new(&mut ctrl).run(&[jedec()]).unwrap();
        assert_eq!(rx, vec![vec![0xef, 0x40, 0x18]]);
        assert_eq!(
            ctrl.registers().commands(),
            &[
                Command::select(1),
                Command::write(0x9f),
                Command::read_write(READ_FILL),
                Command::read_write(READ_FILL),
                Command::read_write(READ_FILL),
                Command::deselect(1),
            ]
        );
    }

    #[test]
    fn test_continuous_transfer_opens_and_closes_gate() {
        let mut ctrl = controller(true);
        let rx = TransferRunner::new(&mut ctrl).run(&[jedec()]).unwrap();
        assert_eq!(rx[0].len(), 3);
        assert_eq!(ctrl.registers().writes_to(Register::CmdPopCond), vec![1, 0]);
        assert_eq!(ctrl.registers().writes()[0].reg, Register::CmdPopCond);
    }

    #[test]
    fn test_failed_exchange_still_deselects() {
        let mut ctrl = controller(false);
        // Response interrupts off: the first read fails immediately
        ctrl.registers_mut().write(Register::Status, 0x1);
        ctrl.registers_mut().clear_log();

        let err = TransferRunner::new(&mut ctrl).run(&[jedec()]).unwrap_err();
        assert!(err.to_string().contains("jedec id"));
        assert!(matches!(
            err.root_cause().downcast_ref::<AxiSpiError>(),
            Some(AxiSpiError::InvalidConfig(_))
        ));
        assert_eq!(ctrl.registers().commands().last(), Some(&Command::deselect(1)));
    }

    #[test]
    fn test_continuous_select_failure_closes_gate() {
        let mut ctrl = controller(true);
        ctrl.registers().set_command_slots(0);

        let err = TransferRunner::new(&mut ctrl).run(&[jedec()]).unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<AxiSpiError>(),
            Some(AxiSpiError::Timeout { timeout_ms: 20 })
        ));
        assert_eq!(ctrl.registers().writes_to(Register::CmdPopCond), vec![1, 0]);
        assert_eq!(ctrl.state(), TransferState::Idle);
    }

    #[test]
    fn test_exchange_error_kept_when_gate_stays_open() {
        let mut ctrl = controller(true);
        // Response interrupts off and a chip-select that never releases
        ctrl.registers_mut().write(Register::Status, 0x1);
        ctrl.registers().hold_chip_select(1000);
        ctrl.registers_mut().clear_log();

        let err = TransferRunner::new(&mut ctrl).run(&[jedec()]).unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<AxiSpiError>(),
            Some(AxiSpiError::InvalidConfig(_))
        ));
        assert_eq!(ctrl.registers().writes_to(Register::CmdPopCond), vec![1]);
        assert_eq!(ctrl.state(), TransferState::Streaming);
    }
}
