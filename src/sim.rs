//! Simulated AXI SPI register block
//!
//! Models the parts of the peripheral the controller depends on: the free
//! command slot count, the response FIFO and its flag, and the chip-select
//! lines. Every write is logged so callers can check exactly what reached
//! the "hardware" and when.

use crate::command::{Command, Opcode};
use crate::regs::{self, Register, Registers, REGISTER_COUNT};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Byte clocked in when no MISO data was queued (line idles high)
pub const IDLE_MISO: u8 = 0xff;
const DEFAULT_COMMAND_SLOTS: u16 = 16;

/// One register write as seen by the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub reg: Register,
    pub value: u32,
    /// `ss_signal` reads performed before this write
    pub ss_signal_reads: u32,
}

#[derive(Debug)]
pub struct SimRegisters {
    words: [u32; REGISTER_COUNT],
    command_slots: Cell<u16>,
    stalled_status_reads: Cell<u32>,
    held_ss_reads: Cell<u32>,
    ss_signal_reads: Cell<u32>,
    miso: RefCell<VecDeque<u8>>,
    responses: RefCell<VecDeque<u8>>,
    commands: Vec<Command>,
    writes: Vec<RegisterWrite>,
}

impl SimRegisters {
    /// A device with `ss_width` chip-select lines, all released.
    pub fn new(ss_width: u8) -> Self {
        let mut words = [0u32; REGISTER_COUNT];
        words[Register::SsSignal.index()] = regs::ss_mask(ss_width);
        SimRegisters {
            words,
            command_slots: Cell::new(DEFAULT_COMMAND_SLOTS),
            stalled_status_reads: Cell::new(0),
            held_ss_reads: Cell::new(0),
            ss_signal_reads: Cell::new(0),
            miso: RefCell::new(VecDeque::new()),
            responses: RefCell::new(VecDeque::new()),
            commands: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn set_command_slots(&self, slots: u16) {
        self.command_slots.set(slots);
    }

    /// The next `reads` reads of `status` report a full command queue.
    pub fn stall_command_slots(&self, reads: u32) {
        self.stalled_status_reads.set(reads);
    }

    /// The next `reads` reads of `ss_signal` report line 0 still asserted.
    pub fn hold_chip_select(&self, reads: u32) {
        self.held_ss_reads.set(reads);
    }

    /// Bytes the slave shifts back, one per read-while-write command.
    pub fn queue_miso(&self, bytes: &[u8]) {
        self.miso.borrow_mut().extend(bytes.iter().copied());
    }

    /// Place a byte directly in the response FIFO.
    pub fn push_response(&self, byte: u8) {
        self.responses.borrow_mut().push_back(byte);
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.borrow().len()
    }

    /// Raw stored word, without read side effects
    pub fn word(&self, reg: Register) -> u32 {
        self.words[reg.index()]
    }

    pub fn ss_signal_reads(&self) -> u32 {
        self.ss_signal_reads.get()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    pub fn writes_to(&self, reg: Register) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|w| w.reg == reg)
            .map(|w| w.value)
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.writes.clear();
    }

    fn status(&self) -> u32 {
        let mut status = self.words[Register::Status.index()] & 0xffff;
        status &= !(regs::STATUS_RSP_INT_FLAG | regs::STATUS_CMD_INT_FLAG);
        if !self.responses.borrow().is_empty() {
            status |= regs::STATUS_RSP_INT_FLAG;
        }

        let stalled = self.stalled_status_reads.get();
        let slots = if stalled > 0 {
            self.stalled_status_reads.set(stalled - 1);
            0
        } else {
            self.command_slots.get()
        };
        if slots > 0 {
            status |= regs::STATUS_CMD_INT_FLAG;
        }
        status | (slots as u32) << regs::STATUS_CMD_SLOTS_SHIFT
    }

    fn ss_signal(&self) -> u32 {
        self.ss_signal_reads.set(self.ss_signal_reads.get() + 1);
        let value = self.words[Register::SsSignal.index()];
        let held = self.held_ss_reads.get();
        if held > 0 {
            self.held_ss_reads.set(held - 1);
            value & !1
        } else {
            value
        }
    }

    fn execute(&mut self, word: u32) {
        let cmd = match Command::decode(word) {
            Some(cmd) => cmd,
            None => {
                warn!("Simulated device ignoring malformed command 0x{:08x}", word);
                return;
            }
        };
        debug!("Simulated device executing {}", cmd);

        let ss = &mut self.words[Register::SsSignal.index()];
        match cmd.opcode {
            Opcode::Write => {}
            Opcode::ReadWrite => {
                let byte = self.miso.borrow_mut().pop_front().unwrap_or(IDLE_MISO);
                self.responses.borrow_mut().push_back(byte);
            }
            Opcode::Select if cmd.payload < 32 => *ss &= !(1 << cmd.payload),
            Opcode::Deselect if cmd.payload < 32 => *ss |= 1 << cmd.payload,
            Opcode::Select | Opcode::Deselect => {}
        }
        self.commands.push(cmd);
    }
}

impl Default for SimRegisters {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Registers for SimRegisters {
    fn read(&self, reg: Register) -> u32 {
        match reg {
            Register::Status => self.status(),
            Register::SsSignal => self.ss_signal(),
            Register::Data => self
                .responses
                .borrow_mut()
                .pop_front()
                .map(u32::from)
                .unwrap_or(0),
            _ => self.words[reg.index()],
        }
    }

    fn write(&mut self, reg: Register, value: u32) {
        self.writes.push(RegisterWrite {
            reg,
            value,
            ss_signal_reads: self.ss_signal_reads.get(),
        });
        match reg {
            Register::Data => self.execute(value),
            // Flags are read-only, only the enable bits stick
            Register::Status => {
                self.words[reg.index()] =
                    value & (regs::STATUS_CMD_INT_ENABLE | regs::STATUS_RSP_INT_ENABLE)
            }
            _ => self.words[reg.index()] = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_command_queues_response() {
        let mut sim = SimRegisters::new(2);
        sim.queue_miso(&[0x11, 0x22]);
        sim.write(Register::Data, Command::read_write(0xaa).encode());
        sim.write(Register::Data, Command::read().encode());
        sim.write(Register::Data, Command::read().encode());
        assert_eq!(sim.pending_responses(), 3);
        assert_eq!(sim.read(Register::Data), 0x11);
        assert_eq!(sim.read(Register::Data), 0x22);
        assert_eq!(sim.read(Register::Data), IDLE_MISO as u32);
        assert_eq!(sim.pending_responses(), 0);
    }

    #[test]
    fn test_select_drives_ss_lines() {
        let mut sim = SimRegisters::new(4);
        assert_eq!(sim.read(Register::SsSignal), 0b1111);
        sim.write(Register::Data, Command::select(2).encode());
        assert_eq!(sim.read(Register::SsSignal), 0b1011);
        sim.write(Register::Data, Command::deselect(2).encode());
        assert_eq!(sim.read(Register::SsSignal), 0b1111);
        assert_eq!(sim.ss_signal_reads(), 3);
    }

    #[test]
    fn test_stalled_status_reports_no_slots() {
        let sim = SimRegisters::new(1);
        sim.stall_command_slots(2);
        assert_eq!(regs::command_slots(sim.read(Register::Status)), 0);
        assert_eq!(regs::command_slots(sim.read(Register::Status)), 0);
        assert_eq!(regs::command_slots(sim.read(Register::Status)), 16);
    }

    #[test]
    fn test_status_write_keeps_only_enable_bits() {
        let mut sim = SimRegisters::new(1);
        sim.write(Register::Status, 0xffff_ffff);
        assert_eq!(
            sim.word(Register::Status),
            regs::STATUS_CMD_INT_ENABLE | regs::STATUS_RSP_INT_ENABLE
        );
    }

    #[test]
    fn test_malformed_command_is_logged_but_ignored() {
        let mut sim = SimRegisters::new(1);
        sim.write(Register::Data, 0x7700_0000);
        assert!(sim.commands().is_empty());
        assert_eq!(sim.writes_to(Register::Data), vec![0x7700_0000]);
    }
}
