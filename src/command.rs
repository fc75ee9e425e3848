//! Command words pushed through the `data` register
//!
//! A command is the payload byte in bits 0..8 with the opcode tag in bits 24..32.

use std::fmt;

const OPCODE_SHIFT: u32 = 24;
const PAYLOAD_MASK: u32 = 0xff;
const RESERVED_MASK: u32 = 0x00ff_ff00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Shift the payload out, discard what comes back
    Write = 0x00,
    /// Shift the payload out and queue the received byte as a response
    ReadWrite = 0x01,
    /// Release the chip-select line named by the payload
    Deselect = 0x10,
    /// Assert the chip-select line named by the payload
    Select = 0x11,
}

impl Opcode {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Opcode::Write),
            0x01 => Some(Opcode::ReadWrite),
            0x10 => Some(Opcode::Deselect),
            0x11 => Some(Opcode::Select),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Tag already shifted into its position in the command word
    pub fn bits(self) -> u32 {
        (self.tag() as u32) << OPCODE_SHIFT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    pub opcode: Opcode,
    pub payload: u8,
}

impl Command {
    pub fn new(opcode: Opcode, payload: u8) -> Self {
        Command { opcode, payload }
    }

    pub fn write(byte: u8) -> Self {
        Self::new(Opcode::Write, byte)
    }

    /// Read-while-write with a zero payload
    pub fn read() -> Self {
        Self::new(Opcode::ReadWrite, 0)
    }

    pub fn read_write(byte: u8) -> Self {
        Self::new(Opcode::ReadWrite, byte)
    }

    pub fn select(index: u8) -> Self {
        Self::new(Opcode::Select, index)
    }

    pub fn deselect(index: u8) -> Self {
        Self::new(Opcode::Deselect, index)
    }

    pub fn encode(self) -> u32 {
        self.payload as u32 | self.opcode.bits()
    }

    /// Parse a raw command word. Unknown tags and words with bits set
    /// between the payload and the tag are rejected.
    pub fn decode(word: u32) -> Option<Self> {
        if word & RESERVED_MASK != 0 {
            return None;
        }
        let opcode = Opcode::from_tag((word >> OPCODE_SHIFT) as u8)?;
        Some(Command::new(opcode, (word & PAYLOAD_MASK) as u8))
    }
}

impl From<Command> for u32 {
    fn from(cmd: Command) -> u32 {
        cmd.encode()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02x}) [0x{:08x}]", self.opcode, self.payload, self.encode())
    }
}
