use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Debug)]
pub enum Chip8Error {
    Io(std::io::Error),
    Load {
        path: PathBuf,
        source: std::io::Error,
    },
    RomTooLarge {
        size: usize,
        max: usize,
    },
    UnknownOpcode {
        opcode: u16,
        pc: u16,
    },
    MemoryFault {
        address: usize,
    },
    StackOverflow {
        sp: u16,
    },
    StackUnderflow {
        sp: u16,
    },
    InputClosed,
    ThreadPanicked(&'static str),
    InvalidArgument(&'static str),
}

impl Chip8Error {
    pub fn load(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Load {
            path: path.into(),
            source,
        }
    }
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::Load { path, source } => {
                write!(f, "couldn't load {}: {source}", path.display())
            }
            Self::RomTooLarge { size, max } => {
                write!(f, "ROM too large: {size} bytes (max {max})")
            }
            Self::UnknownOpcode { opcode, pc } => {
                write!(f, "unknown opcode 0x{opcode:04x} at 0x{pc:03x}")
            }
            Self::MemoryFault { address } => {
                write!(f, "memory access out of bounds: 0x{address:04x}")
            }
            Self::StackOverflow { sp } => write!(f, "call stack overflow (sp=0x{sp:03x})"),
            Self::StackUnderflow { sp } => {
                write!(f, "return instruction with empty stack (sp=0x{sp:03x})")
            }
            Self::InputClosed => write!(f, "input closed while waiting for a key"),
            Self::ThreadPanicked(name) => write!(f, "{name} thread panicked"),
            Self::InvalidArgument(argument) => write!(f, "invalid argument: {argument}"),
        }
    }
}

impl std::error::Error for Chip8Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) | Self::Load { source: error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Chip8Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
