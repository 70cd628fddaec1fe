use crate::chip8_vm::config::{FONT_BYTES, FONT_START, MEMORY_SIZE};
use crate::chip8_vm::error::Chip8Error;

/// Flat 4 KiB address space shared by the font, the program and the call stack.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: [u8; MEMORY_SIZE],
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            bytes: [0; MEMORY_SIZE],
        }
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed memory with the built-in hexadecimal font at `FONT_START`.
    pub fn with_font() -> Self {
        let mut memory = Self::default();
        memory.bytes[FONT_START..FONT_START + FONT_BYTES.len()].copy_from_slice(&FONT_BYTES);
        memory
    }

    pub fn read(&self, address: usize) -> Result<u8, Chip8Error> {
        self.bytes
            .get(address)
            .copied()
            .ok_or(Chip8Error::MemoryFault { address })
    }

    pub fn write(&mut self, address: usize, value: u8) -> Result<(), Chip8Error> {
        let cell = self
            .bytes
            .get_mut(address)
            .ok_or(Chip8Error::MemoryFault { address })?;
        *cell = value;
        Ok(())
    }

    /// Reads a big-endian instruction word.
    pub fn read_word(&self, address: usize) -> Result<u16, Chip8Error> {
        let high = self.read(address)?;
        let low = self.read(address + 1)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    pub fn range(&self, start: usize, len: usize) -> Result<&[u8], Chip8Error> {
        let end = checked_end(start, len)?;
        Ok(&self.bytes[start..end])
    }

    pub fn range_mut(&mut self, start: usize, len: usize) -> Result<&mut [u8], Chip8Error> {
        let end = checked_end(start, len)?;
        Ok(&mut self.bytes[start..end])
    }

    pub fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), Chip8Error> {
        let max = MEMORY_SIZE.saturating_sub(offset);
        if data.len() > max {
            return Err(Chip8Error::RomTooLarge {
                size: data.len(),
                max,
            });
        }

        self.range_mut(offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

fn checked_end(start: usize, len: usize) -> Result<usize, Chip8Error> {
    let end = start.saturating_add(len);
    if end > MEMORY_SIZE {
        // Report the first address that falls outside memory.
        return Err(Chip8Error::MemoryFault {
            address: start.max(MEMORY_SIZE),
        });
    }
    Ok(end)
}
