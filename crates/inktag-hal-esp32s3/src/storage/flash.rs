//! SPI flash access through the ROM routines, plus partition lookup.
//!
//! Every ROM call runs inside a critical section: the panel job on the
//! second core reads the image partition while the control core may be
//! rewriting the settings sector.

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use log::debug;

pub const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 8 * 1024 * 1024;
const READ_WORDS: usize = 64;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashError {
    PartitionTable,
    PartitionMissing,
    PartitionTooSmall,
    OutOfBounds,
    Unaligned,
    FlashOpFailed(i32),
    Unsupported,
}

/// Byte range of one data partition.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PartitionWindow {
    pub offset: u32,
    pub len: u32,
}

impl PartitionWindow {
    /// Address of the last sector, where single-record stores live.
    pub const fn last_sector(self) -> u32 {
        self.offset + self.len - FLASH_SECTOR_SIZE
    }

    /// Absolute address of `offset..offset + len` inside the partition.
    pub fn absolute(self, offset: u32, len: usize) -> Result<u32, FlashError> {
        let end = offset
            .checked_add(len as u32)
            .ok_or(FlashError::OutOfBounds)?;
        if end > self.len {
            return Err(FlashError::OutOfBounds);
        }
        Ok(self.offset + offset)
    }
}

#[derive(Debug)]
pub struct RawFlash;

impl RawFlash {
    pub fn new() -> Result<Self, FlashError> {
        let rc = critical_section::with(|_| unsafe { esp_rom_spiflash_unlock() });
        check(rc)?;
        Ok(Self)
    }

    /// Finds the writable data partition called `label`.
    pub fn find_data_partition(&mut self, label: &str) -> Result<PartitionWindow, FlashError> {
        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table =
            read_partition_table(self, &mut table_buf).map_err(|_| FlashError::PartitionTable)?;

        let entry = table
            .iter()
            .filter(|entry| matches!(entry.partition_type(), PartitionType::Data(_)))
            .find(|entry| entry.label_as_str() == label)
            .ok_or(FlashError::PartitionMissing)?;

        if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
            return Err(FlashError::PartitionTooSmall);
        }

        debug!(
            "flash: partition {} at {:#x}+{:#x}",
            label,
            entry.offset(),
            entry.len()
        );
        Ok(PartitionWindow {
            offset: entry.offset(),
            len: entry.len(),
        })
    }

    pub fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashError::Unaligned);
        }

        let sector = sector_addr / FLASH_SECTOR_SIZE;
        let rc = critical_section::with(|_| unsafe { esp_rom_spiflash_erase_sector(sector) });
        check(rc)
    }

    /// Reads `out.len()` bytes at any address; the ROM only reads whole words.
    pub fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashError> {
        let end = addr
            .checked_add(out.len() as u32)
            .ok_or(FlashError::OutOfBounds)?;
        let mut words = [0u32; READ_WORDS];
        let mut cursor = addr & !0b11;

        while cursor < end {
            let span = ((end - cursor + 3) & !0b11).min((READ_WORDS * 4) as u32);
            let rc = critical_section::with(|_| unsafe {
                esp_rom_spiflash_read(cursor, words.as_mut_ptr() as *const u32, span as _)
            });
            check(rc)?;

            for (index, word) in words[..span as usize / 4].iter().enumerate() {
                let word_addr = cursor + index as u32 * 4;
                for (lane, byte) in word.to_le_bytes().into_iter().enumerate() {
                    let at = word_addr + lane as u32;
                    if at >= addr && at < end {
                        out[(at - addr) as usize] = byte;
                    }
                }
            }
            cursor += span;
        }

        Ok(())
    }

    /// Programs `data` into an erased area; bytes sharing a word with
    /// `data` are written as `0xFF` and so left untouched.
    pub fn write_erased_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let end = addr
            .checked_add(data.len() as u32)
            .ok_or(FlashError::OutOfBounds)?;
        let mut word_addr = addr & !0b11;

        while word_addr < end {
            let mut bytes = [0xFFu8; 4];
            for (lane, slot) in bytes.iter_mut().enumerate() {
                let at = word_addr + lane as u32;
                if at >= addr && at < end {
                    *slot = data[(at - addr) as usize];
                }
            }

            let word = u32::from_le_bytes(bytes);
            let rc = critical_section::with(|_| unsafe {
                esp_rom_spiflash_write(word_addr, &word as *const u32, 4)
            });
            check(rc)?;
            word_addr += 4;
        }

        Ok(())
    }
}

impl ReadStorage for RawFlash {
    type Error = FlashError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashError::Unsupported)
    }
}

fn check(rc: i32) -> Result<(), FlashError> {
    if rc == ESP_ROM_SPIFLASH_RESULT_OK {
        Ok(())
    } else {
        Err(FlashError::FlashOpFailed(rc))
    }
}
