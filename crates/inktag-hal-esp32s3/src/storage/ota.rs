//! Application slot written by the recovery image.
//!
//! The partition table carries a factory slot (the recovery image) and a
//! single OTA slot (the application), so the "next" OTA partition is always
//! the application.

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::{
    ota::OtaImageState, ota_updater::OtaUpdater, partitions::PARTITION_TABLE_MAX_LEN,
};
use esp_storage::FlashStorage;
use inktag_core::ota::FirmwareSink;
use log::{info, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OtaSlotError {
    PartitionTable,
    SlotMissing,
    Write,
    Activate,
}

pub struct FirmwareSlot {
    flash: FlashStorage<'static>,
    table: [u8; PARTITION_TABLE_MAX_LEN],
}

impl FirmwareSlot {
    pub fn new(flash: FlashStorage<'static>) -> Self {
        Self {
            flash,
            table: [0u8; PARTITION_TABLE_MAX_LEN],
        }
    }

    /// Points the boot selection at the application slot, so a reset
    /// without an upload leaves the recovery image.
    pub fn boot_application_next(&mut self) -> Result<(), OtaSlotError> {
        let mut updater = OtaUpdater::new(&mut self.flash, &mut self.table)
            .map_err(|_| OtaSlotError::PartitionTable)?;
        updater
            .activate_next_partition()
            .map_err(|_| OtaSlotError::Activate)?;
        info!("ota: application slot selected for next boot");
        Ok(())
    }
}

impl FirmwareSink for FirmwareSlot {
    type Error = OtaSlotError;

    fn prepare(&mut self) -> Result<u32, Self::Error> {
        let mut updater = OtaUpdater::new(&mut self.flash, &mut self.table)
            .map_err(|_| OtaSlotError::PartitionTable)?;
        let (slot, kind) = updater
            .next_partition()
            .map_err(|_| OtaSlotError::SlotMissing)?;
        info!("ota: writing {:?}", kind);
        Ok(slot.capacity() as u32)
    }

    fn write(&mut self, offset: u32, chunk: &[u8]) -> Result<(), Self::Error> {
        let mut updater = OtaUpdater::new(&mut self.flash, &mut self.table)
            .map_err(|_| OtaSlotError::PartitionTable)?;
        let (mut slot, _) = updater
            .next_partition()
            .map_err(|_| OtaSlotError::SlotMissing)?;
        slot.write(offset, chunk).map_err(|_| OtaSlotError::Write)
    }

    fn activate(&mut self, len: u32) -> Result<(), Self::Error> {
        let mut updater = OtaUpdater::new(&mut self.flash, &mut self.table)
            .map_err(|_| OtaSlotError::PartitionTable)?;
        updater
            .activate_next_partition()
            .map_err(|_| OtaSlotError::Activate)?;
        if updater.set_current_ota_state(OtaImageState::New).is_err() {
            warn!("ota: image state not recorded");
        }
        info!("ota: {} byte image activated", len);
        Ok(())
    }
}
