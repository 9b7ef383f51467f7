use embedded_storage::ReadStorage;

use super::{
    IMAGES_PARTITION,
    flash::{FlashError, PartitionWindow, RawFlash},
};

/// Read-only view of the `images` partition, addressed from its start.
#[derive(Debug)]
pub struct ImagePartition {
    flash: RawFlash,
    window: PartitionWindow,
}

impl ImagePartition {
    pub fn new() -> Result<Self, FlashError> {
        let mut flash = RawFlash::new()?;
        let window = flash.find_data_partition(IMAGES_PARTITION)?;
        Ok(Self { flash, window })
    }
}

impl ReadStorage for ImagePartition {
    type Error = FlashError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let addr = self.window.absolute(offset, bytes.len())?;
        self.flash.read_bytes(addr, bytes)
    }

    fn capacity(&self) -> usize {
        self.window.len as usize
    }
}
