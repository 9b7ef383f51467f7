use inktag_core::settings::{self, ConfigStore, RECORD_LEN, RecordError, StoredConnection};
use log::{info, warn};

use super::{
    SETTINGS_PARTITION,
    flash::{FlashError, RawFlash},
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashConfigError {
    Flash(FlashError),
    Record(RecordError),
}

impl From<FlashError> for FlashConfigError {
    fn from(err: FlashError) -> Self {
        Self::Flash(err)
    }
}

/// Connection record kept in the last sector of the `settings` partition.
#[derive(Debug)]
pub struct FlashConfigStore {
    flash: RawFlash,
    record_addr: u32,
}

impl FlashConfigStore {
    pub fn new() -> Result<Self, FlashError> {
        let mut flash = RawFlash::new()?;
        let window = flash.find_data_partition(SETTINGS_PARTITION)?;
        Ok(Self {
            flash,
            record_addr: window.last_sector(),
        })
    }
}

impl ConfigStore for FlashConfigStore {
    type Error = FlashConfigError;

    fn load(&mut self) -> Result<Option<StoredConnection>, Self::Error> {
        let mut buf = [0u8; RECORD_LEN];
        self.flash.read_bytes(self.record_addr, &mut buf)?;
        settings::decode(&buf).map_err(FlashConfigError::Record)
    }

    fn save(&mut self, record: &StoredConnection) -> Result<(), Self::Error> {
        let buf = settings::encode(record);
        self.flash.erase_sector(self.record_addr)?;
        self.flash.write_erased_bytes(self.record_addr, &buf)?;
        info!("settings: saved network {}", record.ssid.as_str());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.flash.erase_sector(self.record_addr)?;
        warn!("settings: network forgotten");
        Ok(())
    }
}
