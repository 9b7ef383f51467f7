use inktag_core::services::restart::SystemReset;
use log::warn;

/// Software reset of the whole chip.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChipReset;

impl SystemReset for ChipReset {
    fn reset(&mut self) {
        warn!("system: software reset");
        esp_hal::system::software_reset();
    }
}
