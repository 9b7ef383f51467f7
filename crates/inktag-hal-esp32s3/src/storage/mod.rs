//! Flash-backed stores: connection settings, the image archive and the
//! firmware update slot.

pub mod flash;
pub mod images;
pub mod ota;
pub mod settings;

/// Label of the partition holding the connection record.
pub const SETTINGS_PARTITION: &str = "settings";
/// Label of the partition holding the bitmap archive.
pub const IMAGES_PARTITION: &str = "images";
