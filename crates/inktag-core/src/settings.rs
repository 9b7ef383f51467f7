//! Persisted connection settings and their flash record.
//!
//! Record layout (little-endian, `RECORD_LEN` bytes):
//!
//! | bytes | field |
//! |---|---|
//! | 0..4 | magic `ITC1` |
//! | 4 | version |
//! | 5 | flags (bit 0: access-point mode) |
//! | 6, 7 | ssid length, password length |
//! | 8..40 | ssid |
//! | 40..104 | password |
//! | 104..108 | reserved |
//! | 108..112 | FNV-1a checksum of bytes 0..108 |

use core::fmt::Debug;

use heapless::String;

use crate::connect::{ConnectionConfig, PASSWORD_MAX_LEN, SSID_MAX_LEN};

pub const RECORD_MAGIC: u32 = 0x3143_5449; // "ITC1"
pub const RECORD_VERSION: u8 = 1;
pub const RECORD_LEN: usize = 112;

const FLAG_AP_MODE: u8 = 0x01;
const SSID_START: usize = 8;
const PASSWORD_START: usize = SSID_START + SSID_MAX_LEN;
const CHECKSUM_START: usize = RECORD_LEN - 4;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredConnection {
    pub ssid: String<SSID_MAX_LEN>,
    pub password: String<PASSWORD_MAX_LEN>,
    pub ap_mode: bool,
}

impl StoredConnection {
    /// Returns `None` when a field does not fit.
    pub fn new(ssid: &str, password: &str, ap_mode: bool) -> Option<Self> {
        Some(Self {
            ssid: String::try_from(ssid).ok()?,
            password: String::try_from(password).ok()?,
            ap_mode,
        })
    }
}

/// Persisted key-value storage for [`StoredConnection`].
pub trait ConfigStore {
    type Error: Debug;

    /// `Ok(None)` when nothing (or nothing recognizable) is stored.
    fn load(&mut self) -> Result<Option<StoredConnection>, Self::Error>;
    fn save(&mut self, record: &StoredConnection) -> Result<(), Self::Error>;
    fn clear(&mut self) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordError {
    Checksum,
    BadLength,
    BadText,
}

pub fn encode(record: &StoredConnection) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    buf[4] = RECORD_VERSION;
    buf[5] = if record.ap_mode { FLAG_AP_MODE } else { 0 };
    buf[6] = record.ssid.len() as u8;
    buf[7] = record.password.len() as u8;
    buf[SSID_START..SSID_START + record.ssid.len()].copy_from_slice(record.ssid.as_bytes());
    buf[PASSWORD_START..PASSWORD_START + record.password.len()]
        .copy_from_slice(record.password.as_bytes());

    let checksum = checksum32(&buf[..CHECKSUM_START]);
    buf[CHECKSUM_START..].copy_from_slice(&checksum.to_le_bytes());
    buf
}

/// Erased flash, a foreign magic or an unknown version decode to `Ok(None)`.
pub fn decode(buf: &[u8; RECORD_LEN]) -> Result<Option<StoredConnection>, RecordError> {
    if buf.iter().all(|b| *b == 0xFF) {
        return Ok(None);
    }

    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != RECORD_MAGIC || buf[4] != RECORD_VERSION {
        return Ok(None);
    }

    let expected = u32::from_le_bytes([
        buf[CHECKSUM_START],
        buf[CHECKSUM_START + 1],
        buf[CHECKSUM_START + 2],
        buf[CHECKSUM_START + 3],
    ]);
    if checksum32(&buf[..CHECKSUM_START]) != expected {
        return Err(RecordError::Checksum);
    }

    let ssid_len = buf[6] as usize;
    let password_len = buf[7] as usize;
    if ssid_len > SSID_MAX_LEN || password_len > PASSWORD_MAX_LEN {
        return Err(RecordError::BadLength);
    }

    let ssid = core::str::from_utf8(&buf[SSID_START..SSID_START + ssid_len])
        .map_err(|_| RecordError::BadText)?;
    let password = core::str::from_utf8(&buf[PASSWORD_START..PASSWORD_START + password_len])
        .map_err(|_| RecordError::BadText)?;

    StoredConnection::new(ssid, password, buf[5] & FLAG_AP_MODE != 0)
        .map(Some)
        .ok_or(RecordError::BadLength)
}

/// Attempt-cycle configuration for what was loaded at boot.
///
/// Without a record, or without an SSID, the device goes straight to the
/// access point.
pub fn resolve(stored: Option<&StoredConnection>) -> ConnectionConfig {
    match stored {
        Some(record) if !record.ap_mode => {
            ConnectionConfig::station(record.ssid.as_str(), record.password.as_str())
                .unwrap_or_else(ConnectionConfig::access_point)
        }
        _ => ConnectionConfig::access_point(),
    }
}

pub fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C_9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_survives_the_flash_layout() {
        let record = StoredConnection::new("home", "secret-pass", false).unwrap();
        let buf = encode(&record);

        assert_eq!(&buf[0..4], b"ITC1");
        assert_eq!(decode(&buf), Ok(Some(record)));
    }

    #[test]
    fn erased_sector_means_no_record() {
        assert_eq!(decode(&[0xFF; RECORD_LEN]), Ok(None));
    }

    #[test]
    fn flipped_bit_fails_the_checksum() {
        let mut buf = encode(&StoredConnection::new("home", "pw", false).unwrap());
        buf[SSID_START] ^= 0x20;
        assert_eq!(decode(&buf), Err(RecordError::Checksum));
    }

    #[test]
    fn resolve_prefers_station_only_with_an_ssid() {
        assert!(resolve(None).ap_mode);

        let empty = StoredConnection::new("", "pw", false).unwrap();
        assert!(resolve(Some(&empty)).ap_mode);

        let forced_ap = StoredConnection::new("home", "pw", true).unwrap();
        assert!(resolve(Some(&forced_ap)).ap_mode);

        let station = resolve(Some(&StoredConnection::new("home", "pw", false).unwrap()));
        assert!(!station.ap_mode);
        assert_eq!(station.station_ssid.as_str(), "home");
    }
}
