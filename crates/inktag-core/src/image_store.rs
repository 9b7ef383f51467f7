//! Read-only file access for bitmap pairs.
//!
//! On the device the files live in a flash data partition laid out as a
//! small archive:
//!
//! - 8-byte header: magic `ITIM`, entry count (u16 LE), reserved (u16)
//! - `count` entries of 40 bytes: 32-byte NUL-padded name, offset (u32 LE,
//!   relative to the partition start), length (u32 LE)
//! - file payloads

use core::fmt::Debug;

use embedded_storage::ReadStorage;

pub const ARCHIVE_MAGIC: [u8; 4] = *b"ITIM";
pub const ARCHIVE_HEADER_LEN: u32 = 8;
pub const ARCHIVE_ENTRY_LEN: u32 = 40;
pub const ARCHIVE_NAME_LEN: usize = 32;
pub const ARCHIVE_MAX_ENTRIES: u16 = 64;

/// Location of one file inside a store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageFile {
    pub offset: u32,
    pub len: u32,
}

pub trait ImageStore {
    type Error: Debug;

    /// Looks a file up by name; `Ok(None)` when it does not exist.
    fn open(&mut self, path: &str) -> Result<Option<ImageFile>, Self::Error>;

    /// Fills `buf` from `offset` within `file`.
    fn read(&mut self, file: &ImageFile, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageStoreError<E> {
    Storage(E),
    BadMagic,
    TooManyEntries,
    OutOfBounds,
}

/// [`ImageStore`] over an archive in any [`ReadStorage`].
pub struct PartitionImageStore<S> {
    storage: S,
    entries: Option<u16>,
}

impl<S> PartitionImageStore<S>
where
    S: ReadStorage,
{
    pub const fn new(storage: S) -> Self {
        Self {
            storage,
            entries: None,
        }
    }

    pub fn release(self) -> S {
        self.storage
    }

    /// Number of archive entries; validates the header on first use.
    pub fn entry_count(&mut self) -> Result<u16, ImageStoreError<S::Error>> {
        if let Some(count) = self.entries {
            return Ok(count);
        }

        let mut header = [0u8; ARCHIVE_HEADER_LEN as usize];
        self.storage
            .read(0, &mut header)
            .map_err(ImageStoreError::Storage)?;
        if header[..4] != ARCHIVE_MAGIC {
            return Err(ImageStoreError::BadMagic);
        }

        let count = u16::from_le_bytes([header[4], header[5]]);
        if count > ARCHIVE_MAX_ENTRIES {
            return Err(ImageStoreError::TooManyEntries);
        }

        self.entries = Some(count);
        Ok(count)
    }
}

impl<S> ImageStore for PartitionImageStore<S>
where
    S: ReadStorage,
    S::Error: Debug,
{
    type Error = ImageStoreError<S::Error>;

    fn open(&mut self, path: &str) -> Result<Option<ImageFile>, Self::Error> {
        let count = self.entry_count()?;
        let capacity = self.storage.capacity() as u64;

        for index in 0..count as u32 {
            let mut entry = [0u8; ARCHIVE_ENTRY_LEN as usize];
            self.storage
                .read(ARCHIVE_HEADER_LEN + index * ARCHIVE_ENTRY_LEN, &mut entry)
                .map_err(ImageStoreError::Storage)?;

            let name = &entry[..ARCHIVE_NAME_LEN];
            let name_len = name.iter().position(|b| *b == 0).unwrap_or(name.len());
            if &name[..name_len] != path.as_bytes() {
                continue;
            }

            let offset = u32::from_le_bytes([entry[32], entry[33], entry[34], entry[35]]);
            let len = u32::from_le_bytes([entry[36], entry[37], entry[38], entry[39]]);
            if offset as u64 + len as u64 > capacity {
                return Err(ImageStoreError::OutOfBounds);
            }
            return Ok(Some(ImageFile { offset, len }));
        }

        Ok(None)
    }

    fn read(&mut self, file: &ImageFile, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        let end = offset as u64 + buf.len() as u64;
        if end > file.len as u64 {
            return Err(ImageStoreError::OutOfBounds);
        }

        self.storage
            .read(file.offset + offset, buf)
            .map_err(ImageStoreError::Storage)
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};

    #[test]
    fn finds_files_by_exact_name() {
        let archive = pack(&[("logo.b.bmp", &b"black"[..]), ("logo.r.bmp", &b"red!"[..])]);
        let mut store = PartitionImageStore::new(MemStorage(archive));

        let red = store.open("logo.r.bmp").unwrap().unwrap();
        assert_eq!(red.len, 4);
        let mut buf = [0u8; 4];
        store.read(&red, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"red!");

        assert_eq!(store.open("logo").unwrap(), None);
        assert_eq!(store.entry_count().unwrap(), 2);
    }

    #[test]
    fn reads_past_file_end_are_rejected() {
        let archive = pack(&[("a.b.bmp", &b"abc"[..])]);
        let mut store = PartitionImageStore::new(MemStorage(archive));
        let file = store.open("a.b.bmp").unwrap().unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(store.read(&file, 2, &mut buf), Err(ImageStoreError::OutOfBounds));
    }

    #[test]
    fn erased_flash_is_not_an_archive() {
        let mut store = PartitionImageStore::new(MemStorage(std::vec![0xFF; 256]));
        assert_eq!(store.open("x"), Err(ImageStoreError::BadMagic));
    }
}
