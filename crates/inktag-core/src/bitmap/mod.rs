//! Two-plane BMP decoding for the tri-color panel.
//!
//! A picture is a pair `<name>.b.bmp` / `<name>.r.bmp` of uncompressed 1bpp
//! bitmaps at exactly the panel resolution. Rows are stored bottom-up and
//! padded to 4 bytes; the decoder emits tight, top-down planes with the bit
//! order of every byte reversed for the controller's scan direction.

use core::fmt::Write;

use heapless::String;
use log::{debug, warn};

use crate::image_store::{ImageFile, ImageStore};

pub const FILE_HEADER_LEN: usize = 14;
pub const INFO_HEADER_LEN: usize = 40;
pub const HEADERS_LEN: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;
/// Widest padded row the decoder buffers on the stack.
pub const MAX_ROW_BYTES: usize = 64;
pub const MAX_NAME_LEN: usize = 24;
pub const PATH_CAPACITY: usize = MAX_NAME_LEN + 8;

const SIGNATURE: [u8; 2] = *b"BM";

/// Bit-reversal of one nibble.
const NIBBLE_REVERSE: [u8; 16] = [
    0x0, 0x8, 0x4, 0xC, 0x2, 0xA, 0x6, 0xE, 0x1, 0x9, 0x5, 0xD, 0x3, 0xB, 0x7, 0xF,
];

#[inline]
pub const fn reverse_bits(byte: u8) -> u8 {
    (NIBBLE_REVERSE[(byte & 0x0F) as usize] << 4) | NIBBLE_REVERSE[(byte >> 4) as usize]
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaneKind {
    Black,
    Red,
}

impl PlaneKind {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Black => ".b.bmp",
            Self::Red => ".r.bmp",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitmapError {
    NameTooLong,
    Missing(PlaneKind),
    Store,
    Truncated,
    BadSignature,
    /// Not a single-plane, uncompressed 1bpp bitmap.
    Unsupported,
    SizeMismatch { width: i32, height: i32 },
    PlaneMismatch,
    RowTooWide,
    BufferTooSmall,
}

/// Panel resolution the planes must match.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

impl Geometry {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Bytes of one tight 1bpp plane.
    pub const fn plane_bytes(&self) -> usize {
        (self.width as usize).div_ceil(8) * self.height as usize
    }
}

/// Packed little-endian BMP file and info headers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BitmapHeader {
    pub file_size: u32,
    pub data_offset: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub image_size: u32,
}

impl BitmapHeader {
    pub fn parse(bytes: &[u8; HEADERS_LEN]) -> Result<Self, BitmapError> {
        if bytes[..2] != SIGNATURE {
            return Err(BitmapError::BadSignature);
        }

        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let info_len = u32_at(14);
        if (info_len as usize) < INFO_HEADER_LEN {
            return Err(BitmapError::Unsupported);
        }

        Ok(Self {
            file_size: u32_at(2),
            data_offset: u32_at(10),
            width: u32_at(18) as i32,
            height: u32_at(22) as i32,
            planes: u16_at(26),
            bits_per_pixel: u16_at(28),
            compression: u32_at(30),
            image_size: u32_at(34),
        })
    }

    /// Unpadded bytes per row.
    pub fn tight_stride(&self) -> usize {
        (self.width.max(0) as usize * self.bits_per_pixel as usize).div_ceil(8)
    }

    /// Bytes per row as stored, padded to a multiple of four.
    pub fn row_stride(&self) -> usize {
        self.tight_stride().div_ceil(4) * 4
    }

    /// Pixel data size; writers may leave the header field at zero.
    pub fn effective_image_size(&self) -> u32 {
        if self.image_size != 0 {
            return self.image_size;
        }
        (self.row_stride() * self.height.max(0) as usize) as u32
    }
}

/// A validated plane ready to decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BitmapPlane {
    pub file: ImageFile,
    pub header: BitmapHeader,
}

impl BitmapPlane {
    pub fn width(&self) -> u16 {
        self.header.width as u16
    }

    pub fn height(&self) -> u16 {
        self.header.height as u16
    }

    pub fn bits_per_pixel(&self) -> u16 {
        self.header.bits_per_pixel
    }

    pub fn row_stride(&self) -> usize {
        self.header.row_stride()
    }
}

/// Builds `<name><suffix>`.
pub fn plane_path(name: &str, kind: PlaneKind) -> Result<String<PATH_CAPACITY>, BitmapError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(BitmapError::NameTooLong);
    }

    let mut path = String::new();
    write!(path, "{}{}", name, kind.suffix()).map_err(|_| BitmapError::NameTooLong)?;
    Ok(path)
}

pub struct BitmapDecoder {
    geometry: Geometry,
}

impl BitmapDecoder {
    pub const fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Opens one plane file and validates its headers against the panel.
    pub fn open_plane<S>(
        &self,
        store: &mut S,
        name: &str,
        kind: PlaneKind,
    ) -> Result<BitmapPlane, BitmapError>
    where
        S: ImageStore,
    {
        let path = plane_path(name, kind)?;
        let file = store
            .open(path.as_str())
            .map_err(|err| store_error(&path, err))?
            .ok_or(BitmapError::Missing(kind))?;

        if (file.len as usize) < HEADERS_LEN {
            return Err(BitmapError::Truncated);
        }

        let mut raw = [0u8; HEADERS_LEN];
        store
            .read(&file, 0, &mut raw)
            .map_err(|err| store_error(&path, err))?;
        let header = BitmapHeader::parse(&raw)?;

        if header.planes != 1 || header.bits_per_pixel != 1 || header.compression != 0 {
            return Err(BitmapError::Unsupported);
        }
        if header.width != self.geometry.width as i32 || header.height != self.geometry.height as i32
        {
            return Err(BitmapError::SizeMismatch {
                width: header.width,
                height: header.height,
            });
        }
        if header.row_stride() > MAX_ROW_BYTES {
            return Err(BitmapError::RowTooWide);
        }

        let data_end =
            header.data_offset as u64 + (header.row_stride() * self.geometry.height as usize) as u64;
        if data_end > file.len as u64 {
            return Err(BitmapError::Truncated);
        }

        debug!(
            "bitmap: {} {}x{} stride={}",
            path.as_str(),
            header.width,
            header.height,
            header.row_stride()
        );
        Ok(BitmapPlane { file, header })
    }

    /// Decodes one validated plane into a tight, top-down buffer.
    pub fn decode_plane<S>(
        &self,
        store: &mut S,
        plane: &BitmapPlane,
        out: &mut [u8],
    ) -> Result<(), BitmapError>
    where
        S: ImageStore,
    {
        let tight = plane.header.tight_stride();
        let stride = plane.row_stride();
        let height = plane.height() as usize;
        if out.len() < tight * height {
            return Err(BitmapError::BufferTooSmall);
        }

        let mut row = [0u8; MAX_ROW_BYTES];
        for dst_row in 0..height {
            let src_row = height - 1 - dst_row;
            let offset = plane.header.data_offset + (src_row * stride) as u32;
            store
                .read(&plane.file, offset, &mut row[..stride])
                .map_err(|err| {
                    warn!("bitmap: row {} read failed: {:?}", src_row, err);
                    BitmapError::Store
                })?;

            let dst = &mut out[dst_row * tight..(dst_row + 1) * tight];
            for (d, s) in dst.iter_mut().zip(&row[..tight]) {
                *d = reverse_bits(*s);
            }
        }

        Ok(())
    }

    /// Validates both planes of `name`, then decodes them.
    ///
    /// Nothing is written to `black`/`red` unless both headers agree with
    /// each other and with the panel.
    pub fn decode_pair<S>(
        &self,
        store: &mut S,
        name: &str,
        black: &mut [u8],
        red: &mut [u8],
    ) -> Result<BitmapPlane, BitmapError>
    where
        S: ImageStore,
    {
        let black_plane = self.open_plane(store, name, PlaneKind::Black)?;
        let red_plane = self.open_plane(store, name, PlaneKind::Red)?;

        if black_plane.header.effective_image_size() != red_plane.header.effective_image_size() {
            warn!(
                "bitmap: {} plane sizes differ ({} vs {})",
                name,
                black_plane.header.effective_image_size(),
                red_plane.header.effective_image_size()
            );
            return Err(BitmapError::PlaneMismatch);
        }

        let needed = self.geometry.plane_bytes();
        if black.len() < needed || red.len() < needed {
            return Err(BitmapError::BufferTooSmall);
        }

        self.decode_plane(store, &black_plane, black)?;
        self.decode_plane(store, &red_plane, red)?;
        Ok(black_plane)
    }
}

fn store_error<E: core::fmt::Debug>(path: &String<PATH_CAPACITY>, err: E) -> BitmapError {
    warn!("bitmap: {} store error: {:?}", path.as_str(), err);
    BitmapError::Store
}
