//! Binary grid codec shared by the assembler's AccessGrid file and the
//! worker's time-grid output (spec §3, §6).
//!
//! Both formats share one 36-byte header. They differ only in how the
//! payload is delta-coded: AccessGrid deltas run **within a pixel**, across
//! its `N` values-per-pixel; the time-grid deltas run **within a plane**,
//! across destinations, resetting at the start of each percentile's plane.
//! Two independent traversal orders over the same container, so the header
//! reader/writer is shared and the payload codecs are not.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::error::CoreError;

pub const MAGIC: &[u8; 8] = b"ACCESSGR";
pub const HEADER_SIZE: usize = 36;
pub const FORMAT_VERSION: i32 = 0;

/// The shared 36-byte header (spec §3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridHeader {
    pub zoom: i32,
    pub west: i32,
    pub north: i32,
    pub width: u32,
    pub height: u32,
    /// Values stored per pixel (AccessGrid) or number of percentile planes
    /// (time-grid) — the field means "N" in both layouts.
    pub values_per_pixel: u32,
}

impl GridHeader {
    pub fn n_total(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Total payload + header size, 64-bit throughout so grids beyond 2 GiB
    /// compute a correct file length (§3, §8 boundary behavior).
    pub fn file_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.n_total() * u64::from(self.values_per_pixel) * 4
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_i32::<LittleEndian>(FORMAT_VERSION)?;
        w.write_i32::<LittleEndian>(self.zoom)?;
        w.write_i32::<LittleEndian>(self.west)?;
        w.write_i32::<LittleEndian>(self.north)?;
        w.write_u32::<LittleEndian>(self.width)?;
        w.write_u32::<LittleEndian>(self.height)?;
        w.write_u32::<LittleEndian>(self.values_per_pixel)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad grid file magic",
            ));
        }
        let _version = r.read_i32::<LittleEndian>()?;
        Ok(GridHeader {
            zoom: r.read_i32::<LittleEndian>()?,
            west: r.read_i32::<LittleEndian>()?,
            north: r.read_i32::<LittleEndian>()?,
            width: r.read_u32::<LittleEndian>()?,
            height: r.read_u32::<LittleEndian>()?,
            values_per_pixel: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Delta-codes one pixel's raw values in place (§3: `raw[i] - raw[i-1]`,
/// `raw[-1] = 0`), returning little-endian bytes ready to write at the
/// pixel's offset. Used directly by the assembler (§4.9 step 3).
pub fn delta_encode_pixel(raw: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 4);
    let mut prev = 0i32;
    for &v in raw {
        out.write_i32::<LittleEndian>(v.wrapping_sub(prev)).unwrap();
        prev = v;
    }
    out
}

/// Reverses [`delta_encode_pixel`].
pub fn delta_decode_pixel(bytes: &[u8]) -> io::Result<Vec<i32>> {
    let mut cursor = Cursor::new(bytes);
    let mut prev = 0i32;
    let mut out = Vec::with_capacity(bytes.len() / 4);
    while (cursor.position() as usize) < bytes.len() {
        let delta = cursor.read_i32::<LittleEndian>()?;
        prev = prev.wrapping_add(delta);
        out.push(prev);
    }
    Ok(out)
}

/// Encodes a full AccessGrid file: header plus row-major (y outer, x inner)
/// per-pixel payload, each pixel delta-coded independently (§3).
pub fn encode_access_grid(header: &GridHeader, pixels: &[Vec<i32>]) -> Result<Vec<u8>, CoreError> {
    let n_total = header.n_total();
    if pixels.len() as u64 != n_total {
        return Err(CoreError::AssemblerDimension {
            expected: n_total as usize,
            got: pixels.len(),
        });
    }
    let mut out = Vec::with_capacity(header.file_size() as usize);
    header.write_to(&mut out).expect("writing to a Vec cannot fail");
    for pixel in pixels {
        if pixel.len() as u32 != header.values_per_pixel {
            return Err(CoreError::AssemblerDimension {
                expected: header.values_per_pixel as usize,
                got: pixel.len(),
            });
        }
        out.extend_from_slice(&delta_encode_pixel(pixel));
    }
    Ok(out)
}

/// Decodes a full AccessGrid file back into `(header, pixels)`.
pub fn decode_access_grid(bytes: &[u8]) -> io::Result<(GridHeader, Vec<Vec<i32>>)> {
    let mut cursor = Cursor::new(bytes);
    let header = GridHeader::read_from(&mut cursor)?;
    let n_total = header.n_total() as usize;
    let stride = header.values_per_pixel as usize * 4;
    let payload = &bytes[HEADER_SIZE..];
    let mut pixels = Vec::with_capacity(n_total);
    for i in 0..n_total {
        let start = i * stride;
        pixels.push(delta_decode_pixel(&payload[start..start + stride])?);
    }
    Ok((header, pixels))
}

/// Encodes a time-grid file: same header, but payload is one plane per
/// percentile, delta-coded within the plane and reset to zero at its start
/// (§6). `planes[p]` has `width * height` entries, row-major over
/// destinations.
pub fn encode_time_grid(header: &GridHeader, planes: &[Vec<i32>]) -> Result<Vec<u8>, CoreError> {
    if planes.len() as u32 != header.values_per_pixel {
        return Err(CoreError::AssemblerDimension {
            expected: header.values_per_pixel as usize,
            got: planes.len(),
        });
    }
    let n_total = header.n_total() as usize;
    let mut out = Vec::with_capacity(header.file_size() as usize);
    header.write_to(&mut out).expect("writing to a Vec cannot fail");
    for plane in planes {
        if plane.len() != n_total {
            return Err(CoreError::AssemblerDimension {
                expected: n_total,
                got: plane.len(),
            });
        }
        let mut prev = 0i32;
        for &v in plane {
            out.write_i32::<LittleEndian>(v.wrapping_sub(prev)).unwrap();
            prev = v;
        }
    }
    Ok(out)
}

/// Decodes a time-grid file back into `(header, planes)`.
pub fn decode_time_grid(bytes: &[u8]) -> io::Result<(GridHeader, Vec<Vec<i32>>)> {
    let mut cursor = Cursor::new(bytes);
    let header = GridHeader::read_from(&mut cursor)?;
    let n_total = header.n_total() as usize;
    let mut planes = Vec::with_capacity(header.values_per_pixel as usize);
    for _ in 0..header.values_per_pixel {
        let mut prev = 0i32;
        let mut plane = Vec::with_capacity(n_total);
        for _ in 0..n_total {
            let delta = cursor.read_i32::<LittleEndian>()?;
            prev = prev.wrapping_add(delta);
            plane.push(prev);
        }
        planes.push(plane);
    }
    Ok((header, planes))
}
