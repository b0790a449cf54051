//! Decodes the assembler's input message (spec §6): `{x: i32 LE, y: i32 LE,
//! samples: i32 LE[N]}` with `N` implicit in the remaining payload length.
//! A prior wire format prefixed the message with ASCII `"ORIGIN"` plus a
//! 4-byte version; the current format omits it. Per §9's open question,
//! writers must never emit the legacy prefix but readers tolerate it.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

const LEGACY_MAGIC: &[u8; 6] = b"ORIGIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub x: i32,
    pub y: i32,
    pub samples: Vec<i32>,
}

impl Origin {
    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(bytes);
        if bytes.len() >= LEGACY_MAGIC.len() && &bytes[..LEGACY_MAGIC.len()] == LEGACY_MAGIC {
            cursor.set_position(LEGACY_MAGIC.len() as u64);
            let _version = cursor.read_i32::<LittleEndian>()?;
        }

        let x = cursor.read_i32::<LittleEndian>()?;
        let y = cursor.read_i32::<LittleEndian>()?;

        let remaining = &bytes[cursor.position() as usize..];
        if remaining.len() % 4 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "origin payload length is not a multiple of 4 bytes",
            ));
        }
        let mut samples = Vec::with_capacity(remaining.len() / 4);
        let mut reader = Cursor::new(remaining);
        while (reader.position() as usize) < remaining.len() {
            samples.push(reader.read_i32::<LittleEndian>()?);
        }
        Ok(Origin { x, y, samples })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn encode_current(x: i32, y: i32, samples: &[i32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_i32::<LittleEndian>(x).unwrap();
        out.write_i32::<LittleEndian>(y).unwrap();
        for &s in samples {
            out.write_i32::<LittleEndian>(s).unwrap();
        }
        out
    }

    #[test]
    fn decodes_current_format() {
        let bytes = encode_current(3, 7, &[10, 15]);
        let origin = Origin::decode(&bytes).unwrap();
        assert_eq!(origin, Origin { x: 3, y: 7, samples: vec![10, 15] });
    }

    #[test]
    fn tolerates_legacy_magic_and_version_prefix() {
        let mut bytes = Vec::new();
        bytes.write_all(LEGACY_MAGIC).unwrap();
        bytes.write_i32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&encode_current(3, 7, &[10, 15]));
        let origin = Origin::decode(&bytes).unwrap();
        assert_eq!(origin, Origin { x: 3, y: 7, samples: vec![10, 15] });
    }

    #[test]
    fn rejects_misaligned_sample_payload() {
        let mut bytes = encode_current(0, 0, &[1, 2]);
        bytes.push(0xFF);
        assert!(Origin::decode(&bytes).is_err());
    }
}
