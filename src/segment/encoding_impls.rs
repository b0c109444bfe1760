//! Wire encoding of the record envelope stored in each store entry.
//!
//! ```text
//! [OFFSET_BE u64][VALUE_LEN_BE u32][VALUE_BYTES][CRC32_BE u32]
//! ```
//!
//! The CRC covers every byte before it, so a torn or bit-flipped entry
//! surfaces as [`EncodingError::ChecksumMismatch`] instead of a record with
//! the wrong payload.

use crc32fast::Hasher as Crc32;

use super::Record;
use crate::encoding::{self, Decode, Encode, EncodingError, MAX_BYTE_LEN};

impl Encode for Record {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        if self.value.len() > MAX_BYTE_LEN as usize {
            return Err(EncodingError::LengthOverflow(format!(
                "record value length {} exceeds MAX_BYTE_LEN ({MAX_BYTE_LEN})",
                self.value.len()
            )));
        }

        let start = buf.len();
        self.offset.encode_to(buf)?;
        self.value.encode_to(buf)?;

        let mut hasher = Crc32::new();
        hasher.update(&buf[start..]);
        hasher.finalize().encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Record {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (record_offset, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (value, n) = <Vec<u8>>::decode_from(&buf[offset..])?;
        offset += n;

        let mut hasher = Crc32::new();
        hasher.update(&buf[..offset]);
        let computed = hasher.finalize();

        let stored = encoding::get_u32(&buf[offset..])?;
        offset += encoding::U32_WIDTH;

        if stored != computed {
            return Err(EncodingError::ChecksumMismatch { stored, computed });
        }

        Ok((
            Self {
                offset: record_offset,
                value,
            },
            offset,
        ))
    }
}
