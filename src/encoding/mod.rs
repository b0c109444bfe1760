//! Deterministic binary encoding for everything this crate puts on disk.
//!
//! The store's length prefixes, the index's fixed-width entries and the
//! record envelope all go through this module, so the byte order is decided
//! in exactly one place. Changing it would make every existing segment
//! unreadable.
//!
//! # Wire format
//!
//! | Rust type          | Encoding                                     |
//! |--------------------|----------------------------------------------|
//! | `u8`               | 1 byte                                       |
//! | `u32`              | 4 bytes, big-endian                          |
//! | `u64`              | 8 bytes, big-endian                          |
//! | `Vec<u8>` / bytes  | `[u32 len][bytes]`                           |
//!
//! All multi-byte integers are **big-endian**.  Lengths are encoded as
//! `u32`, limiting an individual byte string to 4 GiB; decoding further caps
//! it at [`MAX_BYTE_LEN`].
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or any other
//! panicking path.  All errors are propagated via [`EncodingError`].
//!
//! # Convenience helpers
//!
//! ```rust,ignore
//! use aeternuslog::encoding::{encode_to_vec, decode_from_slice};
//!
//! let bytes = encode_to_vec(&record)?;
//! let (decoded, consumed) = decode_from_slice::<Record>(&bytes)?;
//! ```


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Width of an encoded `u32`.
pub const U32_WIDTH: usize = std::mem::size_of::<u32>();

/// Width of an encoded `u64`.
pub const U64_WIDTH: usize = std::mem::size_of::<u64>();

/// Maximum byte length accepted when decoding a `Vec<u8>` (256 MiB).
///
/// Any decoded length field exceeding this value is rejected immediately,
/// preventing allocation bombs from corrupted data.
pub const MAX_BYTE_LEN: u32 = 256 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A length exceeded its safety limit or the wire format's range.
    #[error("length overflow: {0}")]
    LengthOverflow(String),

    /// Stored checksum does not match the decoded bytes.
    #[error("checksum mismatch (stored {stored:08x}, computed {computed:08x})")]
    ChecksumMismatch {
        /// Checksum read from the buffer.
        stored: u32,
        /// Checksum computed over the decoded bytes.
        computed: u32,
    },

    /// Bytes remained after a value that must fill the whole buffer.
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations **must** produce deterministic output: the same
/// logical value always yields the exact same byte sequence.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)` on success so that callers can
/// advance a cursor through a buffer containing multiple encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Convenience functions
// ------------------------------------------------------------------------------------------------

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

/// Decode a value that must occupy all of `buf`.
///
/// Fails with [`EncodingError::TrailingBytes`] if anything is left over.
pub fn decode_exact<T: Decode>(buf: &[u8]) -> Result<T, EncodingError> {
    let (value, consumed) = T::decode_from(buf)?;
    if consumed != buf.len() {
        return Err(EncodingError::TrailingBytes(buf.len() - consumed));
    }
    Ok(value)
}

// ------------------------------------------------------------------------------------------------
// Fixed-width big-endian helpers
//
// Used directly by the index (which writes into a mapped region rather than
// a Vec) and by the store's length prefix.
// ------------------------------------------------------------------------------------------------

/// Write `value` big-endian into the first 4 bytes of `dst`.
#[inline]
pub fn put_u32(dst: &mut [u8], value: u32) -> Result<(), EncodingError> {
    require(dst, U32_WIDTH)?;
    dst[..U32_WIDTH].copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Write `value` big-endian into the first 8 bytes of `dst`.
#[inline]
pub fn put_u64(dst: &mut [u8], value: u64) -> Result<(), EncodingError> {
    require(dst, U64_WIDTH)?;
    dst[..U64_WIDTH].copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Read a big-endian `u32` from the first 4 bytes of `src`.
#[inline]
pub fn get_u32(src: &[u8]) -> Result<u32, EncodingError> {
    require(src, U32_WIDTH)?;
    let mut bytes = [0u8; U32_WIDTH];
    bytes.copy_from_slice(&src[..U32_WIDTH]);
    Ok(u32::from_be_bytes(bytes))
}

/// Read a big-endian `u64` from the first 8 bytes of `src`.
#[inline]
pub fn get_u64(src: &[u8]) -> Result<u64, EncodingError> {
    require(src, U64_WIDTH)?;
    let mut bytes = [0u8; U64_WIDTH];
    bytes.copy_from_slice(&src[..U64_WIDTH]);
    Ok(u64::from_be_bytes(bytes))
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes, returning
/// [`EncodingError::UnexpectedEof`] if not.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Convert a `usize` length to `u32`, returning [`EncodingError::LengthOverflow`]
/// if the value exceeds `u32::MAX`.
#[inline]
pub(crate) fn len_to_u32(len: usize) -> Result<u32, EncodingError> {
    u32::try_from(len)
        .map_err(|_| EncodingError::LengthOverflow(format!("length {len} exceeds u32::MAX")))
}

// ------------------------------------------------------------------------------------------------
// Primitive implementations
// ------------------------------------------------------------------------------------------------

impl Encode for u8 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(*self);
        Ok(())
    }
}

impl Decode for u8 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 1)?;
        Ok((buf[0], 1))
    }
}

impl Encode for u32 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl Decode for u32 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        Ok((get_u32(buf)?, U32_WIDTH))
    }
}

impl Encode for u64 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl Decode for u64 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        Ok((get_u64(buf)?, U64_WIDTH))
    }
}

// ------------------------------------------------------------------------------------------------
// Variable-length byte vectors: [u32 len][bytes]
// ------------------------------------------------------------------------------------------------

impl Encode for Vec<u8> {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.as_slice().encode_to(buf)
    }
}

impl Decode for Vec<u8> {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (len, mut offset) = u32::decode_from(buf)?;
        if len > MAX_BYTE_LEN {
            return Err(EncodingError::LengthOverflow(format!(
                "byte vector length {len} exceeds MAX_BYTE_LEN ({MAX_BYTE_LEN})"
            )));
        }
        let len = len as usize;
        require(&buf[offset..], len)?;
        let data = buf[offset..offset + len].to_vec();
        offset += len;
        Ok((data, offset))
    }
}

/// Encode a byte slice as `[u32 len][bytes]`.
///
/// Useful for encoding `&[u8]` fields without owning a `Vec`.
impl Encode for &[u8] {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        len_to_u32(self.len())?.encode_to(buf)?;
        buf.extend_from_slice(self);
        Ok(())
    }
}
