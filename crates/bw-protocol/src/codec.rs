use bytes::{BufMut, BytesMut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("out of range: wanted {wanted} bytes, {remaining} remaining")]
    OutOfRange { wanted: usize, remaining: usize },
    #[error("string too long: {0} > {1}")]
    StringTooLong(usize, usize),
    #[error("invalid utf-8 in Str16 payload")]
    InvalidUtf8,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Maximum byte length of a `Str16` payload (the length prefix itself is a
/// `u16`, so this is `u16::MAX`).
pub const STR16_MAX_LEN: usize = u16::MAX as usize;

/// A growable byte buffer with independent read and write cursors, matching
/// the reference's `Packet`: the same buffer is filled while encoding a
/// packet to send, and drained while decoding one that was received.
///
/// Endianness defaults to little-endian; `big_endian` is flipped for EELVL
/// I/O, which stores its body in network (big-endian) order inside an
/// otherwise little-endian file.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    data: BytesMut,
    read_offset: usize,
    pub big_endian: bool,
}

/// Implemented for every scalar `Packet::read`/`write` can move across the
/// wire. Kept sealed-ish by only implementing it for fixed-width numeric
/// types and `bool`.
pub trait Scalar: Sized + Copy {
    const SIZE: usize;
    fn read_from(bytes: &[u8], big_endian: bool) -> Self;
    fn write_to(self, buf: &mut BytesMut, big_endian: bool);
}

macro_rules! impl_scalar {
    ($ty:ty) => {
        impl Scalar for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            fn read_from(bytes: &[u8], big_endian: bool) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                if big_endian {
                    <$ty>::from_be_bytes(buf)
                } else {
                    <$ty>::from_le_bytes(buf)
                }
            }
            fn write_to(self, buf: &mut BytesMut, big_endian: bool) {
                if big_endian {
                    buf.put_slice(&self.to_be_bytes());
                } else {
                    buf.put_slice(&self.to_le_bytes());
                }
            }
        }
    };
}

impl_scalar!(u8);
impl_scalar!(i8);
impl_scalar!(u16);
impl_scalar!(i16);
impl_scalar!(u32);
impl_scalar!(i32);
impl_scalar!(u64);
impl_scalar!(i64);
impl_scalar!(f32);
impl_scalar!(f64);

impl Scalar for bool {
    const SIZE: usize = 1;
    fn read_from(bytes: &[u8], _big_endian: bool) -> Self {
        bytes[0] != 0
    }
    fn write_to(self, buf: &mut BytesMut, _big_endian: bool) {
        buf.put_u8(self as u8);
    }
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: BytesMut) -> Self {
        Self {
            data,
            read_offset: 0,
            big_endian: false,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn into_bytes(self) -> BytesMut {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_offset
    }

    fn check_length(&self, nbytes: usize) -> CodecResult<()> {
        if nbytes > self.remaining() {
            Err(CodecError::OutOfRange {
                wanted: nbytes,
                remaining: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read<T: Scalar>(&mut self) -> CodecResult<T> {
        self.check_length(T::SIZE)?;
        let start = self.read_offset;
        let value = T::read_from(&self.data[start..start + T::SIZE], self.big_endian);
        self.read_offset += T::SIZE;
        Ok(value)
    }

    pub fn write<T: Scalar>(&mut self, value: T) {
        value.write_to(&mut self.data, self.big_endian);
    }

    /// Reads a `u16`-length-prefixed UTF-8 string ("Str16").
    pub fn read_str16(&mut self) -> CodecResult<String> {
        let len = self.read::<u16>()? as usize;
        self.check_length(len)?;
        let start = self.read_offset;
        let bytes = &self.data[start..start + len];
        let s = std::str::from_utf8(bytes)
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_owned();
        self.read_offset += len;
        Ok(s)
    }

    /// Writes a `u16`-length-prefixed UTF-8 string. Fails if the encoded
    /// length cannot fit in a `u16`.
    pub fn write_str16(&mut self, s: &str) -> CodecResult<()> {
        let bytes = s.as_bytes();
        if bytes.len() > STR16_MAX_LEN {
            return Err(CodecError::StringTooLong(bytes.len(), STR16_MAX_LEN));
        }
        self.write(bytes.len() as u16);
        self.data.put_slice(bytes);
        Ok(())
    }

    /// Copies `n` bytes out of the packet, advancing the read cursor.
    pub fn read_raw(&mut self, n: usize) -> CodecResult<Vec<u8>> {
        self.check_length(n)?;
        let start = self.read_offset;
        let out = self.data[start..start + n].to_vec();
        self.read_offset += n;
        Ok(out)
    }

    pub fn write_raw(&mut self, src: &[u8]) {
        self.data.put_slice(src);
    }

    /// Returns a slice over the next `n` bytes without copying, advancing
    /// the read cursor. The caller may "unget" up to `n` bytes with
    /// [`Packet::read_raw_no_copy_end`] if it decides it consumed less.
    pub fn read_raw_no_copy(&mut self, n_max: usize) -> CodecResult<&[u8]> {
        let n = n_max.min(self.remaining());
        let start = self.read_offset;
        self.read_offset += n;
        Ok(&self.data[start..start + n])
    }

    /// Rewinds the read cursor by `n` bytes (a partial unget after
    /// `read_raw_no_copy` consumed less than it reserved).
    pub fn read_raw_no_copy_end(&mut self, n: usize) {
        self.read_offset = self.read_offset.saturating_sub(n);
    }

    /// Reserves `n` zeroed bytes at the end of the buffer and returns the
    /// write-cursor offset where they start, for a decoder (e.g. DEFLATE)
    /// that fills output in place.
    pub fn write_prealloc_start(&mut self, n: usize) -> usize {
        let offset = self.data.len();
        self.data.resize(offset + n, 0);
        offset
    }

    /// Truncates the previously reserved region down to `actual` bytes,
    /// for when the decoder produced less than the worst-case estimate.
    pub fn write_prealloc_end(&mut self, offset: usize, actual: usize) {
        self.data.truncate(offset + actual);
    }

    /// Renders up to `n` bytes starting at the read cursor as a hex/ASCII
    /// trace line, for debug logging.
    pub fn dump(&self, n: usize) -> String {
        let start = self.read_offset;
        let end = (start + n).min(self.data.len());
        let bytes = &self.data[start..end];
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = bytes
            .iter()
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
            .collect();
        format!("{} | {}", hex.join(" "), ascii)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip_little_endian() {
        let mut p = Packet::new();
        p.write::<u16>(0xABCD);
        p.write::<i32>(-42);
        p.write::<f32>(1.5);
        assert_eq!(p.read::<u16>().unwrap(), 0xABCD);
        assert_eq!(p.read::<i32>().unwrap(), -42);
        assert_eq!(p.read::<f32>().unwrap(), 1.5);
    }

    #[test]
    fn scalar_roundtrip_big_endian() {
        let mut p = Packet::new().big_endian();
        p.write::<u32>(0x01020304);
        assert_eq!(p.as_bytes(), &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(p.read::<u32>().unwrap(), 0x01020304);
    }

    #[test]
    fn str16_roundtrip() {
        let mut p = Packet::new();
        p.write_str16("hello world").unwrap();
        assert_eq!(p.read_str16().unwrap(), "hello world");
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let mut p = Packet::new();
        p.write::<u8>(1);
        let _ = p.read::<u8>().unwrap();
        assert!(matches!(p.read::<u8>(), Err(CodecError::OutOfRange { .. })));
    }

    #[test]
    fn str16_too_long_is_rejected() {
        let mut p = Packet::new();
        let huge = "x".repeat(STR16_MAX_LEN + 1);
        assert!(matches!(
            p.write_str16(&huge),
            Err(CodecError::StringTooLong(_, _))
        ));
    }

    #[test]
    fn raw_no_copy_can_be_partially_ungot() {
        let mut p = Packet::new();
        p.write_raw(&[1, 2, 3, 4]);
        let slice = p.read_raw_no_copy(4).unwrap();
        assert_eq!(slice, &[1, 2, 3, 4]);
        p.read_raw_no_copy_end(2);
        assert_eq!(p.remaining(), 2);
    }
}
