//! Small helpers shared by the binary codecs of the catalog and index files.
//!
//! Decoders return `None` on truncated or malformed input; each caller maps
//! that to the corruption error of its own file kind.

use bytes::{Buf, BufMut};

/// Writes a u16 length-prefixed UTF-8 string.
pub(crate) fn put_str(buf: &mut impl BufMut, s: &str) {
    let bytes = s.as_bytes();
    buf.put_u16_le(bytes.len() as u16);
    buf.put_slice(bytes);
}

/// Reads a string written by [`put_str`].
pub(crate) fn get_str(buf: &mut impl Buf) -> Option<String> {
    let len = get_u16(buf)? as usize;
    if buf.remaining() < len {
        return None;
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).ok()
}

pub(crate) fn get_u8(buf: &mut impl Buf) -> Option<u8> {
    (buf.remaining() >= 1).then(|| buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut impl Buf) -> Option<u16> {
    (buf.remaining() >= 2).then(|| buf.get_u16_le())
}

pub(crate) fn get_u32(buf: &mut impl Buf) -> Option<u32> {
    (buf.remaining() >= 4).then(|| buf.get_u32_le())
}

pub(crate) fn get_u64(buf: &mut impl Buf) -> Option<u64> {
    (buf.remaining() >= 8).then(|| buf.get_u64_le())
}

pub(crate) fn get_i32(buf: &mut impl Buf) -> Option<i32> {
    (buf.remaining() >= 4).then(|| buf.get_i32_le())
}

pub(crate) fn get_i64(buf: &mut impl Buf) -> Option<i64> {
    (buf.remaining() >= 8).then(|| buf.get_i64_le())
}

pub(crate) fn get_f64(buf: &mut impl Buf) -> Option<f64> {
    (buf.remaining() >= 8).then(|| buf.get_f64_le())
}
