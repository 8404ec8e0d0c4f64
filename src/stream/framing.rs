//! Big-endian length-prefixed framing.
//!
//! | Frame | Layout |
//! |-------|--------|
//! | blob | `[u32 len][bytes]` |
//! | record list | `[u32 total_len][record]*`, `total_len` a multiple of the record width |
//! | blob list | `[u32 4n][u32 size_1]..[u32 size_n][blob_1]..[blob_n]` |

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Width of a length header.
pub const LEN_SIZE: usize = 4;

/// Fixed-width record encoded big-endian.
pub trait Record: Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Appends the encoding of `self`.
    fn put<B: BufMut>(&self, out: &mut B);

    /// Decodes one record; `src` holds at least [`WIDTH`](Self::WIDTH) bytes.
    fn get<B: Buf>(src: &mut B) -> Self;
}

macro_rules! int_record {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Record for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn put<B: BufMut>(&self, out: &mut B) {
                    out.$put(*self);
                }

                fn get<B: Buf>(src: &mut B) -> Self {
                    src.$get()
                }
            }
        )*
    };
}

int_record! {
    u8 => put_u8, get_u8;
    u16 => put_u16, get_u16;
    u32 => put_u32, get_u32;
    u64 => put_u64, get_u64;
    i32 => put_i32, get_i32;
    i64 => put_i64, get_i64;
}

impl<A: Record, B: Record> Record for (A, B) {
    const WIDTH: usize = A::WIDTH + B::WIDTH;

    fn put<O: BufMut>(&self, out: &mut O) {
        self.0.put(out);
        self.1.put(out);
    }

    fn get<S: Buf>(src: &mut S) -> Self {
        let a = A::get(src);
        (a, B::get(src))
    }
}

impl<A: Record, B: Record, C: Record> Record for (A, B, C) {
    const WIDTH: usize = A::WIDTH + B::WIDTH + C::WIDTH;

    fn put<O: BufMut>(&self, out: &mut O) {
        self.0.put(out);
        self.1.put(out);
        self.2.put(out);
    }

    fn get<S: Buf>(src: &mut S) -> Self {
        let a = A::get(src);
        let b = B::get(src);
        (a, b, C::get(src))
    }
}

/// Encodes a length header, failing if `len` does not fit in a `u32`.
pub fn encode_len(len: usize) -> Result<Bytes> {
    let len = u32::try_from(len)
        .map_err(|_| Error::invalid_frame(format!("frame length {len} exceeds u32")))?;
    Ok(Bytes::copy_from_slice(&len.to_be_bytes()))
}

/// Decodes a length header.
pub fn decode_len(header: &[u8]) -> Result<usize> {
    let bytes: [u8; LEN_SIZE] = header
        .try_into()
        .map_err(|_| Error::invalid_frame(format!("length header of {} bytes", header.len())))?;
    Ok(u32::from_be_bytes(bytes) as usize)
}

/// Encodes the record payload (no header).
pub fn encode_records<R: Record>(records: &[R]) -> Bytes {
    let mut out = BytesMut::with_capacity(records.len() * R::WIDTH);
    for record in records {
        record.put(&mut out);
    }
    out.freeze()
}

/// Decodes a record payload (no header).
///
/// Fails if the payload is not a whole number of records.
pub fn decode_records<R: Record>(mut payload: Bytes) -> Result<Vec<R>> {
    if R::WIDTH == 0 || payload.len() % R::WIDTH != 0 {
        return Err(Error::invalid_frame(format!(
            "record list of {} bytes is not a multiple of record width {}",
            payload.len(),
            R::WIDTH
        )));
    }
    let mut records = Vec::with_capacity(payload.len() / R::WIDTH);
    while payload.has_remaining() {
        records.push(R::get(&mut payload));
    }
    Ok(records)
}
