use bytes::{BufMut, Bytes, BytesMut};

/// Write a box: 4-byte big-endian size, 4-byte FourCC, then whatever `body` appends.
pub(crate) fn boxed(fourcc: &[u8; 4], body: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut inner = BytesMut::new();
    body(&mut inner);
    let mut out = BytesMut::with_capacity(8 + inner.len());
    out.put_u32((8 + inner.len()) as u32);
    out.put_slice(fourcc);
    out.put_slice(&inner);
    out.freeze()
}

/// Concatenate a sequence of already-built boxes into one contiguous buffer.
pub(crate) fn concat(parts: &[Bytes]) -> Bytes {
    let mut out = BytesMut::with_capacity(parts.iter().map(|p| p.len()).sum());
    for p in parts {
        out.put_slice(p);
    }
    out.freeze()
}
