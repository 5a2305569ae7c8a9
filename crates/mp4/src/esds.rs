use bytes::{BufMut, Bytes, BytesMut};

use crate::boxes::boxed;

/// MPEG-4 descriptor tags (ISO/IEC 14496-1).
const TAG_ES_DESCRIPTOR: u8 = 0x03;
const TAG_DECODER_CONFIG: u8 = 0x04;
const TAG_DECODER_SPECIFIC_INFO: u8 = 0x05;
const TAG_SL_CONFIG: u8 = 0x06;

const OBJECT_TYPE_AAC: u8 = 0x40;
const STREAM_TYPE_AUDIO: u8 = 0x05;

fn write_descriptor(buf: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    let mut inner = BytesMut::new();
    body(&mut inner);
    buf.put_u8(tag);
    // All descriptors built here stay under 128 bytes, so a single-byte
    // expandable-length field (the MSB-clear case) is always sufficient.
    buf.put_u8(inner.len() as u8);
    buf.put_slice(&inner);
}

/// Build the `esds` box wrapping an AAC `AudioSpecificConfig`.
pub fn build_esds(audio_specific_config: &[u8; 2]) -> Bytes {
    boxed(b"esds", |b| {
        b.put_u32(0); // version + flags
        write_descriptor(b, TAG_ES_DESCRIPTOR, |es| {
            es.put_u16(0); // ES_ID
            es.put_u8(0); // stream dependence / URL / OCR flags, priority
            write_descriptor(es, TAG_DECODER_CONFIG, |dc| {
                dc.put_u8(OBJECT_TYPE_AAC);
                dc.put_u8((STREAM_TYPE_AUDIO << 2) | 0x01); // upStream=0, reserved=1
                dc.put_slice(&[0, 0, 0]); // bufferSizeDB
                dc.put_u32(0); // maxBitrate
                dc.put_u32(0); // avgBitrate
                write_descriptor(dc, TAG_DECODER_SPECIFIC_INFO, |si| {
                    si.put_slice(audio_specific_config);
                });
            });
            write_descriptor(es, TAG_SL_CONFIG, |sl| {
                sl.put_u8(0x02); // predefined = reserved for use in MP4
            });
        });
    })
}
