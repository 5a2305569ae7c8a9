use bytes::{BufMut, Bytes};

use crate::boxes::boxed;

/// Build a version-1 `emsg` box (ISO/IEC 23009-1 Annex E) carrying an
/// out-of-band event — SCTE-35 splice points surfaced to the player as ID3-style
/// timed metadata, as a DASH client would consume them.
pub fn build_emsg(
    timescale: u32,
    presentation_time: u64,
    event_duration: Option<u32>,
    id: u32,
    scheme_id_uri: &str,
    value: &str,
    message_data: &[u8],
) -> Bytes {
    boxed(b"emsg", |b| {
        b.put_u8(1); // version 1
        b.put_slice(&[0, 0, 0]); // flags
        b.put_u32(timescale);
        b.put_u64(presentation_time);
        b.put_u32(event_duration.unwrap_or(u32::MAX));
        b.put_u32(id);
        b.put_slice(scheme_id_uri.as_bytes());
        b.put_u8(0);
        b.put_slice(value.as_bytes());
        b.put_u8(0);
        b.put_slice(message_data);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_emsg_with_scheme_and_duration() {
        let emsg = build_emsg(90_000, 8_100_000, Some(270_000), 1, "https://aomedia.org/emsg/ID3", "", &[0xDE, 0xAD]);
        assert_eq!(&emsg[4..8], b"emsg");
        assert!(emsg
            .windows("https://aomedia.org/emsg/ID3".len())
            .any(|w| w == "https://aomedia.org/emsg/ID3".as_bytes()));
        assert!(emsg.windows(2).any(|w| w == [0xDE, 0xAD]));
    }

    #[test]
    fn unknown_duration_defaults_to_max_u32() {
        let emsg = build_emsg(90_000, 0, None, 1, "urn:test", "", &[]);
        // event_duration sits right after the 8-byte presentation_time field.
        let offset = 8 + 4 + 4 + 8;
        let duration = u32::from_be_bytes(emsg[offset..offset + 4].try_into().unwrap());
        assert_eq!(duration, u32::MAX);
    }
}
