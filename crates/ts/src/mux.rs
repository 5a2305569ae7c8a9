use bytes::{BufMut, Bytes, BytesMut};

const TS_PACKET_SIZE: usize = 188;
const TS_HEADER_SIZE: usize = 4;
const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;

/// Per-PID continuity counter generator for the output TS stream.
#[derive(Debug, Default)]
pub struct ContinuityCounters {
    counters: std::collections::HashMap<u16, u8>,
}

impl ContinuityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, pid: u16) -> u8 {
        let cc = self.counters.entry(pid).or_insert(0);
        let value = *cc;
        *cc = (*cc + 1) & 0x0F;
        value
    }

    /// Reset the counter for a PID (used when the stream is reconfigured).
    pub fn reset(&mut self, pid: u16) {
        self.counters.remove(&pid);
    }
}

/// Packetize a PSI section (PAT or PMT, already including its trailing CRC-32) into
/// one or more 188-byte TS packets on `pid`.
pub fn packetize_section(pid: u16, section: &Bytes, cc: &mut ContinuityCounters) -> Vec<Bytes> {
    let mut payload = BytesMut::with_capacity(1 + section.len());
    payload.put_u8(0x00); // pointer_field
    payload.extend_from_slice(section);
    packetize_payload(pid, payload.freeze(), false, cc)
}

/// Packetize an elementary stream PES packet into TS packets on `pid`.
///
/// `random_access` marks the first packet's adaptation field with the random
/// access indicator (set on PES carrying an IDR access unit).
pub fn packetize_pes(
    pid: u16,
    pes: &Bytes,
    random_access: bool,
    cc: &mut ContinuityCounters,
) -> Vec<Bytes> {
    packetize_payload(pid, pes.clone(), random_access, cc)
}

/// Packetize a raw payload (PSI section with pointer field, or PES packet) into TS
/// packets. `payload_unit_start_indicator` is set on the first packet only.
fn packetize_payload(
    pid: u16,
    mut payload: Bytes,
    random_access: bool,
    cc: &mut ContinuityCounters,
) -> Vec<Bytes> {
    let mut packets = Vec::new();
    let mut pusi = true;

    loop {
        let mut header = BytesMut::with_capacity(TS_PACKET_SIZE);
        let byte1 = ((pusi as u8) << 6) | ((pid >> 8) as u8 & 0x1F);
        header.put_u8(0x47);
        header.put_u8(byte1);
        header.put_u8((pid & 0xFF) as u8);

        let mark_random_access = random_access && pusi;
        let mut take = payload.len().min(TS_PAYLOAD_SIZE);
        if mark_random_access && take == TS_PAYLOAD_SIZE {
            // Leave room for a 2-byte adaptation field carrying the random access flag.
            take -= 2;
        }
        let needs_stuffing = take < TS_PAYLOAD_SIZE;
        let continuity_counter = cc.next(pid);

        if needs_stuffing || mark_random_access {
            let stuffing_needed = TS_PAYLOAD_SIZE - take - 1;
            let mut flags = 0u8;
            if mark_random_access {
                flags |= 0x40;
            }
            header.put_u8(0x30 | continuity_counter); // adaptation field + payload
            header.put_u8(stuffing_needed as u8);
            if stuffing_needed > 0 {
                header.put_u8(flags);
                header.extend(std::iter::repeat_n(0xFFu8, stuffing_needed - 1));
            }
        } else {
            header.put_u8(0x10 | continuity_counter); // payload only
        }

        let chunk = payload.split_to(take);
        header.extend_from_slice(&chunk);
        debug_assert_eq!(header.len(), TS_PACKET_SIZE);
        packets.push(header.freeze());

        pusi = false;
        if payload.is_empty() {
            break;
        }
    }

    packets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packetizes_small_section_into_single_packet() {
        let section = Bytes::from_static(&[0xFCu8; 20]);
        let mut cc = ContinuityCounters::new();
        let packets = packetize_section(0x0000, &section, &mut cc);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), TS_PACKET_SIZE);
        assert_eq!(packets[0][0], 0x47);
        assert_eq!(packets[0][1] & 0x40, 0x40); // PUSI set
    }

    #[test]
    fn continuity_counter_increments_mod_16_per_pid() {
        let section = Bytes::from_static(&[0x00u8; 4]);
        let mut cc = ContinuityCounters::new();
        for expected in 0..20u8 {
            let packets = packetize_section(0x100, &section, &mut cc);
            let actual_cc = packets[0][3] & 0x0F;
            assert_eq!(actual_cc, expected & 0x0F);
        }
    }

    #[test]
    fn large_payload_splits_across_multiple_packets() {
        let payload = Bytes::from(vec![0xABu8; 500]);
        let mut cc = ContinuityCounters::new();
        let packets = packetize_pes(0x101, &payload, true, &mut cc);
        assert!(packets.len() >= 3);
        for p in &packets {
            assert_eq!(p.len(), TS_PACKET_SIZE);
        }
    }
}
