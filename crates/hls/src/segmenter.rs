use chrono::{DateTime, Utc};

use crate::scte35_scheduler::Scte35Scheduler;
use crate::store::PlaylistStore;

const CLOCK_HZ: u64 = 90_000;

/// One coded access unit handed to the segmenter: a video frame, or — for
/// audio-only streams — an AAC frame acting as the leading track.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnit {
    pub has_idr: bool,
    pub timestamp_90k: u64,
    pub program_date_time: DateTime<Utc>,
}

/// Video-led segment/partial boundary decision, driven by IDR placement and
/// target/part durations. Mutates the playlist store and drains due SCTE-35
/// events at each boundary it opens.
pub struct Segmenter {
    segment_timestamp: Option<u64>,
    part_timestamp: Option<u64>,
    target_duration_ticks: u64,
    part_target_ticks: u64,
}

impl Segmenter {
    pub fn new(target_duration_secs: f64, part_target_secs: f64) -> Self {
        Self {
            segment_timestamp: None,
            part_timestamp: None,
            target_duration_ticks: (target_duration_secs * CLOCK_HZ as f64) as u64,
            part_target_ticks: (part_target_secs * CLOCK_HZ as f64) as u64,
        }
    }

    /// Feed the next leading-track access unit. `audio_is_leading` is true
    /// only for streams with no video track, per §4.7's video-led rule.
    /// Returns `true` if this call opened a new segment (as opposed to at
    /// most a new partial, or neither) — callers that republish a header at
    /// each segment boundary (e.g. the TS writer's PAT/PMT) use this to know
    /// when to do so.
    pub fn on_access_unit(
        &mut self,
        unit: AccessUnit,
        audio_is_leading: bool,
        store: &mut PlaylistStore,
        scheduler: &mut Scte35Scheduler,
    ) -> bool {
        let t = unit.timestamp_90k;

        let segment_due = match self.segment_timestamp {
            None => true,
            Some(segment_timestamp) => {
                unit.has_idr
                    || audio_is_leading
                    || ticks_delta(segment_timestamp, t) >= self.target_duration_ticks
            }
        };

        if segment_due {
            if let Some(part_timestamp) = self.part_timestamp {
                let elapsed = ticks_delta(part_timestamp, t);
                if elapsed >= self.part_target_ticks {
                    let excess = elapsed - self.part_target_ticks;
                    let cap_point = t.wrapping_sub(excess.min(t));
                    store.continuous_partial(cap_point, false);
                }
            }

            for out in scheduler.drain_due_outs(unit.program_date_time) {
                store.open_daterange(out.id, out.start_date, None, out.attributes);
            }
            for inn in scheduler.drain_due_ins(unit.program_date_time) {
                store.close_daterange(&inn.id, inn.end_date);
            }

            store.continuous_segment(t, unit.has_idr, unit.program_date_time);
            self.segment_timestamp = Some(t);
            self.part_timestamp = Some(t);
            return true;
        }

        if let Some(part_timestamp) = self.part_timestamp {
            if ticks_delta(part_timestamp, t) >= self.part_target_ticks {
                store.continuous_partial(t, unit.has_idr);
                self.part_timestamp = Some(t);
            }
        }
        false
    }
}

fn ticks_delta(a: u64, b: u64) -> u64 {
    const MODULUS: u64 = 1 << 33;
    (b.wrapping_sub(a).wrapping_add(MODULUS)) % MODULUS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlaylistConfig;

    fn store() -> PlaylistStore {
        PlaylistStore::new(PlaylistConfig {
            window_size: Some(6),
            target_duration: 2.0,
            part_target: 0.5,
            has_init: true,
            part_preload_window: 4,
        })
    }

    #[test]
    fn first_access_unit_always_opens_a_segment() {
        let mut segmenter = Segmenter::new(2.0, 0.5);
        let mut store = store();
        let mut scheduler = Scte35Scheduler::new();
        segmenter.on_access_unit(
            AccessUnit {
                has_idr: true,
                timestamp_90k: 0,
                program_date_time: Utc::now(),
            },
            false,
            &mut store,
            &mut scheduler,
        );
        assert_eq!(store.media_sequence(), 0);
    }

    #[test]
    fn non_idr_within_part_target_does_not_open_a_partial() {
        let mut segmenter = Segmenter::new(2.0, 0.5);
        let mut store = store();
        let mut scheduler = Scte35Scheduler::new();
        let now = Utc::now();
        segmenter.on_access_unit(
            AccessUnit { has_idr: true, timestamp_90k: 0, program_date_time: now },
            false,
            &mut store,
            &mut scheduler,
        );
        segmenter.on_access_unit(
            AccessUnit { has_idr: false, timestamp_90k: 1000, program_date_time: now },
            false,
            &mut store,
            &mut scheduler,
        );
        assert_eq!(store.segments_len_for_test(), 1);
    }

    #[test]
    fn idr_after_target_duration_opens_new_segment() {
        let mut segmenter = Segmenter::new(2.0, 0.5);
        let mut store = store();
        let mut scheduler = Scte35Scheduler::new();
        let now = Utc::now();
        segmenter.on_access_unit(
            AccessUnit { has_idr: true, timestamp_90k: 0, program_date_time: now },
            false,
            &mut store,
            &mut scheduler,
        );
        segmenter.on_access_unit(
            AccessUnit { has_idr: true, timestamp_90k: 2 * 90_000, program_date_time: now },
            false,
            &mut store,
            &mut scheduler,
        );
        assert_eq!(store.segments_len_for_test(), 2);
    }
}
