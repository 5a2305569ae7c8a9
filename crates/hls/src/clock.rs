use chrono::{DateTime, Duration, Utc};

/// Width of the MPEG-2 PCR/PTS timestamp field.
const TIMESTAMP_BITS: u64 = 33;
const TIMESTAMP_MODULUS: u64 = 1 << TIMESTAMP_BITS;
const CLOCK_HZ: i64 = 90_000;

/// Wrap-safe 90kHz monotonic clock anchored to a wall-clock instant.
///
/// The MPEG-TS PCR field wraps every `2^33` ticks (about 26.5 hours at 90kHz);
/// every update advances the monotonic counter and the wall-clock anchor by
/// the same forward-only delta so neither timeline can run backwards across
/// a wrap.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    latest_pcr_value: Option<u64>,
    latest_pcr_datetime: Option<DateTime<Utc>>,
    latest_pcr_monotonic_90k: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a newly observed PCR value (already masked to 33 bits).
    pub fn update_pcr(&mut self, pcr: u64, now: DateTime<Utc>) {
        match self.latest_pcr_value {
            None => {
                // A one-second lead ensures playlist PDTs never read as
                // future-dated relative to a client whose clock is slightly
                // ahead of this process's.
                self.latest_pcr_datetime = Some(now - Duration::seconds(1));
                self.latest_pcr_value = Some(pcr);
            }
            Some(previous) => {
                let delta = pcr_delta(previous, pcr);
                self.latest_pcr_monotonic_90k += delta;
                self.latest_pcr_datetime =
                    self.latest_pcr_datetime.map(|dt| dt + ticks_to_duration(delta));
                self.latest_pcr_value = Some(pcr);
            }
        }
    }

    /// Map a PTS/DTS value into the monotonic 90kHz timeline. `None` until a
    /// PCR has been observed.
    pub fn timestamp(&self, pts: u64) -> Option<u64> {
        let anchor = self.latest_pcr_value?;
        let delta = pcr_delta(anchor, pts);
        Some(delta + self.latest_pcr_monotonic_90k)
    }

    /// Map a PTS/DTS value to a wall-clock instant. `None` until a PCR has
    /// been observed.
    pub fn program_date_time(&self, pts: u64) -> Option<DateTime<Utc>> {
        let anchor = self.latest_pcr_value?;
        let base = self.latest_pcr_datetime?;
        let delta = pcr_delta(anchor, pts);
        Some(base + ticks_to_duration(delta))
    }

    pub fn has_reference(&self) -> bool {
        self.latest_pcr_value.is_some()
    }

    /// The PTS value that currently maps to "now": the most recently
    /// observed PCR itself, since `program_date_time` of the anchor is by
    /// definition `latest_pcr_datetime`.
    pub fn latest_pcr(&self) -> Option<u64> {
        self.latest_pcr_value
    }
}

/// `(b - a + 2^33) mod 2^33`: the forward distance from `a` to `b` around the
/// 33-bit PCR wheel.
fn pcr_delta(a: u64, b: u64) -> u64 {
    (b.wrapping_sub(a).wrapping_add(TIMESTAMP_MODULUS)) % TIMESTAMP_MODULUS
}

fn ticks_to_duration(ticks: u64) -> Duration {
    let micros = (ticks as i64) * 1_000_000 / CLOCK_HZ;
    Duration::microseconds(micros)
}

/// Seconds represented by a tick delta, for `#EXTINF`/duration computations.
pub fn ticks_to_seconds(ticks: u64) -> f64 {
    ticks as f64 / CLOCK_HZ as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pcr_anchors_one_second_in_the_past() {
        let mut clock = Clock::new();
        let now = Utc::now();
        clock.update_pcr(1000, now);
        assert_eq!(clock.program_date_time(1000), Some(now - Duration::seconds(1)));
        assert_eq!(clock.timestamp(1000), Some(0));
    }

    #[test]
    fn advances_monotonic_counter_by_delta() {
        let mut clock = Clock::new();
        let now = Utc::now();
        clock.update_pcr(1000, now);
        clock.update_pcr(1000 + 90_000, now + Duration::seconds(1));
        assert_eq!(clock.timestamp(1000 + 90_000), Some(90_000));
    }

    #[test]
    fn survives_pcr_wraparound() {
        let mut clock = Clock::new();
        let now = Utc::now();
        let near_wrap = TIMESTAMP_MODULUS - 1000;
        clock.update_pcr(near_wrap, now);
        let wrapped = 8000u64 % TIMESTAMP_MODULUS; // wrapped past 2^33
        clock.update_pcr(wrapped, now + Duration::seconds(1));
        // 1000 ticks to reach the wrap, plus 8000 after it.
        assert_eq!(clock.timestamp(wrapped), Some(9000));
    }

    #[test]
    fn unavailable_before_first_pcr() {
        let clock = Clock::new();
        assert_eq!(clock.timestamp(0), None);
        assert_eq!(clock.program_date_time(0), None);
        assert!(!clock.has_reference());
    }
}
