use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::clock::ticks_to_seconds;

/// `(b - a + 2^33) mod 2^33`, the same wrap-safe delta the clock uses.
fn ticks_delta(a: u64, b: u64) -> u64 {
    const MODULUS: u64 = 1 << 33;
    (b.wrapping_sub(a).wrapping_add(MODULUS)) % MODULUS
}

/// A byte-stream subscriber: primed with whatever has already been buffered,
/// then fed live chunks. The channel closing (sender dropped) is the
/// end-of-stream signal — no sentinel value is needed.
pub struct Subscription {
    pub primed: Bytes,
    pub receiver: mpsc::Receiver<Bytes>,
}

/// One OUT-of-many `waiters` list a segment/partial resolves when it
/// completes: pending blocking-playlist requests for this exact target.
#[derive(Default)]
struct Waiters {
    full: Vec<oneshot::Sender<()>>,
    skip: Vec<oneshot::Sender<()>>,
}

impl Waiters {
    fn resolve_all(&mut self) {
        for tx in self.full.drain(..) {
            let _ = tx.send(());
        }
        for tx in self.skip.drain(..) {
            let _ = tx.send(());
        }
    }
}

/// A single fMP4/TS part: begins at `begin_pts`, grows as bytes arrive, and
/// completes when `end_pts` is set at the next boundary.
pub struct PartialSegment {
    pub begin_pts: u64,
    pub end_pts: Option<u64>,
    pub has_i_frame: bool,
    buffer: BytesMut,
    subscribers: Vec<mpsc::Sender<Bytes>>,
    waiters: Waiters,
}

impl PartialSegment {
    pub fn open(begin_pts: u64, has_i_frame: bool) -> Self {
        Self {
            begin_pts,
            end_pts: None,
            has_i_frame,
            buffer: BytesMut::new(),
            subscribers: Vec::new(),
            waiters: Waiters::default(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.end_pts.is_some()
    }

    /// Duration in seconds; only meaningful once completed.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_pts
            .map(|end| ticks_to_seconds(ticks_delta(self.begin_pts, end)))
    }

    pub fn push(&mut self, bytes: &Bytes) {
        self.buffer.extend_from_slice(bytes);
        self.subscribers.retain(|tx| tx.try_send(bytes.clone()).is_ok());
    }

    pub fn close(&mut self, end_pts: u64) {
        self.end_pts = Some(end_pts);
        self.subscribers.clear(); // dropping every sender closes the channel
        self.waiters.resolve_all();
    }

    pub fn subscribe(&mut self) -> Subscription {
        let (tx, rx) = mpsc::channel(256);
        let primed = self.buffer.clone().freeze();
        if !self.is_completed() {
            self.subscribers.push(tx);
        }
        Subscription {
            primed,
            receiver: rx,
        }
    }

    pub fn wait_full(&mut self) -> Option<oneshot::Receiver<()>> {
        if self.is_completed() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.full.push(tx);
        Some(rx)
    }

    pub fn wait_skip(&mut self) -> Option<oneshot::Receiver<()>> {
        if self.is_completed() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.skip.push(tx);
        Some(rx)
    }
}

/// A completed-or-completing Segment: one outer `PartialSegment` spanning the
/// whole segment plus the ordered inner parts served individually via
/// `#EXT-X-PART`.
pub struct Segment {
    pub media_sequence: u64,
    pub program_date_time: DateTime<Utc>,
    pub outer: PartialSegment,
    pub parts: Vec<PartialSegment>,
}

impl Segment {
    pub fn open(media_sequence: u64, begin_pts: u64, has_i_frame: bool, pdt: DateTime<Utc>) -> Self {
        Self {
            media_sequence,
            program_date_time: pdt,
            outer: PartialSegment::open(begin_pts, has_i_frame),
            parts: vec![PartialSegment::open(begin_pts, has_i_frame)],
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outer.is_completed()
    }

    pub fn push(&mut self, bytes: &Bytes) {
        self.outer.push(bytes);
        if let Some(last) = self.parts.last_mut() {
            last.push(bytes);
        }
    }

    /// Close the current part and open a new one at `t`.
    pub fn open_partial(&mut self, t: u64, has_i_frame: bool) {
        if let Some(last) = self.parts.last_mut() {
            last.close(t);
        }
        self.parts.push(PartialSegment::open(t, has_i_frame));
    }

    /// Close the outer segment and, cascading, its last inner partial.
    pub fn close(&mut self, t: u64) {
        if let Some(last) = self.parts.last_mut() {
            if !last.is_completed() {
                last.close(t);
            }
        }
        self.outer.close(t);
    }

    pub fn part(&mut self, index: usize) -> Option<&mut PartialSegment> {
        self.parts.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_segment_duration_uses_wrap_safe_delta() {
        let mut part = PartialSegment::open((1u64 << 33) - 1000, true);
        part.close(1000);
        assert_eq!(part.duration_seconds(), Some(2000.0 / 90_000.0));
    }

    #[test]
    fn segment_close_cascades_to_last_open_partial() {
        let mut seg = Segment::open(0, 0, true, Utc::now());
        seg.open_partial(500, false);
        seg.close(1000);
        assert!(seg.is_completed());
        assert!(seg.parts.last().unwrap().is_completed());
        assert_eq!(seg.parts.len(), 2);
    }

    #[test]
    fn subscriber_is_primed_with_already_buffered_bytes() {
        let mut part = PartialSegment::open(0, true);
        part.push(&Bytes::from_static(b"abc"));
        let sub = part.subscribe();
        assert_eq!(sub.primed, Bytes::from_static(b"abc"));
    }

    #[test]
    fn waiters_resolve_on_close() {
        let mut part = PartialSegment::open(0, true);
        let mut rx = part.wait_full().unwrap();
        part.close(90_000);
        assert!(rx.try_recv().is_ok());
    }
}
