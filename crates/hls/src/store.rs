use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::daterange::Daterange;
use crate::error::StoreError;
use crate::segment::{Segment, Subscription};

#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    /// Live sliding window size in segments; `None` ⇒ event playlist (no eviction).
    pub window_size: Option<usize>,
    pub target_duration: f64,
    pub part_target: f64,
    /// Whether the variant carries an fMP4 init segment (`#EXT-X-MAP`).
    pub has_init: bool,
    /// How many trailing segments get per-part `#EXT-X-PART`/preload-hint
    /// lines, clamped upward to cover `PART-HOLD-BACK` worth of media.
    pub part_preload_window: usize,
}

impl PlaylistConfig {
    pub fn part_hold_back(&self) -> f64 {
        self.part_target * 3.001
    }

    fn effective_preload_window(&self, segments: &VecDeque<Segment>) -> usize {
        let mut window = self.part_preload_window;
        let hold_back = self.part_hold_back();
        let mut covered = 0.0;
        let mut needed = 0usize;
        for segment in segments.iter().rev() {
            if covered >= hold_back {
                break;
            }
            covered += segment.outer.duration_seconds().unwrap_or(self.target_duration);
            needed += 1;
        }
        if needed > window {
            window = needed;
        }
        window
    }
}

/// The result of beginning a blocking-playlist request: either the manifest
/// is already available, or the caller must await the returned receiver and
/// then re-render.
pub enum BlockingWait {
    Ready(String),
    Pending(oneshot::Receiver<()>),
}

pub struct PlaylistStore {
    config: PlaylistConfig,
    segments: VecDeque<Segment>,
    outdated: VecDeque<Segment>,
    dateranges: BTreeMap<String, Daterange>,
    next_msn: u64,
    published: bool,
    plain_waiters: Vec<oneshot::Sender<()>>,
}

impl PlaylistStore {
    pub fn new(config: PlaylistConfig) -> Self {
        Self {
            config,
            segments: VecDeque::new(),
            outdated: VecDeque::new(),
            dateranges: BTreeMap::new(),
            next_msn: 0,
            published: false,
            plain_waiters: Vec::new(),
        }
    }

    pub fn media_sequence(&self) -> u64 {
        self.segments.front().map(|s| s.media_sequence).unwrap_or(self.next_msn)
    }

    #[cfg(test)]
    pub fn segments_len_for_test(&self) -> usize {
        self.segments.len()
    }

    /// Append bytes to the current segment's buffer and every inner
    /// partial's subscribers.
    pub fn push(&mut self, bytes: &bytes::Bytes) {
        if let Some(segment) = self.segments.back_mut() {
            segment.push(bytes);
        }
    }

    /// Close the last segment at `t`, open a new one with an initial partial
    /// at `t`. Evicts live→outdated / outdated→gone once the window is over
    /// its configured size; `window_size = None` disables eviction entirely.
    pub fn continuous_segment(&mut self, t: u64, has_i_frame: bool, pdt: DateTime<Utc>) {
        if let Some(last) = self.segments.back_mut() {
            last.close(t);
        }
        let msn = self.next_msn;
        self.next_msn += 1;
        self.segments.push_back(Segment::open(msn, t, has_i_frame, pdt));

        if let Some(window_size) = self.config.window_size {
            while self.segments.len() > window_size {
                if let Some(evicted) = self.segments.pop_front() {
                    self.outdated.push_back(evicted);
                }
            }
            while self.outdated.len() > window_size {
                self.outdated.pop_front();
            }
        }

        self.published = true;
        for tx in self.plain_waiters.drain(..) {
            let _ = tx.send(());
        }
    }

    /// Close the last partial at `t`, open a new one.
    pub fn continuous_partial(&mut self, t: u64, has_i_frame: bool) {
        if let Some(segment) = self.segments.back_mut() {
            segment.open_partial(t, has_i_frame);
        }
    }

    pub fn open_daterange(
        &mut self,
        id: String,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        attributes: BTreeMap<String, String>,
    ) {
        let entry = self
            .dateranges
            .entry(id.clone())
            .or_insert_with(|| Daterange::open(id, start));
        entry.attributes.extend(attributes);
        if let Some(end) = end {
            entry.close(end);
        }
    }

    pub fn close_daterange(&mut self, id: &str, end: DateTime<Utc>) {
        if let Some(entry) = self.dateranges.get_mut(id) {
            entry.close(end);
        }
    }

    /// Resolves immediately if `published` is already true, otherwise once
    /// the first segment closes.
    pub fn plain(&mut self) -> Option<oneshot::Receiver<()>> {
        if self.published {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.plain_waiters.push(tx);
        Some(rx)
    }

    fn find_segment_mut(&mut self, msn: u64) -> Option<&mut Segment> {
        self.segments
            .iter_mut()
            .chain(self.outdated.iter_mut())
            .find(|s| s.media_sequence == msn)
    }

    fn oldest_msn(&self) -> u64 {
        self.outdated
            .front()
            .map(|s| s.media_sequence)
            .or_else(|| self.segments.front().map(|s| s.media_sequence))
            .unwrap_or(0)
    }

    fn newest_msn(&self) -> u64 {
        self.segments
            .back()
            .map(|s| s.media_sequence)
            .unwrap_or(self.next_msn.saturating_sub(1))
    }

    /// Begin a blocking playlist request for segment `msn` (and optionally
    /// part `part`). Returns `Ready` if the target is already complete.
    pub fn begin_blocking(
        &mut self,
        msn: u64,
        part: Option<usize>,
        skip: bool,
    ) -> Result<BlockingWait, StoreError> {
        if msn < self.oldest_msn() || msn > self.newest_msn() {
            return Err(StoreError::MediaSequenceOutOfWindow {
                requested: msn,
                oldest: self.oldest_msn(),
                newest: self.newest_msn(),
            });
        }

        let segment = self.find_segment_mut(msn).expect("msn checked against window bounds");

        let waiter = if let Some(part) = part {
            let Some(partial) = segment.part(part) else {
                return Err(StoreError::PartNotFound { msn, part });
            };
            if skip { partial.wait_skip() } else { partial.wait_full() }
        } else if skip {
            segment.outer.wait_skip()
        } else {
            segment.outer.wait_full()
        };

        match waiter {
            Some(rx) => Ok(BlockingWait::Pending(rx)),
            None => Ok(BlockingWait::Ready(self.render_manifest(skip))),
        }
    }

    pub fn subscribe_segment(&mut self, msn: u64) -> Option<Subscription> {
        self.find_segment_mut(msn).map(|s| s.outer.subscribe())
    }

    pub fn subscribe_partial(&mut self, msn: u64, part: usize) -> Option<Subscription> {
        self.find_segment_mut(msn).and_then(|s| s.part(part)).map(|p| p.subscribe())
    }

    fn ceil_target_duration(&self) -> u64 {
        let max_completed = self
            .segments
            .iter()
            .filter_map(|s| s.outer.duration_seconds())
            .fold(self.config.target_duration, f64::max);
        max_completed.ceil() as u64
    }

    /// Render the full or delta (`skip=true`) manifest, in the directive
    /// order required by RFC 8216-bis §4.4 / the LL-HLS extensions.
    pub fn render_manifest(&mut self, skip: bool) -> String {
        if let Some(first) = self.segments.front() {
            let pdt = first.program_date_time;
            self.dateranges.retain(|_, dr| dr.end_date.map(|end| end >= pdt).unwrap_or(true));
        }

        let mut out = String::new();
        writeln!(out, "#EXTM3U").unwrap();
        let version = if self.config.window_size.is_none() { 9 } else { 6 };
        writeln!(out, "#EXT-X-VERSION:{version}").unwrap();
        writeln!(out, "#EXT-X-TARGETDURATION:{}", self.ceil_target_duration()).unwrap();
        writeln!(out, "#EXT-X-PART-INF:PART-TARGET={:.6}", self.config.part_target).unwrap();

        let hold_back = self.config.part_hold_back();
        if self.config.window_size.is_none() {
            let skip_until = self.config.target_duration * 6.0;
            writeln!(
                out,
                "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK={hold_back:.3},CAN-SKIP-UNTIL={skip_until:.3}"
            )
            .unwrap();
            writeln!(out, "#EXT-X-PLAYLIST-TYPE:EVENT").unwrap();
        } else {
            writeln!(out, "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK={hold_back:.3}").unwrap();
        }

        writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence()).unwrap();
        if self.config.has_init {
            writeln!(out, "#EXT-X-MAP:URI=\"init\"").unwrap();
        }

        let skip_end_index = if skip {
            self.compute_skip_end_index()
        } else {
            0
        };
        if skip {
            writeln!(out, "#EXT-X-SKIP:SKIPPED-SEGMENTS={skip_end_index}").unwrap();
        }

        for dr in self.dateranges.values() {
            out.push_str(&dr.serialize());
        }

        let preload_window = self.config.effective_preload_window(&self.segments);
        let total = self.segments.len();
        for (index, segment) in self.segments.iter().enumerate().skip(skip_end_index) {
            writeln!(
                out,
                "#EXT-X-PROGRAM-DATE-TIME:{}",
                segment.program_date_time.to_rfc3339()
            )
            .unwrap();

            if total - index <= preload_window {
                for (part_index, part) in segment.parts.iter().enumerate() {
                    let independent = if part.has_i_frame { ",INDEPENDENT=YES" } else { "" };
                    if let Some(duration) = part.duration_seconds() {
                        writeln!(
                            out,
                            "#EXT-X-PART:DURATION={duration:.6},URI=\"part?msn={}&part={part_index}\"{independent}",
                            segment.media_sequence
                        )
                        .unwrap();
                    } else {
                        writeln!(
                            out,
                            "#EXT-X-PRELOAD-HINT:TYPE=PART,URI=\"part?msn={}&part={part_index}\"{independent}",
                            segment.media_sequence
                        )
                        .unwrap();
                    }
                }
            }

            if let Some(duration) = segment.outer.duration_seconds() {
                writeln!(out, "#EXTINF:{duration:.6}").unwrap();
                writeln!(out, "segment?msn={}", segment.media_sequence).unwrap();
            }
        }

        out
    }

    /// Largest index such that the tail of segments from that index sums to
    /// at least `target * 6` seconds of `#EXTINF`.
    fn compute_skip_end_index(&self) -> usize {
        let threshold = self.config.target_duration * 6.0;
        let mut sum = 0.0;
        let mut index = self.segments.len();
        for (i, segment) in self.segments.iter().enumerate().rev() {
            if sum >= threshold {
                index = i + 1;
                break;
            }
            sum += segment.outer.duration_seconds().unwrap_or(0.0);
            index = i;
        }
        index
    }
}
