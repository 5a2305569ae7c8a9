//! Playlist-side state for the low-latency HLS origin: the wrap-safe clock,
//! the SCTE-35 OUT/IN scheduler, the segment/partial data model, the
//! IDR-led segmenter, and the blocking-reload-aware playlist store.

pub mod clock;
pub mod daterange;
pub mod error;
pub mod scte35_scheduler;
pub mod segment;
pub mod segmenter;
pub mod store;

pub use clock::Clock;
pub use daterange::Daterange;
pub use error::StoreError;
pub use scte35_scheduler::{PendingIn, PendingOut, Scte35Scheduler};
pub use segment::{PartialSegment, Segment, Subscription};
pub use segmenter::{AccessUnit, Segmenter};
pub use store::{BlockingWait, PlaylistConfig, PlaylistStore};
