use thiserror::Error;

/// Errors surfaced by the playlist store's blocking/lookup API.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("requested media sequence {requested} is outside the current window ({oldest}..={newest})")]
    MediaSequenceOutOfWindow {
        requested: u64,
        oldest: u64,
        newest: u64,
    },

    #[error("segment {msn} has no part {part}")]
    PartNotFound { msn: u64, part: usize },
}
