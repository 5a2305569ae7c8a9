use std::sync::Arc;

use hls::{PlaylistConfig, PlaylistStore};
use tokio::sync::Mutex;

use crate::pipeline::PipelineHandle;

/// The one shared state axum handlers see, mirroring the teacher's
/// `AppState` pattern but scoped to the single running pipeline this binary
/// owns — there is exactly one variant, so no per-request lookup is needed.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
    pub target_duration: f64,
    pub part_duration: f64,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle, target_duration: f64, part_duration: f64) -> Self {
        Self { pipeline, target_duration, part_duration }
    }
}

/// Build the store a `Pipeline` writes into and the HTTP layer reads from,
/// shared as the same `Arc<Mutex<_>>` between the two.
pub fn new_store(
    window_size: Option<usize>,
    target_duration: f64,
    part_duration: f64,
    has_init: bool,
) -> Arc<Mutex<PlaylistStore>> {
    Arc::new(Mutex::new(PlaylistStore::new(PlaylistConfig {
        window_size,
        target_duration,
        part_target: part_duration,
        has_init,
        part_preload_window: 3,
    })))
}
