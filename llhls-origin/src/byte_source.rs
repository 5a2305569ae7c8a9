use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{self, AsyncRead, AsyncReadExt};

/// Real-time pacing for file input: sleeps the shortfall so that a recorded
/// TS is replayed no faster than its own video timestamps advance, matching
/// §9's "maintain `(last_video_timestamp_90k, last_wall_clock)` and sleep the
/// shortfall" guidance. `None` for stdin, which is already paced by its
/// producer.
struct Pacer {
    last_timestamp_90k: Option<u64>,
    last_wall_clock: Instant,
}

impl Pacer {
    fn new() -> Self {
        Self { last_timestamp_90k: None, last_wall_clock: Instant::now() }
    }

    async fn wait_for(&mut self, timestamp_90k: u64) {
        match self.last_timestamp_90k {
            None => {
                self.last_timestamp_90k = Some(timestamp_90k);
                self.last_wall_clock = Instant::now();
            }
            Some(previous) => {
                let delta_ticks = timestamp_90k.saturating_sub(previous);
                let target = Duration::from_micros(delta_ticks * 1_000_000 / 90_000);
                let elapsed = self.last_wall_clock.elapsed();
                if target > elapsed {
                    tokio::time::sleep(target - elapsed).await;
                }
                self.last_timestamp_90k = Some(timestamp_90k);
                self.last_wall_clock = Instant::now();
            }
        }
    }
}

enum Inner {
    Stdin(io::Stdin),
    File(File),
}

/// A byte source abstraction over stdin or a file, per §9's "encapsulate
/// behind a byte source interface" guidance — callers never branch on which
/// one they have.
pub struct ByteSource {
    inner: Inner,
    pacer: Option<Pacer>,
}

impl ByteSource {
    pub fn stdin() -> Self {
        Self { inner: Inner::Stdin(io::stdin()), pacer: None }
    }

    pub async fn open_file(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self { inner: Inner::File(file), pacer: Some(Pacer::new()) })
    }

    /// Read up to `len` bytes. Returns `None` at EOF with nothing read.
    pub async fn read_chunk(&mut self, len: usize) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; len];
        let reader: &mut (dyn AsyncRead + Unpin + Send) = match &mut self.inner {
            Inner::Stdin(s) => s,
            Inner::File(f) => f,
        };
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    /// No-op for stdin; for a paced file source, sleeps until wall-clock time
    /// has caught up to `timestamp_90k` of media already read.
    pub async fn pace(&mut self, timestamp_90k: u64) {
        if let Some(pacer) = &mut self.pacer {
            pacer.wait_for(timestamp_90k).await;
        }
    }
}
