//! Replay sensor sources.
//!
//! Plays field-recorded (or synthesized) sensor frames from a JSONL file
//! through the same provider seam the hardware drivers use: one JSON
//! object per line, published when the run clock passes its timestamp.
//!
//! ```json
//! {"time_ms":40,"scan":[[0,1500.0,55],[90,500.0,55]],"blobs":[],"encoder":24}
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use trackpilot_core::{BlobSource, ColorBlob, EncoderSource, Scan, ScanSource};
use trackpilot_env::{Latest, RobotContext};

/// One recorded frame.
#[derive(Debug, Clone, Deserialize)]
struct ReplayFrame {
    time_ms: u64,

    /// (angle, distance_mm, quality) triples
    #[serde(default)]
    scan: Vec<(u16, f32, u8)>,

    #[serde(default)]
    blobs: Vec<ColorBlob>,

    #[serde(default)]
    encoder: Option<i64>,
}

/// Latest-scan cell fed by the replay task.
#[derive(Default)]
pub struct ReplayScanSource {
    latest: Latest<Scan>,
}

impl ScanSource for ReplayScanSource {
    fn scan(&self) -> Arc<Scan> {
        self.latest.snapshot()
    }
}

/// Latest-blobs cell fed by the replay task.
#[derive(Default)]
pub struct ReplayBlobSource {
    latest: Latest<Vec<ColorBlob>>,
}

impl BlobSource for ReplayBlobSource {
    fn blobs(&self) -> Arc<Vec<ColorBlob>> {
        self.latest.snapshot()
    }
}

/// Encoder cell fed by the replay task (dry-run mode without a serial
/// link).
#[derive(Clone, Default)]
pub struct ReplayEncoder(Arc<AtomicI64>);

impl EncoderSource for ReplayEncoder {
    fn encoder(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Loads and plays a frame file.
pub struct ReplayPlayer {
    frames: Vec<ReplayFrame>,
}

impl ReplayPlayer {
    /// Parses the JSONL file; bad lines are skipped with a warning.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut frames: Vec<ReplayFrame> = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ReplayFrame>(&line) {
                Ok(frame) => frames.push(frame),
                Err(e) => warn!(error = %e, "skipping bad replay line"),
            }
        }
        frames.sort_by_key(|f| f.time_ms);
        info!(path = %path.display(), frames = frames.len(), "replay loaded");
        Ok(Self { frames })
    }

    /// Spawns the playback task on the context; each frame publishes at
    /// its timestamp.
    ///
    /// Playback owns its task the way an acquisition thread owns its
    /// device; consumers only ever see snapshots.
    pub fn spawn<Ctx: RobotContext>(
        self,
        ctx: Arc<Ctx>,
    ) -> (
        Arc<ReplayScanSource>,
        Arc<ReplayBlobSource>,
        ReplayEncoder,
    ) {
        let scans = Arc::new(ReplayScanSource::default());
        let blobs = Arc::new(ReplayBlobSource::default());
        let encoder = ReplayEncoder::default();

        let scans_task = Arc::clone(&scans);
        let blobs_task = Arc::clone(&blobs);
        let encoder_task = encoder.clone();
        let task_ctx = Arc::clone(&ctx);

        ctx.spawn("replay-playback", async move {
            let started = task_ctx.now();
            for frame in self.frames {
                let at = Duration::from_millis(frame.time_ms);
                let elapsed = task_ctx.now().saturating_sub(started);
                if at > elapsed {
                    task_ctx.sleep(at - elapsed).await;
                }

                if !frame.scan.is_empty() {
                    let mut scan = Scan::new(at);
                    for (angle, distance, quality) in &frame.scan {
                        scan.insert(*angle, *distance, *quality);
                    }
                    scans_task.latest.publish(scan);
                }
                blobs_task.latest.publish(frame.blobs);
                if let Some(ticks) = frame.encoder {
                    encoder_task.0.store(ticks, Ordering::Release);
                }
            }
            info!("replay finished");
        });

        (scans, blobs, encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_skips_bad_lines() {
        let dir = std::env::temp_dir().join("trackpilot_replay_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frames.jsonl");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"time_ms":0,"scan":[[0,1500.0,55]],"encoder":0}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"time_ms":20,"scan":[[0,1480.0,55]],"encoder":12}}"#).unwrap();
        drop(file);

        let player = ReplayPlayer::load(&path).await.unwrap();
        assert_eq!(player.frames.len(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_playback_publishes_frames() {
        let player = ReplayPlayer {
            frames: vec![ReplayFrame {
                time_ms: 0,
                scan: vec![(0, 1500.0, 55), (90, 480.0, 55)],
                blobs: vec![],
                encoder: Some(5),
            }],
        };

        let ctx = trackpilot_env::TokioContext::shared();
        let (scans, _blobs, encoder) = player.spawn(ctx);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(scans.scan().len(), 2);
        assert_eq!(encoder.encoder(), 5);
    }
}
