use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;

pub static METER: Meter = Meter::new();

/// Counters of the prediction loop.
#[derive(Default)]
pub struct Meter {
    frames: AtomicU64,
    predicted_frames: AtomicU64,
    failed_frames: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            frames: AtomicU64::new(0),
            predicted_frames: AtomicU64::new(0),
            failed_frames: AtomicU64::new(0),
        }
    }

    pub fn tick_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_predicted(&self) {
        self.predicted_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.failed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_frames(&self) -> u64 {
        self.frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_predicted(&self) -> u64 {
        self.predicted_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_failed(&self) -> u64 {
        self.failed_frames.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = log_interval.tick() => {}
            }

            let frames = METER.get_reset_frames();
            let predicted = METER.get_reset_predicted();
            let failed = METER.get_reset_failed();
            let elapsed = start.elapsed().as_secs_f32();

            if frames > 0 {
                log::info!(
                    "Frames per second: {:.2}, predicted: {:.2}",
                    frames as f32 / elapsed,
                    predicted as f32 / elapsed
                );
            }
            if failed > 0 {
                log::warn!("{failed} frames failed in the last {elapsed:.1}s");
            }
        }
    })
}
