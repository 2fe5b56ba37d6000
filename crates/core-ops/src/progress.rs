//! Dual-counter progress tracking with a per-second throughput timeline.
//!
//! `estimated` only grows (except for skip accounting) and `processed`
//! never exceeds it. The timeline splits each processed delta across
//! 1-second buckets of fractional occupancy so average speed can ignore
//! partially-filled buckets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One second (or a fraction of one) of transferred volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub value: f32,
    /// Occupied share of this bucket, (0..1].
    pub fraction: f32,
}

struct Timeline {
    base: Duration,
    last_commit: Duration,
    points: Vec<TimePoint>,
}

pub struct Progress {
    estimated: AtomicU64,
    processed: AtomicU64,
    origin: Instant,
    timeline: Mutex<Timeline>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            estimated: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            origin: Instant::now(),
            timeline: Mutex::new(Timeline {
                base: Duration::ZERO,
                last_commit: Duration::ZERO,
                points: Vec::new(),
            }),
        }
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Anchors the timeline at the current instant.
    pub fn setup_timing(&self) {
        let now = self.now();
        let mut tl = self.timeline.lock().unwrap();
        tl.base = now;
        tl.last_commit = now;
    }

    pub fn commit_estimated(&self, delta: u64) {
        self.estimated.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn commit_skipped(&self, delta: u64) {
        let processed = self.processed.load(Ordering::Relaxed);
        let estimated = self.estimated.load(Ordering::Relaxed);
        if delta + processed > estimated {
            tracing::warn!(
                target: "ops.progress",
                delta,
                processed,
                estimated,
                "suspicious_skip_amount"
            );
            self.estimated.store(processed, Ordering::Relaxed);
        } else {
            self.estimated.fetch_sub(delta, Ordering::Relaxed);
        }
    }

    pub fn commit_processed(&self, delta: u64) {
        let current = self.now();
        let mut tl = self.timeline.lock().unwrap();
        let delta_time = current.saturating_sub(tl.last_commit);
        tl.last_commit = current;
        self.processed.fetch_add(delta, Ordering::Relaxed);

        let fp_bytes = delta as f64;
        let fp_delta_time = delta_time.as_secs_f64();
        if fp_delta_time <= 0.0 {
            // instantaneous commit: credit the current partial bucket
            if let Some(last) = tl.points.last_mut() {
                last.value += fp_bytes as f32;
            } else {
                tl.points.push(TimePoint { value: fp_bytes as f32, fraction: f32::EPSILON });
            }
            return;
        }

        let mut left = fp_delta_time;
        if let Some(last) = tl.points.last_mut() {
            if last.fraction < 1.0 {
                let dt = (1.0 - f64::from(last.fraction)).min(left);
                let db = fp_bytes * dt / fp_delta_time;
                last.value += db as f32;
                last.fraction += dt as f32;
                left -= dt;
            }
        }
        while left > 0.0 {
            let dt = left.min(1.0);
            let db = fp_bytes * dt / fp_delta_time;
            left -= dt;
            tl.points.push(TimePoint { value: db as f32, fraction: dt as f32 });
        }
    }

    /// Shifts the timing anchors forward so paused time is excluded from
    /// rate computations.
    pub fn report_slept_delta(&self, delta: Duration) {
        let mut tl = self.timeline.lock().unwrap();
        tl.base += delta;
        tl.last_commit += delta;
    }

    /// processed / (last commit - base).
    pub fn volume_per_second_direct(&self) -> f64 {
        let processed = self.processed.load(Ordering::Relaxed);
        if processed == 0 {
            return 0.0;
        }
        let tl = self.timeline.lock().unwrap();
        let dt = tl.last_commit.saturating_sub(tl.base);
        if dt.is_zero() {
            return 0.0;
        }
        processed as f64 / dt.as_secs_f64()
    }

    /// Mean of value/fraction over buckets that are at least half full.
    pub fn volume_per_second_average(&self) -> f64 {
        const MIN_FRACTION: f32 = 0.5;
        let tl = self.timeline.lock().unwrap();
        let mut vps = 0.0f64;
        let mut n = 0;
        for point in &tl.points {
            if point.fraction >= MIN_FRACTION {
                vps += f64::from(point.value) / f64::from(point.fraction);
                n += 1;
            }
        }
        if n == 0 {
            return 0.0;
        }
        vps / f64::from(n)
    }

    pub fn volume_total(&self) -> u64 {
        self.estimated.load(Ordering::Relaxed)
    }

    pub fn volume_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn done_fraction(&self) -> f64 {
        let estimated = self.estimated.load(Ordering::Relaxed);
        let processed = self.processed.load(Ordering::Relaxed);
        if estimated == 0 || processed == 0 {
            return 0.0;
        }
        processed as f64 / estimated as f64
    }

    /// `None` when speed is zero, `Some(ZERO)` when already complete.
    pub fn eta(&self) -> Option<Duration> {
        let speed = self.volume_per_second_direct();
        if speed == 0.0 {
            return None;
        }
        let estimated = self.estimated.load(Ordering::Relaxed);
        let processed = self.processed.load(Ordering::Relaxed);
        if processed >= estimated {
            return Some(Duration::ZERO);
        }
        let left = (estimated - processed) as f64;
        Some(Duration::from_secs_f64(left / speed))
    }

    pub fn data(&self) -> Vec<TimePoint> {
        self.timeline.lock().unwrap().points.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_and_processed_accumulate() {
        let p = Progress::new();
        p.setup_timing();
        p.commit_estimated(100);
        p.commit_estimated(50);
        assert_eq!(p.volume_total(), 150);
        p.commit_processed(30);
        assert_eq!(p.volume_processed(), 30);
        assert!(p.volume_processed() <= p.volume_total());
        assert!((p.done_fraction() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn skipping_reduces_estimated() {
        let p = Progress::new();
        p.setup_timing();
        p.commit_estimated(100);
        p.commit_processed(10);
        p.commit_skipped(40);
        assert_eq!(p.volume_total(), 60);
    }

    #[test]
    fn oversized_skip_clamps_estimated_to_processed() {
        let p = Progress::new();
        p.setup_timing();
        p.commit_estimated(100);
        p.commit_processed(90);
        p.commit_skipped(50);
        assert_eq!(p.volume_total(), 90);
        assert!(p.done_fraction() <= 1.0);
    }

    #[test]
    fn eta_is_none_without_movement_and_zero_when_done() {
        let p = Progress::new();
        p.setup_timing();
        p.commit_estimated(10);
        assert_eq!(p.eta(), None);
        std::thread::sleep(Duration::from_millis(5));
        p.commit_processed(10);
        assert_eq!(p.eta(), Some(Duration::ZERO));
    }

    #[test]
    fn direct_speed_reflects_processed_volume() {
        let p = Progress::new();
        p.setup_timing();
        p.commit_estimated(1000);
        std::thread::sleep(Duration::from_millis(20));
        p.commit_processed(500);
        let speed = p.volume_per_second_direct();
        assert!(speed > 0.0);
    }

    #[test]
    fn slept_delta_excludes_paused_time_from_the_rate() {
        let p = Progress::new();
        p.setup_timing();
        p.commit_estimated(100);
        std::thread::sleep(Duration::from_millis(20));
        p.commit_processed(100);
        let before = p.volume_per_second_direct();
        // pretend 15 of those 20 milliseconds were spent paused
        p.report_slept_delta(Duration::from_millis(15));
        p.commit_processed(0);
        let after = p.volume_per_second_direct();
        assert!(after > before);
    }
}
