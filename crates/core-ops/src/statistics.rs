//! Per-job statistics: two progress timelines and pause-aware timing.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::progress::{Progress, TimePoint};

/// Which counter drives the user-visible percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Bytes,
    Items,
}

#[derive(Default)]
struct Timing {
    start: Option<Instant>,
    pause: Option<Instant>,
    slept: Duration,
    final_duration: Duration,
}

pub struct Statistics {
    is_timing: AtomicBool,
    pause_count: AtomicI32,
    timing: Mutex<Timing>,
    preferred_source: Mutex<SourceType>,
    bytes: Progress,
    items: Progress,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            is_timing: AtomicBool::new(false),
            pause_count: AtomicI32::new(0),
            timing: Mutex::new(Timing::default()),
            preferred_source: Mutex::new(SourceType::Bytes),
            bytes: Progress::new(),
            items: Progress::new(),
        }
    }

    fn timeline(&self, source: SourceType) -> &Progress {
        match source {
            SourceType::Bytes => &self.bytes,
            SourceType::Items => &self.items,
        }
    }

    pub fn start_timing(&self) {
        if !self.is_timing.swap(true, Ordering::SeqCst) {
            let mut timing = self.timing.lock().unwrap();
            timing.start = Some(Instant::now());
            self.bytes.setup_timing();
            self.items.setup_timing();
        }
    }

    /// Pause is re-entrant: only the first increment records the pause
    /// point, only the last decrement accounts the slept interval.
    pub fn pause_timing(&self) {
        if self.pause_count.fetch_add(1, Ordering::SeqCst) == 0 {
            self.timing.lock().unwrap().pause = Some(Instant::now());
        }
    }

    pub fn resume_timing(&self) {
        if self.pause_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            let mut timing = self.timing.lock().unwrap();
            if let Some(pause) = timing.pause.take() {
                let dt = pause.elapsed();
                timing.slept += dt;
                self.bytes.report_slept_delta(dt);
                self.items.report_slept_delta(dt);
            }
        }
    }

    pub fn stop_timing(&self) {
        if self.is_timing.swap(false, Ordering::SeqCst) {
            let mut timing = self.timing.lock().unwrap();
            let Some(start) = timing.start else { return };
            let end = if self.pause_count.load(Ordering::SeqCst) > 0 {
                timing.pause.unwrap_or_else(Instant::now)
            } else {
                Instant::now()
            };
            timing.final_duration = end.duration_since(start).saturating_sub(timing.slept);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_count.load(Ordering::SeqCst) > 0
    }

    /// Wall time spent working: excludes slept intervals, frozen after
    /// `stop_timing`.
    pub fn elapsed_time(&self) -> Duration {
        let timing = self.timing.lock().unwrap();
        if self.is_timing.load(Ordering::SeqCst) {
            let Some(start) = timing.start else {
                return Duration::ZERO;
            };
            let end = if self.pause_count.load(Ordering::SeqCst) > 0 {
                timing.pause.unwrap_or_else(Instant::now)
            } else {
                Instant::now()
            };
            end.duration_since(start).saturating_sub(timing.slept)
        } else {
            timing.final_duration
        }
    }

    pub fn preferred_source(&self) -> SourceType {
        *self.preferred_source.lock().unwrap()
    }

    pub fn set_preferred_source(&self, source: SourceType) {
        *self.preferred_source.lock().unwrap() = source;
    }

    pub fn commit_estimated(&self, source: SourceType, delta: u64) {
        self.timeline(source).commit_estimated(delta);
    }

    pub fn commit_processed(&self, source: SourceType, delta: u64) {
        self.timeline(source).commit_processed(delta);
    }

    pub fn commit_skipped(&self, source: SourceType, delta: u64) {
        self.timeline(source).commit_skipped(delta);
    }

    pub fn done_fraction(&self, source: SourceType) -> f64 {
        self.timeline(source).done_fraction()
    }

    pub fn eta(&self, source: SourceType) -> Option<Duration> {
        self.timeline(source).eta()
    }

    pub fn volume_total(&self, source: SourceType) -> u64 {
        self.timeline(source).volume_total()
    }

    pub fn volume_processed(&self, source: SourceType) -> u64 {
        self.timeline(source).volume_processed()
    }

    pub fn speed_per_second_direct(&self, source: SourceType) -> f64 {
        self.timeline(source).volume_per_second_direct()
    }

    pub fn speed_per_second_average(&self, source: SourceType) -> f64 {
        self.timeline(source).volume_per_second_average()
    }

    pub fn bytes_per_second(&self) -> Vec<TimePoint> {
        self.bytes.data()
    }
}

/// RAII guard pausing the statistics clock for the guarded region, used
/// around dialog waits so UI time is not billed to the job.
pub struct TimingPauser<'s> {
    stats: &'s Statistics,
}

impl<'s> TimingPauser<'s> {
    pub fn new(stats: &'s Statistics) -> Self {
        stats.pause_timing();
        Self { stats }
    }
}

impl Drop for TimingPauser<'_> {
    fn drop(&mut self) {
        self.stats.resume_timing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_route_to_the_selected_timeline() {
        let stats = Statistics::new();
        stats.start_timing();
        stats.commit_estimated(SourceType::Bytes, 1000);
        stats.commit_estimated(SourceType::Items, 3);
        stats.commit_processed(SourceType::Items, 1);
        assert_eq!(stats.volume_total(SourceType::Bytes), 1000);
        assert_eq!(stats.volume_total(SourceType::Items), 3);
        assert_eq!(stats.volume_processed(SourceType::Items), 1);
        assert_eq!(stats.volume_processed(SourceType::Bytes), 0);
    }

    #[test]
    fn pause_is_reentrant() {
        let stats = Statistics::new();
        stats.start_timing();
        stats.pause_timing();
        stats.pause_timing();
        assert!(stats.is_paused());
        stats.resume_timing();
        assert!(stats.is_paused());
        stats.resume_timing();
        assert!(!stats.is_paused());
    }

    #[test]
    fn elapsed_time_excludes_slept_interval() {
        let stats = Statistics::new();
        stats.start_timing();
        std::thread::sleep(Duration::from_millis(5));
        stats.pause_timing();
        std::thread::sleep(Duration::from_millis(30));
        stats.resume_timing();
        stats.stop_timing();
        let elapsed = stats.elapsed_time();
        assert!(elapsed < Duration::from_millis(30), "elapsed = {elapsed:?}");
    }

    #[test]
    fn timing_pauser_guards_a_region() {
        let stats = Statistics::new();
        stats.start_timing();
        {
            let _pauser = TimingPauser::new(&stats);
            assert!(stats.is_paused());
        }
        assert!(!stats.is_paused());
    }

    #[test]
    fn elapsed_is_frozen_after_stop() {
        let stats = Statistics::new();
        stats.start_timing();
        std::thread::sleep(Duration::from_millis(5));
        stats.stop_timing();
        let first = stats.elapsed_time();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(first, stats.elapsed_time());
    }
}
