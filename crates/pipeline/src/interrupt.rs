//! Barge-in detection
//!
//! Adaptive-baseline energy thresholding over the inbound frame stream while
//! the agent is speaking. The detector is owned and driven by the intake
//! task; it holds no locks and takes explicit timestamps so behaviour is a
//! pure function of the frame sequence.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Detector tuning, configuration-driven
#[derive(Debug, Clone)]
pub struct InterruptConfig {
    /// Master on/off (the per-agent override gates the caller)
    pub enabled: bool,
    /// Absolute energy floor for "loud enough"
    pub min_energy: i32,
    /// Multiplicative factor over the rolling baseline
    pub baseline_factor: f32,
    /// Sustained speech required before triggering
    pub min_speech: Duration,
    /// Minimum gap between consecutive triggers
    pub debounce: Duration,
    /// High-energy samples out of the recent window required
    pub required_samples: usize,
    /// Window of recent high-energy samples kept
    pub window: usize,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_energy: 500,
            baseline_factor: 2.0,
            min_speech: Duration::from_millis(100),
            debounce: Duration::from_millis(300),
            required_samples: 2,
            window: 8,
        }
    }
}

/// Rolling energy statistics and trigger state
#[derive(Debug)]
pub struct InterruptDetector {
    config: InterruptConfig,
    /// Rolling noise-floor baseline
    baseline: f32,
    /// Recent above-threshold energies
    high_window: VecDeque<i32>,
    /// When energy first exceeded the threshold in the current burst
    speech_start_at: Option<Instant>,
    /// Last trigger, for debounce
    last_interrupt_at: Option<Instant>,
    /// Latched after firing; re-armed when the agent starts a new response
    fired: bool,
}

const BASELINE_FLOOR: f32 = 50.0;

impl InterruptDetector {
    pub fn new(config: InterruptConfig) -> Self {
        let baseline = (config.min_energy as f32 * 0.5).max(BASELINE_FLOOR);
        Self {
            config,
            baseline,
            high_window: VecDeque::new(),
            speech_start_at: None,
            last_interrupt_at: None,
            fired: false,
        }
    }

    /// Update the rolling noise floor; call only while the agent is silent
    pub fn update_baseline(&mut self, energy: i32) {
        self.baseline = (self.baseline * 0.95 + energy as f32 * 0.05).max(BASELINE_FLOOR);
    }

    /// Current noise-floor estimate
    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Effective trigger threshold for the current baseline
    pub fn threshold(&self) -> f32 {
        (self.config.min_energy as f32).max(self.baseline * self.config.baseline_factor)
    }

    /// Re-arm for a new agent response
    pub fn rearm(&mut self) {
        self.fired = false;
        self.high_window.clear();
        self.speech_start_at = None;
    }

    /// Whether the detector already fired for the current response
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Feed one frame's energy while the agent is speaking
    ///
    /// Returns true exactly when the barge-in should fire. Callers check the
    /// phase and enablement before calling.
    pub fn on_frame(&mut self, energy: i32, now: Instant) -> bool {
        if !self.config.enabled || self.fired {
            return false;
        }

        let threshold = self.threshold();
        if (energy as f32) <= threshold {
            // Energy dropped, the burst is over
            self.high_window.clear();
            self.speech_start_at = None;
            return false;
        }

        self.high_window.push_back(energy);
        if self.high_window.len() > self.config.window {
            self.high_window.pop_front();
        }
        let speech_start = *self.speech_start_at.get_or_insert(now);

        let n = self.config.required_samples.max(1);
        if self.high_window.len() < n {
            return false;
        }
        let sustained = self
            .high_window
            .iter()
            .rev()
            .take(n)
            .all(|&e| (e as f32) > threshold);
        if !sustained {
            return false;
        }

        if now.duration_since(speech_start) < self.config.min_speech {
            return false;
        }

        if let Some(last) = self.last_interrupt_at {
            if now.duration_since(last) < self.config.debounce {
                return false;
            }
        }

        self.last_interrupt_at = Some(now);
        self.fired = true;
        self.high_window.clear();
        self.speech_start_at = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> InterruptDetector {
        InterruptDetector::new(InterruptConfig::default())
    }

    fn drive_to_fire(det: &mut InterruptDetector, energy: i32, start: Instant) -> Option<u32> {
        for i in 0..50 {
            let now = start + Duration::from_millis(20 * i as u64);
            if det.on_frame(energy, now) {
                return Some(i);
            }
        }
        None
    }

    #[test]
    fn test_baseline_convergence() {
        let mut det = detector();
        // Constant signal while the agent is silent converges within 100 frames
        for _ in 0..100 {
            det.update_baseline(800);
        }
        assert!((det.baseline() - 800.0).abs() / 800.0 < 0.05);
    }

    #[test]
    fn test_baseline_floor() {
        let mut det = detector();
        for _ in 0..200 {
            det.update_baseline(0);
        }
        assert_eq!(det.baseline(), 50.0);
    }

    #[test]
    fn test_threshold_uses_absolute_floor() {
        let det = detector();
        // Fresh baseline (250) times factor is below the absolute floor
        assert_eq!(det.threshold(), 500.0);
    }

    #[test]
    fn test_fires_after_sustained_speech() {
        let mut det = detector();
        let t0 = Instant::now();
        let fired_at = drive_to_fire(&mut det, 900, t0).expect("should fire");
        // Needs required_samples high frames and 100ms from the first one
        assert!(fired_at >= 5);
        assert!(det.has_fired());
    }

    #[test]
    fn test_quiet_frames_never_fire() {
        let mut det = detector();
        let t0 = Instant::now();
        assert!(drive_to_fire(&mut det, 400, t0).is_none());
    }

    #[test]
    fn test_energy_drop_resets_burst() {
        let mut det = detector();
        let t0 = Instant::now();
        det.on_frame(900, t0);
        det.on_frame(900, t0 + Duration::from_millis(20));
        // Drop below threshold clears the window and start time
        det.on_frame(100, t0 + Duration::from_millis(40));
        // A single high frame right after cannot satisfy min_speech
        assert!(!det.on_frame(900, t0 + Duration::from_millis(60)));
        assert!(!det.on_frame(900, t0 + Duration::from_millis(80)));
    }

    #[test]
    fn test_fires_once_until_rearmed() {
        let mut det = detector();
        let t0 = Instant::now();
        drive_to_fire(&mut det, 900, t0).expect("should fire");
        // Latched: no further fire even with loud frames
        assert!(drive_to_fire(&mut det, 2000, t0 + Duration::from_secs(2)).is_none());
        det.rearm();
        assert!(drive_to_fire(&mut det, 2000, t0 + Duration::from_secs(4)).is_some());
    }

    #[test]
    fn test_debounce_boundary_no_double_fire() {
        let mut config = InterruptConfig::default();
        config.min_speech = Duration::ZERO;
        config.required_samples = 1;
        let mut det = InterruptDetector::new(config);

        let t0 = Instant::now();
        assert!(det.on_frame(900, t0));
        det.rearm();
        // Exactly on the debounce boundary is allowed; one tick before is not
        assert!(!det.on_frame(900, t0 + Duration::from_millis(299)));
        assert!(det.on_frame(900, t0 + Duration::from_millis(300)));
    }

    #[test]
    fn test_disabled_never_fires() {
        let mut config = InterruptConfig::default();
        config.enabled = false;
        let mut det = InterruptDetector::new(config);
        assert!(drive_to_fire(&mut det, 3000, Instant::now()).is_none());
    }
}
