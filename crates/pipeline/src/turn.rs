//! Turn assembly from streaming recognition events
//!
//! Partials keep the buffer warm before the first final; finals append or
//! replace depending on terminal punctuation. A periodic gate decides when
//! the utterance is complete. Methods take explicit timestamps so that a
//! recorded event sequence fires at one deterministic instant.

use std::time::{Duration, Instant};

/// End-of-turn gate configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Silence required after the last recognition event
    pub silence_threshold: Duration,
    /// Dispatch on long-enough partials without waiting for a final
    pub interim_enabled: bool,
    /// Minimum characters in the partial to take the fast path
    pub interim_min_length: usize,
    /// Silence threshold used on the fast path
    pub interim_silence: Duration,
    /// Guard against a new partial arriving mid-gate
    pub partial_gap: Duration,
    /// Utterances shorter than this never dispatch
    pub min_utterance_chars: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(800),
            interim_enabled: false,
            interim_min_length: 5,
            interim_silence: Duration::from_millis(50),
            partial_gap: Duration::from_millis(300),
            min_utterance_chars: 3,
        }
    }
}

/// Mutable partial transcript under assembly
#[derive(Debug)]
pub struct TurnAssembler {
    config: GateConfig,
    text: String,
    is_final: bool,
    last_speech_at: Option<Instant>,
    last_partial_at: Option<Instant>,
}

fn ends_terminal(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.') | Some('!') | Some('?'))
}

impl TurnAssembler {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            text: String::new(),
            is_final: false,
            last_speech_at: None,
            last_partial_at: None,
        }
    }

    /// Record a partial recognition event
    pub fn on_partial(&mut self, text: &str, now: Instant) {
        if text.trim().is_empty() {
            return;
        }
        self.last_speech_at = Some(now);
        self.last_partial_at = Some(now);
        // Keep the buffer non-empty before the first final; once a final is
        // latched, partials no longer overwrite it
        if self.text.is_empty() || !self.is_final {
            self.text = text.to_string();
        }
    }

    /// Record a final recognition event
    pub fn on_final(&mut self, text: &str, now: Instant) {
        if text.trim().is_empty() {
            return;
        }
        self.last_speech_at = Some(now);
        if !self.text.trim().is_empty() && !ends_terminal(&self.text) && self.is_final {
            self.text.push(' ');
            self.text.push_str(text);
        } else {
            self.text = text.to_string();
        }
        self.is_final = true;
    }

    /// Check the end-of-turn gate; on fire, return the utterance and reset
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let trimmed = self.text.trim();
        if trimmed.len() < self.config.min_utterance_chars {
            return None;
        }

        let fast_path = self.config.interim_enabled
            && !self.is_final
            && trimmed.len() >= self.config.interim_min_length;

        if !self.is_final && !fast_path {
            return None;
        }

        let last_speech = self.last_speech_at?;
        let threshold = if fast_path {
            self.config.interim_silence
        } else {
            self.config.silence_threshold
        };
        if now.duration_since(last_speech) < threshold {
            return None;
        }

        // On the final path a recent partial means the user is still adding;
        // on the fast path the silence check above already covers it
        if !fast_path {
            if let Some(last_partial) = self.last_partial_at {
                if now.duration_since(last_partial) < self.config.partial_gap {
                    return None;
                }
            }
        }

        let utterance = trimmed.to_string();
        self.reset();
        Some(utterance)
    }

    /// Reset atomically at the start of a listening phase
    pub fn reset(&mut self) {
        self.text.clear();
        self.is_final = false;
        self.last_speech_at = None;
        self.last_partial_at = None;
    }

    /// Current buffer text (for interrupt-requires-text style checks)
    pub fn buffered_text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn assembler() -> TurnAssembler {
        TurnAssembler::new(GateConfig::default())
    }

    #[test]
    fn test_partial_keeps_buffer_warm() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_partial("hello", t0);
        assert_eq!(asm.buffered_text(), "hello");
        asm.on_partial("hello there", t0 + ms(100));
        assert_eq!(asm.buffered_text(), "hello there");
    }

    #[test]
    fn test_final_appends_without_terminal_punctuation() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_final("I would like to", t0);
        asm.on_final("book an appointment", t0 + ms(400));
        assert_eq!(asm.buffered_text(), "I would like to book an appointment");
    }

    #[test]
    fn test_final_replaces_after_terminal_punctuation() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_final("That is all.", t0);
        asm.on_final("One more thing", t0 + ms(400));
        assert_eq!(asm.buffered_text(), "One more thing");
    }

    #[test]
    fn test_final_replaces_stale_partial() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_partial("hello", t0);
        asm.on_final("hello there", t0 + ms(200));
        assert_eq!(asm.buffered_text(), "hello there");
    }

    #[test]
    fn test_gate_waits_for_silence() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_final("what services do you provide", t0);
        assert!(asm.poll(t0 + ms(500)).is_none());
        assert_eq!(
            asm.poll(t0 + ms(800)).as_deref(),
            Some("what services do you provide")
        );
        // Buffer reset after firing
        assert!(asm.poll(t0 + ms(2000)).is_none());
    }

    #[test]
    fn test_gate_blocked_by_recent_partial() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_final("hello there", t0);
        // A fresh partial within the gap holds the gate even after silence
        asm.on_partial("hello there and", t0 + ms(700));
        assert!(asm.poll(t0 + ms(900)).is_none());
    }

    #[test]
    fn test_stt_flap_fires_once() {
        // partial "hello", 200ms gap, final "hello there", then silence
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_partial("hello", t0);
        asm.on_final("hello there", t0 + ms(200));

        let mut fired = Vec::new();
        for i in 0..40 {
            if let Some(u) = asm.poll(t0 + ms(200 + i * 50)) {
                fired.push((i, u));
            }
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, "hello there");
    }

    #[test]
    fn test_deterministic_fire_instant() {
        // The same recorded event sequence fires at one unique instant
        // regardless of polling cadence: final at 150ms + 800ms silence = 950ms
        let run = |poll_step: u64| -> u64 {
            let mut asm = assembler();
            let t0 = Instant::now();
            asm.on_partial("what time", t0);
            asm.on_final("what time do you open", t0 + ms(150));
            let mut t = 150;
            loop {
                t += poll_step;
                if asm.poll(t0 + ms(t)).is_some() {
                    return t;
                }
                assert!(t < 10_000, "never fired");
            }
        };
        assert_eq!(run(50), 950);
        assert_eq!(run(10), 950);
    }

    #[test]
    fn test_empty_final_never_dispatches() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_final("", t0);
        asm.on_final("   ", t0 + ms(10));
        assert!(asm.poll(t0 + ms(5000)).is_none());
    }

    #[test]
    fn test_short_utterance_never_dispatches() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.on_final("ok", t0);
        assert!(asm.poll(t0 + ms(5000)).is_none());
    }

    #[test]
    fn test_fast_path_fires_on_long_partial() {
        let config = GateConfig {
            interim_enabled: true,
            interim_min_length: 8,
            interim_silence: Duration::from_millis(50),
            ..Default::default()
        };
        let mut asm = TurnAssembler::new(config);
        let t0 = Instant::now();
        asm.on_partial("I want to schedule a meeting", t0);
        assert!(asm.poll(t0 + ms(30)).is_none());
        assert_eq!(
            asm.poll(t0 + ms(50)).as_deref(),
            Some("I want to schedule a meeting")
        );
    }

    #[test]
    fn test_fast_path_short_partial_does_not_fire() {
        let config = GateConfig {
            interim_enabled: true,
            interim_min_length: 8,
            ..Default::default()
        };
        let mut asm = TurnAssembler::new(config);
        let t0 = Instant::now();
        asm.on_partial("yes ok", t0);
        assert!(asm.poll(t0 + ms(5000)).is_none());
    }
}
