//! # Emitter Lifecycle Phases
//!
//! Every emitter instance walks a small state machine:
//!
//! ```text
//! Idle -> Spawning -> Looping -> Finishing -> Dead
//!              \________________^
//! ```
//!
//! - `Idle -> Spawning` on activation
//! - `Spawning -> Looping` when the authored duration completes and the
//!   emitter loops; `-> Finishing` otherwise
//! - `Looping/Spawning -> Finishing` when a stop is requested
//! - `Finishing -> Dead` once no particles are live and no spawns are
//!   scheduled. Dead is terminal; the group is reclaimed only then.
//!
//! Emission carries a fractional accumulator across frames so that
//! non-integer spawn rates do not bias long-run totals.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of an emitter instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterPhase {
    /// Created but not yet activated.
    Idle,
    /// Emitting over the authored duration (burst fires on entry).
    Spawning,
    /// Emitting indefinitely until a stop is requested.
    Looping,
    /// No new emission; draining live particles.
    Finishing,
    /// Terminal. Safe to reclaim.
    Dead,
}

/// Authored emission timing for one emitter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterTiming {
    /// Length of the Spawning phase in seconds. Zero means burst-only.
    pub duration: f32,
    /// Whether the emitter enters Looping after Spawning completes.
    pub looping: bool,
    /// Continuous emission rate in particles per second.
    pub rate: f32,
    /// One-shot particle count fired on entering Spawning.
    pub burst: u32,
}

impl Default for EmitterTiming {
    fn default() -> Self {
        Self {
            duration: 1.0,
            looping: false,
            rate: 10.0,
            burst: 0,
        }
    }
}

/// Drives one emitter's phase and emission schedule.
#[derive(Clone, Debug)]
pub struct PhaseMachine {
    timing: EmitterTiming,
    phase: EmitterPhase,
    elapsed: f32,
    accumulator: f32,
    pending_spawns: u32,
    burst_pending: bool,
    stop_requested: bool,
}

impl PhaseMachine {
    /// Creates an idle machine with the given timing.
    #[must_use]
    pub fn new(timing: EmitterTiming) -> Self {
        Self {
            timing,
            phase: EmitterPhase::Idle,
            elapsed: 0.0,
            accumulator: 0.0,
            pending_spawns: 0,
            burst_pending: false,
            stop_requested: false,
        }
    }

    /// Current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> EmitterPhase {
        self.phase
    }

    /// True once the terminal phase is reached.
    #[inline]
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.phase == EmitterPhase::Dead
    }

    /// Activates an idle emitter. No-op in any other phase.
    pub fn activate(&mut self) {
        if self.phase == EmitterPhase::Idle {
            self.phase = EmitterPhase::Spawning;
            self.elapsed = 0.0;
            self.burst_pending = self.timing.burst > 0;
        }
    }

    /// Advances the machine by `dt`. Returns true if the phase changed.
    ///
    /// `live_particles` is the group's current live count; Finishing
    /// only collapses to Dead once it reaches zero and nothing is
    /// scheduled to spawn.
    pub fn advance(&mut self, dt: f32, live_particles: usize) -> bool {
        let before = self.phase;
        match self.phase {
            EmitterPhase::Idle | EmitterPhase::Dead => {}
            EmitterPhase::Spawning => {
                // Only the part of the step inside the authored
                // duration earns emission; a large dt crossing the
                // boundary must not over-emit.
                let emit_dt = dt.min((self.timing.duration - self.elapsed).max(0.0));
                self.accumulate_emission(emit_dt);
                self.elapsed += dt;
                if self.elapsed >= self.timing.duration {
                    self.phase = if self.timing.looping && !self.stop_requested {
                        EmitterPhase::Looping
                    } else {
                        EmitterPhase::Finishing
                    };
                }
            }
            EmitterPhase::Looping => {
                self.accumulate_emission(dt);
                if self.stop_requested {
                    self.phase = EmitterPhase::Finishing;
                }
            }
            EmitterPhase::Finishing => {
                if live_particles == 0 && self.pending_spawns == 0 {
                    self.phase = EmitterPhase::Dead;
                }
            }
        }
        self.phase != before
    }

    /// Requests a stop.
    ///
    /// Immediate stops force Finishing and cancel every scheduled
    /// spawn; graceful stops let the current duration or loop drain
    /// naturally.
    pub fn request_stop(&mut self, immediate: bool) {
        if self.phase == EmitterPhase::Dead {
            return;
        }
        self.stop_requested = true;
        if immediate {
            self.pending_spawns = 0;
            self.accumulator = 0.0;
            self.burst_pending = false;
            self.phase = EmitterPhase::Finishing;
        }
    }

    /// Takes the spawn count scheduled by the last `advance`.
    ///
    /// The group consumes this during its update pass; the counter
    /// resets to zero.
    pub fn take_pending_spawns(&mut self) -> u32 {
        std::mem::take(&mut self.pending_spawns)
    }

    /// Adds this frame's emission, carrying the fractional remainder.
    fn accumulate_emission(&mut self, dt: f32) {
        if self.burst_pending {
            self.pending_spawns += self.timing.burst;
            self.burst_pending = false;
        }
        self.accumulator += self.timing.rate.max(0.0) * dt;
        let whole = self.accumulator.floor();
        self.pending_spawns += whole as u32;
        self.accumulator -= whole;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(timing: EmitterTiming) -> PhaseMachine {
        let mut m = PhaseMachine::new(timing);
        m.activate();
        m
    }

    #[test]
    fn test_idle_until_activated() {
        let mut m = PhaseMachine::new(EmitterTiming::default());
        assert_eq!(m.phase(), EmitterPhase::Idle);
        assert!(!m.advance(1.0, 0));
        m.activate();
        assert_eq!(m.phase(), EmitterPhase::Spawning);
    }

    #[test]
    fn test_fractional_rate_carries_remainder() {
        // 2.5 particles/second for exactly 2 seconds at 1-second steps
        // must spawn exactly 5 - not 4, not 6.
        let mut m = machine(EmitterTiming {
            duration: 2.0,
            looping: false,
            rate: 2.5,
            burst: 0,
        });
        let mut total = 0;
        for _ in 0..2 {
            let _ = m.advance(1.0, 0);
            total += m.take_pending_spawns();
        }
        assert_eq!(total, 5);
    }

    #[test]
    fn test_large_step_emission_clamped_to_duration() {
        // duration 1.0 at 10.0/s: a single 10-second step must credit
        // exactly one second of emission, not ten.
        let mut m = machine(EmitterTiming {
            duration: 1.0,
            looping: false,
            rate: 10.0,
            burst: 0,
        });
        assert!(m.advance(10.0, 0));
        assert_eq!(m.phase(), EmitterPhase::Finishing);
        assert_eq!(m.take_pending_spawns(), 10);

        // Partial steps across the boundary add up the same way.
        let mut m = machine(EmitterTiming {
            duration: 1.0,
            looping: false,
            rate: 10.0,
            burst: 0,
        });
        let _ = m.advance(0.6, 0);
        let _ = m.advance(0.6, 0);
        let mut total = m.take_pending_spawns();
        let _ = m.advance(0.6, 0);
        total += m.take_pending_spawns();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_non_looping_finishes_after_duration() {
        let mut m = machine(EmitterTiming {
            duration: 1.0,
            looping: false,
            rate: 0.0,
            burst: 0,
        });
        assert!(!m.advance(0.5, 0));
        assert!(m.advance(0.6, 0)); // crosses duration
        assert_eq!(m.phase(), EmitterPhase::Finishing);
        // Stays Finishing while particles are live
        assert!(!m.advance(0.1, 3));
        assert!(m.advance(0.1, 0));
        assert!(m.is_dead());
    }

    #[test]
    fn test_looping_until_stop() {
        let mut m = machine(EmitterTiming {
            duration: 0.5,
            looping: true,
            rate: 1.0,
            burst: 0,
        });
        let _ = m.advance(0.6, 0);
        assert_eq!(m.phase(), EmitterPhase::Looping);
        let _ = m.advance(10.0, 5);
        assert_eq!(m.phase(), EmitterPhase::Looping);

        m.request_stop(false);
        assert!(m.advance(0.1, 5));
        assert_eq!(m.phase(), EmitterPhase::Finishing);
    }

    #[test]
    fn test_immediate_stop_cancels_pending_spawns() {
        let mut m = machine(EmitterTiming {
            duration: 10.0,
            looping: false,
            rate: 100.0,
            burst: 50,
        });
        let _ = m.advance(0.1, 0);
        m.request_stop(true);
        assert_eq!(m.phase(), EmitterPhase::Finishing);
        assert_eq!(m.take_pending_spawns(), 0);
        assert!(m.advance(0.1, 0));
        assert!(m.is_dead());
    }

    #[test]
    fn test_burst_fires_once() {
        let mut m = machine(EmitterTiming {
            duration: 1.0,
            looping: false,
            rate: 0.0,
            burst: 32,
        });
        let _ = m.advance(0.1, 0);
        assert_eq!(m.take_pending_spawns(), 32);
        let _ = m.advance(0.1, 32);
        assert_eq!(m.take_pending_spawns(), 0);
    }

    #[test]
    fn test_dead_never_spawns() {
        let mut m = machine(EmitterTiming {
            duration: 0.0,
            looping: false,
            rate: 1000.0,
            burst: 0,
        });
        let _ = m.advance(0.1, 0);
        let _ = m.take_pending_spawns();
        let _ = m.advance(0.1, 0);
        assert!(m.is_dead());
        let _ = m.advance(1.0, 0);
        assert_eq!(m.take_pending_spawns(), 0);
        assert!(m.is_dead());
    }
}
