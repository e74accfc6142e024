//! Gain primitives.
//!
//! - [`GainRamp`]: per-voice gain on the audio thread, either held or moving
//!   linearly toward a target over a fixed number of frames.
//! - [`SmoothedGain`]: the master bus gain, a one-pole smoother so level
//!   changes never step.
//! - [`GainTimeline`]: the host-side model of a voice's gain schedule, used
//!   to read the current value of a ramp that is in progress.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    value: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl GainRamp {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jumps to `value`, discarding any ramp in progress.
    pub fn set(&mut self, value: f32) {
        *self = Self::new(value);
    }

    /// Ramps linearly from `from` to `target` over `frames` frames.
    pub fn ramp(&mut self, from: f32, target: f32, frames: u32) {
        if frames == 0 {
            self.set(target);
            return;
        }

        self.value = from;
        self.target = target;
        self.step = (target - from) / frames as f32;
        self.remaining = frames;
    }

    /// Returns the gain for the current frame and advances one frame.
    pub fn next_gain(&mut self) -> f32 {
        let current = self.value;
        if self.remaining > 0 {
            self.remaining -= 1;
            self.value = if self.remaining == 0 {
                self.target
            } else {
                self.value + self.step
            };
        }
        current
    }

    #[cfg(test)]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

/// One-pole exponential smoother toward a target level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedGain {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedGain {
    /// `time_constant_s` is the time to cover ~63% of a change.
    pub fn new(initial: f32, sample_rate: u32, time_constant_s: f32) -> Self {
        let frames = (time_constant_s * sample_rate as f32).max(1.0);
        Self {
            current: initial,
            target: initial,
            coeff: 1.0 - (-1.0 / frames).exp(),
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    #[cfg(test)]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[cfg(test)]
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn next_gain(&mut self) -> f32 {
        let delta = self.target - self.current;
        if delta.abs() < 1e-6 {
            self.current = self.target;
        } else {
            self.current += delta * self.coeff;
        }
        self.current
    }
}

/// Host-side gain schedule: a held value, or a linear ramp between two
/// instants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainTimeline {
    from: f32,
    to: f32,
    start: Instant,
    end: Instant,
}

impl GainTimeline {
    pub fn hold(value: f32, now: Instant) -> Self {
        Self {
            from: value,
            to: value,
            start: now,
            end: now,
        }
    }

    /// Value of the schedule at `now`.
    pub fn value_at(&self, now: Instant) -> f32 {
        if now >= self.end {
            return self.to;
        }
        if now <= self.start {
            return self.from;
        }

        let span = self.end.duration_since(self.start).as_secs_f32();
        let t = now.duration_since(self.start).as_secs_f32() / span;
        self.from + (self.to - self.from) * t
    }

    /// Replaces the schedule with a ramp from the value at `now` to `target`,
    /// arriving at `end`. Returns the starting value.
    pub fn ramp_to(&mut self, target: f32, now: Instant, end: Instant) -> f32 {
        let from = self.value_at(now);
        *self = Self {
            from,
            to: target,
            start: now,
            end: end.max(now),
        };
        from
    }

    /// Freezes the schedule at its value at `now`.
    pub fn cancel(&mut self, now: Instant) {
        *self = Self::hold(self.value_at(now), now);
    }

    #[cfg(test)]
    pub fn is_ramping(&self, now: Instant) -> bool {
        now < self.end && self.from != self.to
    }
}
