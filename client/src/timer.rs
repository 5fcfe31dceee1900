//! Tick-driven timers. Every wait in the simulation (stun, silence, burst
//! spacing, beam ticks, regeneration) is one of these values stored on the
//! entity that owns it and advanced once per tick.

/// One-shot countdown. Idle when nothing remains.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Countdown {
    remaining: f32,
}

impl Countdown {
    pub fn idle() -> Self {
        Self { remaining: 0.0 }
    }

    pub fn start(duration: f32) -> Self {
        Self {
            remaining: duration.max(0.0),
        }
    }

    pub fn restart(&mut self, duration: f32) {
        self.remaining = duration.max(0.0);
    }

    pub fn cancel(&mut self) {
        self.remaining = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.remaining > 0.0
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Advances the countdown and returns true on the tick it reaches zero.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.remaining <= 0.0 {
            return false;
        }
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            self.remaining = 0.0;
            true
        } else {
            false
        }
    }
}

/// Fires once every `period` seconds of accumulated tick time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repeating {
    period: f32,
    elapsed: f32,
}

impl Repeating {
    pub fn new(period: f32) -> Self {
        Self {
            period: period.max(f32::EPSILON),
            elapsed: 0.0,
        }
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }

    /// Returns how many periods completed during this tick.
    pub fn tick(&mut self, dt: f32) -> u32 {
        self.elapsed += dt.max(0.0);
        let mut fired = 0;
        while self.elapsed >= self.period {
            self.elapsed -= self.period;
            fired += 1;
        }
        fired
    }
}
