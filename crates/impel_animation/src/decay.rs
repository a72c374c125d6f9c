//! Exponential velocity decay
//!
//! Momentum-style animation: a value coasts from an initial velocity and
//! decelerates exponentially until its speed drops below the settling
//! threshold. The rest position is known analytically up front, which the
//! engine uses as the curve's canonical end value.

use impel_core::AnimValue;

/// Speed must fall below `threshold * VELOCITY_SCALE` before the decay is
/// considered settled.
const VELOCITY_SCALE: f32 = 5.0;

/// Configuration for a decay curve
#[derive(Clone, Copy, Debug)]
pub struct DecayConfig {
    /// Per-millisecond velocity retention factor, in (0, 1)
    pub deceleration: f32,
}

impl DecayConfig {
    pub fn new(deceleration: f32) -> Self {
        debug_assert!(deceleration > 0.0 && deceleration < 1.0);
        Self { deceleration }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        // Matches the customary scroll-view deceleration rate
        Self {
            deceleration: 0.998,
        }
    }
}

/// A vector-valued decay integrator
#[derive(Clone, Debug)]
pub struct Decay {
    config: DecayConfig,
    value: AnimValue,
    velocity: AnimValue,
}

impl Decay {
    pub fn new(config: DecayConfig, initial: AnimValue, velocity: AnimValue) -> Self {
        debug_assert_eq!(initial.len(), velocity.len());
        Self {
            config,
            value: initial,
            velocity,
        }
    }

    pub fn value(&self) -> &AnimValue {
        &self.value
    }

    pub fn velocity(&self) -> &AnimValue {
        &self.velocity
    }

    /// The rest position the decay converges to: x + v / (-1000 ln d)
    pub fn projected_destination(&self) -> AnimValue {
        let rate = 1000.0 * self.config.deceleration.ln();
        self.value.add(&self.velocity.scale(-1.0 / rate))
    }

    /// True once the remaining speed is imperceptible
    pub fn is_settled(&self, threshold: f32) -> bool {
        self.velocity.max_abs() < threshold * VELOCITY_SCALE
    }

    /// Advance by `dt` seconds using the closed-form integral of the
    /// exponential velocity curve
    pub fn step(&mut self, dt: f32, threshold: f32) {
        if self.is_settled(threshold) {
            self.velocity = AnimValue::zero(self.velocity.len());
            return;
        }

        let rate = 1000.0 * self.config.deceleration.ln();
        let factor = (rate * dt).exp();
        // ∫ v·d^(1000τ) dτ over the frame
        self.value = self.value.add(&self.velocity.scale((factor - 1.0) / rate));
        self.velocity = self.velocity.scale(factor);
    }
}
