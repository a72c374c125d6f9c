//! Spring physics integration
//!
//! RK4-integrated spring physics for smooth, natural animations, operating
//! on vector values so every component of a property converges together.
//! Supports preset configurations and custom spring parameters.

use impel_core::AnimValue;

/// Velocity must fall below `threshold * VELOCITY_SCALE` before a spring is
/// considered settled.
const VELOCITY_SCALE: f32 = 10.0;

/// Configuration for a spring curve
#[derive(Clone, Copy, Debug)]
pub struct SpringConfig {
    pub stiffness: f32,
    pub damping: f32,
    pub mass: f32,
}

impl SpringConfig {
    /// Create a new spring configuration
    pub fn new(stiffness: f32, damping: f32, mass: f32) -> Self {
        Self {
            stiffness,
            damping,
            mass,
        }
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self {
            stiffness: 120.0,
            damping: 14.0,
            mass: 1.0,
        }
    }

    /// A wobbly spring with overshoot (good for playful UI)
    pub fn wobbly() -> Self {
        Self {
            stiffness: 180.0,
            damping: 12.0,
            mass: 1.0,
        }
    }

    /// A stiff, snappy spring (good for buttons)
    pub fn stiff() -> Self {
        Self {
            stiffness: 400.0,
            damping: 30.0,
            mass: 1.0,
        }
    }

    /// A very stiff spring with minimal oscillation (good for quick responses)
    pub fn snappy() -> Self {
        Self {
            stiffness: 600.0,
            damping: 40.0,
            mass: 1.0,
        }
    }

    /// Calculate critical damping for this spring's stiffness and mass
    pub fn critical_damping(&self) -> f32 {
        2.0 * (self.stiffness * self.mass).sqrt()
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        self.damping < self.critical_damping()
    }

    /// Check if the spring is overdamped (slow settling, no oscillation)
    pub fn is_overdamped(&self) -> bool {
        self.damping > self.critical_damping()
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::stiff()
    }
}

/// A vector-valued spring integrator
#[derive(Clone, Debug)]
pub struct Spring {
    config: SpringConfig,
    value: AnimValue,
    velocity: AnimValue,
    target: AnimValue,
}

impl Spring {
    pub fn new(config: SpringConfig, initial: AnimValue, target: AnimValue) -> Self {
        let velocity = AnimValue::zero(initial.len());
        Self {
            config,
            value: initial,
            velocity,
            target,
        }
    }

    pub fn value(&self) -> &AnimValue {
        &self.value
    }

    pub fn velocity(&self) -> &AnimValue {
        &self.velocity
    }

    pub fn target(&self) -> &AnimValue {
        &self.target
    }

    pub fn set_target(&mut self, target: AnimValue) {
        self.target = target;
    }

    /// Seed the spring with an initial velocity (interruption hand-off)
    pub fn set_velocity(&mut self, velocity: AnimValue) {
        debug_assert_eq!(velocity.len(), self.value.len());
        self.velocity = velocity;
    }

    /// Check if the spring has settled within `threshold` of its target with
    /// negligible velocity
    pub fn is_settled(&self, threshold: f32) -> bool {
        self.value.approx_eq(&self.target, threshold)
            && self.velocity.max_abs() < threshold * VELOCITY_SCALE
    }

    /// Step the spring simulation using RK4 integration
    pub fn step(&mut self, dt: f32, threshold: f32) {
        if self.is_settled(threshold) {
            self.value = self.target.clone();
            self.velocity = AnimValue::zero(self.value.len());
            return;
        }

        let mut values = Vec::with_capacity(self.value.len());
        let mut velocities = Vec::with_capacity(self.value.len());

        for i in 0..self.value.len() {
            let x = self.value.get(i);
            let v = self.velocity.get(i);
            let target = self.target.get(i);

            let k1_v = self.acceleration(x, v, target);
            let k1_x = v;

            let k2_v = self.acceleration(x + k1_x * dt * 0.5, v + k1_v * dt * 0.5, target);
            let k2_x = v + k1_v * dt * 0.5;

            let k3_v = self.acceleration(x + k2_x * dt * 0.5, v + k2_v * dt * 0.5, target);
            let k3_x = v + k2_v * dt * 0.5;

            let k4_v = self.acceleration(x + k3_x * dt, v + k3_v * dt, target);
            let k4_x = v + k3_v * dt;

            velocities.push(v + (k1_v + 2.0 * k2_v + 2.0 * k3_v + k4_v) * dt / 6.0);
            values.push(x + (k1_x + 2.0 * k2_x + 2.0 * k3_x + k4_x) * dt / 6.0);
        }

        self.value = AnimValue::new(&values);
        self.velocity = AnimValue::new(&velocities);
    }

    fn acceleration(&self, x: f32, v: f32, target: f32) -> f32 {
        let spring_force = -self.config.stiffness * (x - target);
        let damping_force = -self.config.damping * v;
        (spring_force + damping_force) / self.config.mass
    }
}
