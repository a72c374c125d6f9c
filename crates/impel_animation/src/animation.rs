//! Property animation state machine
//!
//! An [`Animation`] binds a curve (tween, spring, decay, custom, or group)
//! to a target property and owns all per-animation progress state. The
//! animator drives it through a fixed contract: `start_if_needed` →
//! `advance_time` → `apply_value` → completion handling. Every method locks
//! the animation's own state only for the structural change; user callouts
//! (completion, apply, trace sink) always run with no lock held.

use std::fmt;
use std::sync::{Arc, Mutex};

use impel_core::{resolve_property, AnimValue, Animatable, Property};

use crate::decay::{Decay, DecayConfig};
use crate::easing::Easing;
use crate::spring::{Spring, SpringConfig};

/// Default settling threshold when no property is bound.
const DEFAULT_THRESHOLD: f32 = 0.01;

/// Frames longer than this are clamped before physics integration, so a
/// stalled clock cannot destabilize the integrators.
const MAX_FRAME_INTERVAL: f32 = 0.1;

/// Shared handle to an animation; the registry entry and the scheduling item
/// jointly reference it.
pub type AnimationHandle = Arc<Animation>;

/// Completion callout; receives whether the animation ran to its natural end
/// (`true`) or was interrupted (`false`).
pub type CompletionFn = Arc<dyn Fn(bool) + Send + Sync>;

/// Per-write callout; receives the value that was committed to the target.
pub type ApplyFn = Arc<dyn Fn(&AnimValue) + Send + Sync>;

/// Optional per-animation trace sink for debugging and recording
pub trait AnimationTracer: Send + Sync {
    fn on_start(&self, _key_path: &str) {}
    fn on_advance(&self, _key_path: &str, _value: &AnimValue) {}
    fn on_write(&self, _key_path: &str, _value: &AnimValue) {}
    fn on_stop(&self, _key_path: &str, _finished: bool) {}
}

/// The closed set of curve kinds.
///
/// Repeat/reverse semantics differ per kind and are handled by the matching
/// arm in [`Animation::handle_repeat`]; there is no runtime type inspection
/// anywhere in the engine.
#[derive(Clone)]
pub enum Curve {
    /// Fixed-duration interpolation through an easing function
    Tween { duration: f64, easing: Easing },
    /// Spring physics toward the `to` bound
    Spring(SpringConfig),
    /// Momentum decay from an initial velocity; the end value is the
    /// projected rest position
    Decay(DecayConfig),
    /// Fixed-duration interpolation through a caller-supplied progress
    /// function of elapsed seconds
    Custom {
        duration: f64,
        progress: Arc<dyn Fn(f64) -> f32 + Send + Sync>,
    },
    /// A composite naming member keys on the same target; produces no values
    /// itself and exists for bulk lifecycle control
    Group { members: Vec<String> },
}

impl fmt::Debug for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Tween { duration, easing } => f
                .debug_struct("Tween")
                .field("duration", duration)
                .field("easing", easing)
                .finish(),
            Curve::Spring(config) => f.debug_tuple("Spring").field(config).finish(),
            Curve::Decay(config) => f.debug_tuple("Decay").field(config).finish(),
            Curve::Custom { duration, .. } => {
                f.debug_struct("Custom").field("duration", duration).finish()
            }
            Curve::Group { members } => f.debug_struct("Group").field("members", members).finish(),
        }
    }
}

enum Physics {
    Spring(Spring),
    Decay(Decay),
}

struct AnimState {
    // lifecycle
    active: bool,
    paused: bool,
    resume_pending: bool,
    started: bool,
    done: bool,
    start_time: f64,
    last_time: f64,
    begin_delay: f64,
    delay_until: Option<f64>,
    // bounds
    from: AnimValue,
    to: AnimValue,
    original_from: AnimValue,
    original_to: AnimValue,
    reversed: bool,
    velocity: AnimValue,
    original_velocity: AnimValue,
    // policy
    repeat_remaining: u64,
    repeat_forever: bool,
    autoreverses: bool,
    removed_on_completion: bool,
    additive: bool,
    // progress
    physics: Option<Physics>,
    current: Option<AnimValue>,
    previous: Option<AnimValue>,
    previous2: Option<AnimValue>,
    wrote_once: bool,
    // collaborator wiring
    property: Option<Property>,
    completion: Option<CompletionFn>,
    apply: Option<ApplyFn>,
    tracer: Option<Arc<dyn AnimationTracer>>,
}

/// A single animation: curve + target property + progress state.
///
/// Construct with one of the kind constructors, chain configuration, then
/// wrap in an [`AnimationHandle`] for registration:
///
/// ```ignore
/// let slide = Animation::spring("x", 0.0.into(), 240.0.into(), SpringConfig::stiff())
///     .removed_on_completion(true)
///     .into_handle();
/// animator.register(&layer, Some("slide"), slide);
/// ```
pub struct Animation {
    curve: Curve,
    key_path: String,
    state: Mutex<AnimState>,
}

impl Animation {
    fn with_curve(key_path: &str, curve: Curve, from: AnimValue, to: AnimValue) -> Self {
        Self {
            curve,
            key_path: key_path.to_string(),
            state: Mutex::new(AnimState {
                active: false,
                paused: false,
                resume_pending: false,
                started: false,
                done: false,
                start_time: 0.0,
                last_time: 0.0,
                begin_delay: 0.0,
                delay_until: None,
                original_from: from.clone(),
                original_to: to.clone(),
                from,
                to,
                reversed: false,
                velocity: AnimValue::default(),
                original_velocity: AnimValue::default(),
                repeat_remaining: 0,
                repeat_forever: false,
                autoreverses: false,
                removed_on_completion: true,
                additive: false,
                physics: None,
                current: None,
                previous: None,
                previous2: None,
                wrote_once: false,
                property: None,
                completion: None,
                apply: None,
                tracer: None,
            }),
        }
    }

    /// Fixed-duration eased interpolation from `from` to `to`
    pub fn tween(key_path: &str, from: AnimValue, to: AnimValue, duration: f64) -> Self {
        Self::with_curve(
            key_path,
            Curve::Tween {
                duration,
                easing: Easing::default(),
            },
            from,
            to,
        )
    }

    /// Spring physics from `from` toward `to`
    pub fn spring(key_path: &str, from: AnimValue, to: AnimValue, config: SpringConfig) -> Self {
        Self::with_curve(key_path, Curve::Spring(config), from, to)
    }

    /// Momentum decay from `from` with `velocity`; the end bound is derived
    /// at start from the projected rest position
    pub fn decay(key_path: &str, from: AnimValue, velocity: AnimValue, config: DecayConfig) -> Self {
        let to = from.clone();
        let mut animation = Self::with_curve(key_path, Curve::Decay(config), from, to);
        {
            let state = animation.state.get_mut().unwrap();
            state.velocity = velocity.clone();
            state.original_velocity = velocity;
        }
        animation
    }

    /// Fixed-duration interpolation through a custom progress function of
    /// elapsed seconds (expected to map into 0.0..=1.0)
    pub fn custom<F>(key_path: &str, from: AnimValue, to: AnimValue, duration: f64, f: F) -> Self
    where
        F: Fn(f64) -> f32 + Send + Sync + 'static,
    {
        Self::with_curve(
            key_path,
            Curve::Custom {
                duration,
                progress: Arc::new(f),
            },
            from,
            to,
        )
    }

    /// Composite over member keys on the same target
    pub fn group<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_curve(
            "",
            Curve::Group {
                members: members.into_iter().map(Into::into).collect(),
            },
            AnimValue::default(),
            AnimValue::default(),
        )
    }

    // ========================================================================
    // Configuration (builder style, before sharing)
    // ========================================================================

    pub fn easing(mut self, easing: Easing) -> Self {
        if let Curve::Tween { easing: slot, .. } = &mut self.curve {
            *slot = easing;
        }
        self
    }

    pub fn additive(mut self, additive: bool) -> Self {
        self.state.get_mut().unwrap().additive = additive;
        self
    }

    /// Total completion cycles to run; values of 0 and 1 both mean a single
    /// cycle
    pub fn repeat_count(mut self, count: u64) -> Self {
        self.state.get_mut().unwrap().repeat_remaining = count;
        self
    }

    pub fn repeat_forever(mut self, forever: bool) -> Self {
        self.state.get_mut().unwrap().repeat_forever = forever;
        self
    }

    pub fn autoreverses(mut self, autoreverses: bool) -> Self {
        self.state.get_mut().unwrap().autoreverses = autoreverses;
        self
    }

    /// Whether finishing deregisters the animation automatically (default
    /// true)
    pub fn removed_on_completion(mut self, removed: bool) -> Self {
        self.state.get_mut().unwrap().removed_on_completion = removed;
        self
    }

    /// Delay activation until this many seconds after the first frame that
    /// considers the animation
    pub fn begin_delay(mut self, seconds: f64) -> Self {
        self.state.get_mut().unwrap().begin_delay = seconds;
        self
    }

    /// Seed velocity for spring hand-off between interrupted animations
    pub fn initial_velocity(mut self, velocity: AnimValue) -> Self {
        let state = self.state.get_mut().unwrap();
        state.velocity = velocity.clone();
        state.original_velocity = velocity;
        self
    }

    /// Supply an explicit capability pair, bypassing key-path resolution
    pub fn with_property(mut self, property: Property) -> Self {
        self.state.get_mut().unwrap().property = Some(property);
        self
    }

    pub fn with_completion<F>(mut self, f: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.state.get_mut().unwrap().completion = Some(Arc::new(f));
        self
    }

    pub fn with_apply<F>(mut self, f: F) -> Self
    where
        F: Fn(&AnimValue) + Send + Sync + 'static,
    {
        self.state.get_mut().unwrap().apply = Some(Arc::new(f));
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn AnimationTracer>) -> Self {
        self.state.get_mut().unwrap().tracer = Some(tracer);
        self
    }

    pub fn into_handle(self) -> AnimationHandle {
        Arc::new(self)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().unwrap().done
    }

    pub fn is_additive(&self) -> bool {
        self.state.lock().unwrap().additive
    }

    pub fn removed_on_completion_flag(&self) -> bool {
        self.state.lock().unwrap().removed_on_completion
    }

    /// Discriminant for decay-style repeat/reverse handling
    pub fn is_decay(&self) -> bool {
        matches!(self.curve, Curve::Decay(_))
    }

    /// Member keys when this animation is a composite group
    pub fn group_members(&self) -> Option<Vec<String>> {
        match &self.curve {
            Curve::Group { members } => Some(members.clone()),
            _ => None,
        }
    }

    pub fn has_value(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }

    /// Most recently computed sample
    pub fn current_value(&self) -> Option<AnimValue> {
        self.state.lock().unwrap().current.clone()
    }

    /// Current (from, to) bounds
    pub fn bounds(&self) -> (AnimValue, AnimValue) {
        let state = self.state.lock().unwrap();
        (state.from.clone(), state.to.clone())
    }

    /// Current velocity (decay/spring hand-off value)
    pub fn velocity(&self) -> AnimValue {
        let state = self.state.lock().unwrap();
        match &state.physics {
            Some(Physics::Spring(spring)) => spring.velocity().clone(),
            Some(Physics::Decay(decay)) => decay.velocity().clone(),
            None => state.velocity.clone(),
        }
    }

    /// Pause or resume advancement. A paused animation stays scheduled; its
    /// timing is re-anchored on resume so no progress jump occurs.
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock().unwrap();
        if state.paused == paused {
            return;
        }
        state.paused = paused;
        if !paused && state.started {
            state.resume_pending = true;
        }
    }

    // ========================================================================
    // Engine contract
    // ========================================================================

    /// Resolve and cache the property capability against `target`. Called
    /// once at registration; a pre-supplied property wins. Resolution
    /// failure degrades to "no capability" — the animation still schedules,
    /// its values are dropped.
    pub(crate) fn bind(&self, target: &dyn Animatable) {
        if matches!(self.curve, Curve::Group { .. }) {
            return;
        }
        if self.state.lock().unwrap().property.is_some() {
            return;
        }
        match resolve_property(target, &self.key_path) {
            Ok(property) => self.state.lock().unwrap().property = Some(property),
            Err(err) => tracing::warn!(
                key_path = %self.key_path,
                %err,
                "property resolution failed; animation values will be dropped"
            ),
        }
    }

    /// Activate against the current time if not yet started. Idempotent once
    /// started; honors the begin delay by arming a deadline on the first
    /// attempt. `offset` shifts the animation's internal timebase.
    pub fn start_if_needed(&self, _target: &dyn Animatable, now: f64, offset: f64) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if state.started {
            return false;
        }
        if state.begin_delay > 0.0 {
            match state.delay_until {
                // first consideration arms the deadline
                None => {
                    state.delay_until = Some(now + state.begin_delay);
                    return false;
                }
                Some(deadline) if now < deadline => return false,
                // already satisfied; repeat cycles do not wait again
                Some(_) => {}
            }
        }

        state.started = true;
        state.active = true;
        state.done = false;
        state.start_time = now - offset;
        state.last_time = now - offset;

        match &self.curve {
            Curve::Spring(config) => {
                let mut spring = Spring::new(*config, state.from.clone(), state.to.clone());
                if state.velocity.len() == state.from.len() {
                    spring.set_velocity(state.velocity.clone());
                }
                state.physics = Some(Physics::Spring(spring));
            }
            Curve::Decay(config) => {
                let velocity = if state.velocity.len() == state.from.len() {
                    state.velocity.clone()
                } else {
                    AnimValue::zero(state.from.len())
                };
                let decay = Decay::new(*config, state.from.clone(), velocity);
                state.to = decay.projected_destination();
                state.physics = Some(Physics::Decay(decay));
            }
            _ => {}
        }

        let tracer = state.tracer.clone();
        drop(guard);
        if let Some(tracer) = tracer {
            tracer.on_start(&self.key_path);
        }
        true
    }

    /// Advance internal progress to `now`. Returns whether the computed
    /// value changed since the last advance; an unchanged value lets the
    /// caller skip the write-back.
    pub fn advance_time(&self, now: f64, _target: &dyn Animatable) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if !state.active || state.paused || state.done {
            return false;
        }
        if state.resume_pending {
            // shift the timebase across the pause gap
            state.start_time += now - state.last_time;
            state.last_time = now;
            state.resume_pending = false;
        }

        let threshold = state
            .property
            .as_ref()
            .map(|p| p.threshold())
            .unwrap_or(DEFAULT_THRESHOLD);
        let dt = ((now - state.last_time).max(0.0) as f32).min(MAX_FRAME_INTERVAL);

        let new_value = match &self.curve {
            Curve::Tween { duration, easing } => {
                let elapsed = now - state.start_time;
                let progress = if *duration <= 0.0 {
                    1.0
                } else {
                    (elapsed / duration).min(1.0) as f32
                };
                if elapsed >= *duration {
                    state.done = true;
                }
                Some(state.from.lerp(&state.to, easing.apply(progress)))
            }
            Curve::Custom { duration, progress } => {
                let elapsed = now - state.start_time;
                let p = progress(elapsed).clamp(0.0, 1.0);
                if elapsed >= *duration {
                    state.done = true;
                }
                Some(state.from.lerp(&state.to, p))
            }
            Curve::Spring(_) => match &mut state.physics {
                Some(Physics::Spring(spring)) => {
                    spring.step(dt, threshold);
                    if spring.is_settled(threshold) {
                        state.done = true;
                    }
                    Some(spring.value().clone())
                }
                _ => None,
            },
            Curve::Decay(_) => match &mut state.physics {
                Some(Physics::Decay(decay)) => {
                    decay.step(dt, threshold);
                    if decay.is_settled(threshold) {
                        state.done = true;
                    }
                    Some(decay.value().clone())
                }
                _ => None,
            },
            Curve::Group { .. } => None,
        };

        state.last_time = now;
        let changed = match (&new_value, &state.current) {
            (Some(new), Some(current)) => new != current,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let tracer = if changed { state.tracer.clone() } else { None };
        if let Some(new) = new_value {
            state.current = Some(new);
        }
        let traced = if tracer.is_some() {
            state.current.clone()
        } else {
            None
        };
        drop(guard);

        if let (Some(tracer), Some(value)) = (tracer, traced) {
            tracer.on_advance(&self.key_path, &value);
        }
        changed
    }

    /// Snap internal progress to the canonical end value
    pub fn finalize_progress(&self) {
        if matches!(self.curve, Curve::Group { .. }) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.done = true;
        let end = state.to.clone();
        state.current = Some(end);
    }

    /// Commit the current value to the target.
    ///
    /// Non-additive values are written directly, suppressed when (outside
    /// the initial pass) a read capability reports the committed value is
    /// already equal. Additive values are composed as a delta against the
    /// externally read current value; a zero delta on the finishing pass is
    /// skipped, and without a read capability the composition is skipped
    /// entirely. Every performed write records the two most recent samples.
    pub fn apply_value(&self, target: &dyn Animatable, finishing: bool) {
        let (property, current, previous, additive, wrote_once, apply, tracer) = {
            let state = self.state.lock().unwrap();
            match (&state.property, &state.current) {
                (Some(property), Some(current)) => (
                    property.clone(),
                    current.clone(),
                    state.previous.clone(),
                    state.additive,
                    state.wrote_once,
                    state.apply.clone(),
                    state.tracer.clone(),
                ),
                _ => return,
            }
        };
        if !property.has_write() {
            // configuration issue in the collaborator; the value is dropped
            return;
        }

        let written = if additive {
            let baseline = previous.unwrap_or_else(|| AnimValue::zero(current.len()));
            let delta = current.sub(&baseline);
            if finishing && delta.is_zero() {
                return;
            }
            match property.read(target) {
                Some(base) => {
                    let sum = base.add(&delta);
                    property.write(target, &sum);
                    sum
                }
                // additive composition requires a read capability
                None => return,
            }
        } else {
            if wrote_once {
                if let Some(committed) = property.read(target) {
                    if committed == current {
                        return;
                    }
                }
            }
            property.write(target, &current);
            current.clone()
        };

        {
            let mut state = self.state.lock().unwrap();
            state.previous2 = state.previous.take();
            state.previous = Some(current);
            state.wrote_once = true;
        }
        if let Some(tracer) = tracer {
            tracer.on_write(&self.key_path, &written);
        }
        if let Some(apply) = apply {
            apply(&written);
        }
    }

    /// Consume one repeat cycle. Returns true when another cycle should run,
    /// having applied the kind-specific bound/velocity transform; returns
    /// false when the animation retires, restoring the original bound order
    /// if autoreversal left it swapped.
    pub(crate) fn handle_repeat(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let again = if state.repeat_forever {
            true
        } else {
            state.repeat_remaining = state.repeat_remaining.saturating_sub(1);
            state.repeat_remaining > 0
        };

        if !again {
            if state.reversed {
                state.from = state.original_from.clone();
                state.to = state.original_to.clone();
                state.reversed = false;
            }
            return false;
        }

        let decay = self.is_decay();
        if state.autoreverses {
            state.reversed = !state.reversed;
            if decay {
                // a decay reverses by coasting back from its rest position
                state.from = state.to.clone();
                state.velocity = if state.reversed {
                    state.original_velocity.negate()
                } else {
                    state.original_velocity.clone()
                };
            } else {
                std::mem::swap(&mut state.from, &mut state.to);
            }
        } else if decay {
            // continue forward from the rest position with the originating velocity
            state.from = state.to.clone();
            state.velocity = state.original_velocity.clone();
        } else {
            // advance the bounds forward by one span
            let span = state.to.sub(&state.from);
            state.from = state.to.clone();
            state.to = state.from.add(&span);
        }
        true
    }

    /// Internal stop for the repeat transition: deactivates and force-resets
    /// without firing completion callouts, so the next cycle can start in
    /// the same frame. The begin delay stays consumed; repeat cycles restart
    /// with no gap.
    pub(crate) fn rewind(&self) {
        let mut state = self.state.lock().unwrap();
        state.active = false;
        state.started = false;
        state.done = false;
        state.resume_pending = false;
        state.physics = None;
        state.current = None;
        state.previous = None;
        state.previous2 = None;
        state.wrote_once = false;
    }

    /// Signal the state machine to stop. `finished` reports whether the
    /// animation ran to its natural end; `should_remove` whether it is being
    /// deregistered. Callouts run after the state transition, outside the
    /// lock.
    pub fn stop(&self, should_remove: bool, finished: bool) {
        let (tracer, completion) = {
            let mut state = self.state.lock().unwrap();
            // started stays set: a finished-but-kept animation must not
            // re-activate on the next pass; re-registration resets it
            state.active = false;
            (state.tracer.clone(), state.completion.clone())
        };
        tracing::debug!(
            key_path = %self.key_path,
            finished,
            should_remove,
            "animation stopped"
        );
        if let Some(tracer) = tracer {
            tracer.on_stop(&self.key_path, finished);
        }
        if let Some(completion) = completion {
            completion(finished);
        }
    }

    /// Clear internal progress so the instance can be (re)started. Without
    /// `force`, an actively running animation is left untouched.
    pub fn reset(&self, force: bool) {
        let mut state = self.state.lock().unwrap();
        if state.active && !force {
            return;
        }
        state.started = false;
        state.done = false;
        state.delay_until = None;
        state.resume_pending = false;
        state.physics = None;
        state.current = None;
        state.previous = None;
        state.previous2 = None;
        state.wrote_once = false;
    }
}

impl fmt::Debug for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Animation")
            .field("key_path", &self.key_path)
            .field("curve", &self.curve)
            .field("active", &state.active)
            .field("done", &state.done)
            .finish()
    }
}
