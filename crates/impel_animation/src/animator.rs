//! The animator: registry, scheduling lists, and the frame-driven render loop
//!
//! One [`Animator`] owns the authoritative mapping from (target, key) pairs
//! to animations, the insertion-ordered Active List its render loop walks
//! each frame, and the transient Pending List of registrations awaiting
//! their deferred first application. All shared structure lives behind a
//! single mutex; the lock is held only for structural changes and never
//! across a state-machine transition or a user callout, so callouts are free
//! to re-enter the animator (a completion handler may remove or add other
//! animations).
//!
//! `Animator` is a cheap-clone handle over shared state, so one scheduler
//! can be passed through many call sites.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Instant;

use rustc_hash::FxHashMap;

use impel_core::{Animatable, TargetId};

use crate::animation::AnimationHandle;
use crate::clock::{DisplayTimer, TimerSource};
use crate::proxy::AnimatorProxy;

/// Hand-off of a unit of work into the primary execution context
pub type DispatchFn = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Host hook that runs a unit of work once, just before the next
/// externally-visible commit point
pub type CommitHookFn = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Ordered fan-out listener around each frame pass
pub trait AnimatorObserver: Send + Sync {
    fn on_will_animate(&self, _animator: &Animator) {}
    fn on_did_animate(&self, _animator: &Animator) {}
}

/// Singular variant of [`AnimatorObserver`], notified first before the pass
/// and last after it
pub trait AnimatorDelegate: Send + Sync {
    fn on_will_animate(&self, _animator: &Animator) {}
    fn on_did_animate(&self, _animator: &Animator) {}
}

/// Process-unique key generator for registrations made without an explicit
/// key.
static KEY_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_key() -> String {
    format!("animation{}", KEY_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// One scheduled (target, key, animation) registration.
///
/// The target is held weakly next to its identity token; the token stays
/// comparable after the target is gone, which is how a frame pass recognizes
/// abandoned items.
pub(crate) struct Item {
    pub(crate) target: Weak<dyn Animatable>,
    pub(crate) target_id: TargetId,
    pub(crate) key: String,
    pub(crate) animation: AnimationHandle,
}

pub(crate) struct AnimatorInner {
    pub(crate) registry: FxHashMap<TargetId, FxHashMap<String, AnimationHandle>>,
    pub(crate) active: Vec<Arc<Item>>,
    pub(crate) pending: Vec<Arc<Item>>,
    pub(crate) observers: Vec<Arc<dyn AnimatorObserver>>,
    pub(crate) proxies: FxHashMap<TargetId, Weak<AnimatorProxy>>,
    /// At most one outstanding deferred drain per animator
    pub(crate) drain_scheduled: bool,
    /// Depth of in-flight frame passes, for the end-of-pass drain fallback
    pub(crate) pass_depth: u32,
}

pub(crate) struct AnimatorShared {
    pub(crate) epoch: Instant,
    pub(crate) delegate: Mutex<Option<Arc<dyn AnimatorDelegate>>>,
    pub(crate) timer: Mutex<Option<Box<dyn TimerSource>>>,
    pub(crate) timer_disabled: AtomicBool,
    pub(crate) coalescing_disabled: AtomicBool,
    /// Single in-flight hand-off from a secondary tick thread
    pub(crate) tick_inflight: AtomicBool,
    pub(crate) dispatcher: Mutex<Option<DispatchFn>>,
    pub(crate) commit_hook: Mutex<Option<CommitHookFn>>,
}

/// The frame-synchronized animation scheduler.
///
/// Clones share the same underlying state; hold one per subsystem or use the
/// process-wide [`Animator::shared`] instance.
#[derive(Clone)]
pub struct Animator {
    pub(crate) inner: Arc<Mutex<AnimatorInner>>,
    pub(crate) shared: Arc<AnimatorShared>,
}

impl Animator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AnimatorInner {
                registry: FxHashMap::default(),
                active: Vec::new(),
                pending: Vec::new(),
                observers: Vec::new(),
                proxies: FxHashMap::default(),
                drain_scheduled: false,
                pass_depth: 0,
            })),
            shared: Arc::new(AnimatorShared {
                epoch: Instant::now(),
                delegate: Mutex::new(None),
                timer: Mutex::new(None),
                timer_disabled: AtomicBool::new(false),
                coalescing_disabled: AtomicBool::new(false),
                tick_inflight: AtomicBool::new(false),
                dispatcher: Mutex::new(None),
                commit_hook: Mutex::new(None),
            }),
        }
    }

    /// The process-wide shared animator, constructed lazily on first use.
    ///
    /// Prefer passing an explicit instance through call sites; the shared
    /// instance exists for code that cannot be wired.
    pub fn shared() -> Animator {
        static SHARED: OnceLock<Animator> = OnceLock::new();
        SHARED.get_or_init(Animator::new).clone()
    }

    /// Seconds since this animator was created
    pub fn now(&self) -> f64 {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Attach `animation` to `target` under `key`, generating a
    /// process-unique key when none is given. Re-adding the identical
    /// instance under the same key is a no-op; a different occupant is first
    /// unregistered. Returns the key in use.
    pub fn register(
        &self,
        target: &Arc<dyn Animatable>,
        key: Option<&str>,
        animation: AnimationHandle,
    ) -> String {
        let target_id = TargetId::of(target);
        let key = key.map(str::to_owned).unwrap_or_else(unique_key);

        let occupant = {
            let inner = self.inner.lock().unwrap();
            inner
                .registry
                .get(&target_id)
                .and_then(|keys| keys.get(&key))
                .cloned()
        };
        if let Some(existing) = &occupant {
            if Arc::ptr_eq(existing, &animation) {
                return key;
            }
            // replace: the prior occupant goes first, keeping the target's
            // registry map in place for the entry about to land
            self.unregister_by_id(target_id, &key, false);
        }

        // capability resolution happens once, here; instance reuse gets a
        // clean slate
        animation.bind(&**target);
        animation.reset(true);

        let raced = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .active
                .retain(|item| !(item.target_id == target_id && item.key == key));
            inner
                .pending
                .retain(|item| !(item.target_id == target_id && item.key == key));
            let raced = inner
                .registry
                .entry(target_id)
                .or_default()
                .insert(key.clone(), animation.clone());
            let item = Arc::new(Item {
                target: Arc::downgrade(target),
                target_id,
                key: key.clone(),
                animation,
            });
            inner.active.push(item.clone());
            inner.pending.push(item);
            raced
        };
        // a registration that slipped in between the occupancy check and the
        // insert is stopped like any other replaced occupant
        if let Some(raced) = raced {
            let was_active = raced.is_active();
            raced.stop(true, !was_active);
        }

        tracing::debug!(key = %key, "registered animation");
        self.schedule_drain();
        self.update_timer_state();
        key
    }

    /// Remove the animation registered under (target, key), if any. A group
    /// animation releases its named members first. Synchronous: by the time
    /// this returns, neither the registry nor the Active List contain the
    /// entry.
    pub fn unregister(&self, target: &Arc<dyn Animatable>, key: &str) {
        self.unregister_by_id(TargetId::of(target), key, true);
    }

    fn unregister_by_id(&self, target_id: TargetId, key: &str, cleanup: bool) {
        let animation = {
            let inner = self.inner.lock().unwrap();
            inner
                .registry
                .get(&target_id)
                .and_then(|keys| keys.get(key))
                .cloned()
        };
        // absent key: no-op
        let Some(animation) = animation else { return };

        if let Some(members) = animation.group_members() {
            for member in members {
                self.unregister_by_id(target_id, &member, true);
            }
        }

        let was_active = animation.is_active();
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(keys) = inner.registry.get_mut(&target_id) {
                // the slot may have been replaced while unlocked; only the
                // same instance is removed
                if keys
                    .get(key)
                    .is_some_and(|current| Arc::ptr_eq(current, &animation))
                {
                    keys.remove(key);
                }
                if cleanup && keys.is_empty() {
                    inner.registry.remove(&target_id);
                }
            }
            let matches = |item: &Arc<Item>| {
                item.target_id == target_id
                    && item.key == key
                    && Arc::ptr_eq(&item.animation, &animation)
            };
            inner.active.retain(|item| !matches(item));
            inner.pending.retain(|item| !matches(item));
        }
        // finished only when it had already gone inactive on its own
        animation.stop(true, !was_active);
        self.update_timer_state();
    }

    /// Remove every animation registered on `target`
    pub fn unregister_all(&self, target: &Arc<dyn Animatable>) {
        let target_id = TargetId::of(target);
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            let snapshot = inner.registry.remove(&target_id);
            inner.active.retain(|item| item.target_id != target_id);
            inner.pending.retain(|item| item.target_id != target_id);
            snapshot
        };
        if let Some(keys) = snapshot {
            for animation in keys.into_values() {
                let was_active = animation.is_active();
                animation.stop(true, !was_active);
            }
        }
        self.update_timer_state();
    }

    // ========================================================================
    // Lookup (all return copies safe to use without the lock)
    // ========================================================================

    pub fn keys_for(&self, target: &Arc<dyn Animatable>) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .registry
            .get(&TargetId::of(target))
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn animations_for(&self, target: &Arc<dyn Animatable>) -> Vec<AnimationHandle> {
        let inner = self.inner.lock().unwrap();
        inner
            .registry
            .get(&TargetId::of(target))
            .map(|keys| keys.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn animation(&self, target: &Arc<dyn Animatable>, key: &str) -> Option<AnimationHandle> {
        let inner = self.inner.lock().unwrap();
        inner
            .registry
            .get(&TargetId::of(target))
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    /// Number of items the next frame pass will visit
    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().active.len()
    }

    /// Number of registrations awaiting their deferred first application
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    // ========================================================================
    // Observers and delegate
    // ========================================================================

    pub fn add_observer(&self, observer: Arc<dyn AnimatorObserver>) {
        self.inner.lock().unwrap().observers.push(observer);
        self.update_timer_state();
    }

    /// Remove a previously added observer; absent observers are a no-op
    pub fn remove_observer(&self, observer: &Arc<dyn AnimatorObserver>) {
        self.inner
            .lock()
            .unwrap()
            .observers
            .retain(|existing| !Arc::ptr_eq(existing, observer));
        self.update_timer_state();
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn AnimatorDelegate>>) {
        *self.shared.delegate.lock().unwrap() = delegate;
    }

    // ========================================================================
    // Frame clock wiring and configuration
    // ========================================================================

    /// Install an arbitrary tick source; pass None to detach
    pub fn set_timer_source(&self, source: Option<Box<dyn TimerSource>>) {
        *self.shared.timer.lock().unwrap() = source;
        self.update_timer_state();
    }

    /// Spawn the default background display timer at `refresh_rate` Hz
    pub fn start_timer(&self, refresh_rate: u32) {
        let inner = Arc::downgrade(&self.inner);
        let shared = Arc::downgrade(&self.shared);
        let timer = DisplayTimer::spawn(refresh_rate, self.shared.epoch, move |now| {
            // the thread winds down once the animator itself is gone
            match (inner.upgrade(), shared.upgrade()) {
                (Some(inner), Some(shared)) => {
                    Animator { inner, shared }.clock_tick(now);
                    true
                }
                _ => false,
            }
        });
        self.set_timer_source(Some(Box::new(timer)));
    }

    pub fn stop_timer(&self) {
        self.set_timer_source(None);
    }

    /// Disable (or re-enable) ticking regardless of demand
    pub fn set_timer_disabled(&self, disabled: bool) {
        self.shared.timer_disabled.store(disabled, Ordering::Relaxed);
        self.update_timer_state();
    }

    /// Disable the secondary-thread coalescing hand-off; ticks then apply
    /// inline on whatever thread delivers them
    pub fn set_coalescing_disabled(&self, disabled: bool) {
        self.shared
            .coalescing_disabled
            .store(disabled, Ordering::Relaxed);
    }

    /// Install the hand-off into the primary execution context used by
    /// off-thread tick delivery
    pub fn set_dispatcher(&self, dispatcher: Option<DispatchFn>) {
        *self.shared.dispatcher.lock().unwrap() = dispatcher;
    }

    /// Install the host's run-once-before-next-commit hook used to apply
    /// pending registrations. Without one, pending drains run synchronously
    /// at the end of the in-flight frame pass (or immediately when no pass
    /// is in flight).
    pub fn set_commit_hook(&self, hook: Option<CommitHookFn>) {
        *self.shared.commit_hook.lock().unwrap() = hook;
    }

    /// Entry point for tick delivery, callable from any thread. Off-thread
    /// ticks coalesce: at most one hand-off to the primary context is
    /// outstanding, extra ticks are dropped rather than queued — only the
    /// most recent time reading matters.
    pub fn clock_tick(&self, now: f64) {
        let dispatcher = self.shared.dispatcher.lock().unwrap().clone();
        let coalesce = !self.shared.coalescing_disabled.load(Ordering::Relaxed);
        match dispatcher {
            Some(dispatch) if coalesce => {
                if self
                    .shared
                    .tick_inflight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }
                let animator = self.clone();
                dispatch(Box::new(move || {
                    animator.render_at_time(now);
                    animator.shared.tick_inflight.store(false, Ordering::Release);
                }));
            }
            _ => self.render_at_time(now),
        }
    }

    /// Reflect demand onto the installed timer: paused whenever there are no
    /// observers and nothing scheduled, or when disabled by configuration
    fn update_timer_state(&self) {
        let demand = {
            let inner = self.inner.lock().unwrap();
            !inner.observers.is_empty() || !inner.active.is_empty()
        };
        let should_run = demand && !self.shared.timer_disabled.load(Ordering::Relaxed);
        let timer = self.shared.timer.lock().unwrap();
        if let Some(timer) = timer.as_ref() {
            if should_run && timer.is_paused() {
                tracing::debug!("resuming frame clock");
                timer.resume();
            } else if !should_run && !timer.is_paused() {
                tracing::debug!("pausing frame clock");
                timer.pause();
            }
        }
    }

    // ========================================================================
    // Render loop
    // ========================================================================

    /// Advance every scheduled animation to `now`. This is the host-driven
    /// entry point; the installed timer funnels into it as well.
    pub fn render_at_time(&self, now: f64) {
        let items = {
            let mut inner = self.inner.lock().unwrap();
            inner.pass_depth += 1;
            inner.active.clone()
        };
        self.render_pass(now, &items);
        let drain_now = {
            let mut inner = self.inner.lock().unwrap();
            inner.pass_depth -= 1;
            inner.pass_depth == 0
                && inner.drain_scheduled
                && self.shared.commit_hook.lock().unwrap().is_none()
        };
        if drain_now {
            self.drain_pending(Some(now));
        }
    }

    /// One notification-wrapped pass over an item snapshot
    fn render_pass(&self, now: f64, items: &[Arc<Item>]) {
        let delegate = self.shared.delegate.lock().unwrap().clone();
        let observers = self.inner.lock().unwrap().observers.clone();

        if let Some(delegate) = &delegate {
            delegate.on_will_animate(self);
        }
        for observer in &observers {
            observer.on_will_animate(self);
        }

        for item in items {
            self.process_item(item, now);
        }

        for observer in &observers {
            observer.on_did_animate(self);
        }
        if let Some(delegate) = &delegate {
            delegate.on_did_animate(self);
        }
    }

    /// Per-item state machine step for one frame
    fn process_item(&self, item: &Arc<Item>, now: f64) {
        let Some(target) = item.target.upgrade() else {
            // target gone: the normal, expected completion path
            tracing::trace!(key = %item.key, "target gone; retiring item");
            self.remove_item_structures(item);
            item.animation.stop(true, false);
            self.update_timer_state();
            return;
        };
        let target_ref: &dyn Animatable = &*target;
        let animation = &item.animation;

        animation.start_if_needed(target_ref, now, 0.0);
        if !animation.is_active() || animation.is_paused() {
            // stays scheduled, just not advanced this frame
            return;
        }

        if animation.advance_time(now, target_ref) {
            animation.apply_value(target_ref, false);
        }

        if animation.is_done() {
            animation.finalize_progress();
            animation.apply_value(target_ref, true);
            if animation.handle_repeat() {
                // next cycle begins at the current time, no frame gap
                animation.rewind();
                animation.start_if_needed(target_ref, now, 0.0);
            } else if animation.removed_on_completion_flag() {
                self.remove_item_structures(item);
                animation.stop(true, true);
                self.update_timer_state();
            } else {
                // finished but kept: holds its end value until replaced
                animation.stop(false, true);
            }
        }
    }

    /// Erase an item from registry and both lists. An item that was already
    /// removed by a concurrent call is treated as handled, not an error.
    fn remove_item_structures(&self, item: &Arc<Item>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(keys) = inner.registry.get_mut(&item.target_id) {
            if keys
                .get(&item.key)
                .is_some_and(|current| Arc::ptr_eq(current, &item.animation))
            {
                keys.remove(&item.key);
            }
            if keys.is_empty() {
                inner.registry.remove(&item.target_id);
            }
        }
        inner.active.retain(|existing| !Arc::ptr_eq(existing, item));
        inner.pending.retain(|existing| !Arc::ptr_eq(existing, item));
    }

    // ========================================================================
    // Deferred pending drain
    // ========================================================================

    /// Request the single deferred application of the Pending List.
    /// Idempotent while a drain is outstanding.
    fn schedule_drain(&self) {
        let defer_to_pass = {
            let mut inner = self.inner.lock().unwrap();
            if inner.drain_scheduled {
                return;
            }
            inner.drain_scheduled = true;
            inner.pass_depth > 0
        };
        let hook = self.shared.commit_hook.lock().unwrap().clone();
        match hook {
            Some(hook) => {
                tracing::debug!("scheduling pending drain before next commit");
                let animator = self.clone();
                hook(Box::new(move || animator.drain_pending(None)));
            }
            // no hook: the in-flight pass drains at its end, or, with no
            // pass in flight, the drain runs right away
            None if defer_to_pass => {}
            None => self.drain_pending(None),
        }
    }

    /// Apply the Pending List once: snapshot under the lock, render the
    /// snapshot unlocked, then clear the list and its scheduling token.
    fn drain_pending(&self, time: Option<f64>) {
        let items = self.inner.lock().unwrap().pending.clone();
        if !items.is_empty() {
            let now = time.unwrap_or_else(|| self.now());
            self.render_pass(now, &items);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.pending.clear();
        inner.drain_scheduled = false;
    }
}

impl Default for Animator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Animation, AnimationTracer};
    use crate::decay::DecayConfig;
    use impel_core::{AnimValue, Property, ReadFn, WriteFn};
    use std::any::Any;
    use std::sync::Mutex as StdMutex;

    struct Layer {
        x: StdMutex<f32>,
        writes: StdMutex<u32>,
        readable: bool,
    }

    impl Layer {
        fn new(x: f32) -> Self {
            Self {
                x: StdMutex::new(x),
                writes: StdMutex::new(0),
                readable: true,
            }
        }

        fn write_only(x: f32) -> Self {
            Self {
                readable: false,
                ..Self::new(x)
            }
        }

        fn x(&self) -> f32 {
            *self.x.lock().unwrap()
        }

        fn writes(&self) -> u32 {
            *self.writes.lock().unwrap()
        }
    }

    impl Animatable for Layer {
        fn property(&self, key_path: &str) -> Option<Property> {
            if key_path != "x" {
                return None;
            }
            let read: Option<ReadFn> = if self.readable {
                Some(Arc::new(|t: &dyn Animatable| {
                    let layer = t.as_any().downcast_ref::<Layer>().unwrap();
                    AnimValue::from(layer.x())
                }))
            } else {
                None
            };
            let write: Option<WriteFn> = Some(Arc::new(|t: &dyn Animatable, v: &AnimValue| {
                let layer = t.as_any().downcast_ref::<Layer>().unwrap();
                *layer.x.lock().unwrap() = v.get(0);
                *layer.writes.lock().unwrap() += 1;
            }));
            Some(Property::new("x", read, write))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn layer(x: f32) -> Arc<dyn Animatable> {
        Arc::new(Layer::new(x))
    }

    fn layer_x(target: &Arc<dyn Animatable>) -> f32 {
        target.as_any().downcast_ref::<Layer>().unwrap().x()
    }

    fn layer_writes(target: &Arc<dyn Animatable>) -> u32 {
        target.as_any().downcast_ref::<Layer>().unwrap().writes()
    }

    fn tween_x(to: f32) -> Animation {
        Animation::tween("x", 0.0.into(), to.into(), 1.0)
    }

    #[derive(Default)]
    struct CountingTracer {
        starts: StdMutex<u32>,
        stops: StdMutex<Vec<bool>>,
    }

    impl AnimationTracer for CountingTracer {
        fn on_start(&self, _key_path: &str) {
            *self.starts.lock().unwrap() += 1;
        }

        fn on_stop(&self, _key_path: &str, finished: bool) {
            self.stops.lock().unwrap().push(finished);
        }
    }

    #[test]
    fn test_uniqueness_per_target_and_key() {
        let animator = Animator::new();
        let target = layer(0.0);

        let first = tween_x(10.0).into_handle();
        let second = tween_x(20.0).into_handle();
        animator.register(&target, Some("pos"), first.clone());
        animator.register(&target, Some("pos"), second.clone());

        assert_eq!(animator.keys_for(&target), vec!["pos".to_string()]);
        assert_eq!(animator.active_count(), 1);
        let current = animator.animation(&target, "pos").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        // the replaced occupant was interrupted, not finished
        assert!(!first.is_active());
    }

    #[test]
    fn test_identical_instance_readd_is_noop() {
        let animator = Animator::new();
        let target = layer(0.0);
        let stops: Arc<StdMutex<u32>> = Arc::new(StdMutex::new(0));
        let sink = stops.clone();
        let animation = tween_x(10.0)
            .with_completion(move |_| *sink.lock().unwrap() += 1)
            .into_handle();

        animator.register(&target, Some("pos"), animation.clone());
        animator.register(&target, Some("pos"), animation.clone());

        assert_eq!(animator.active_count(), 1);
        assert_eq!(*stops.lock().unwrap(), 0);
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let animator = Animator::new();
        let target = layer(0.0);

        let a = animator.register(&target, None, tween_x(1.0).into_handle());
        let b = animator.register(&target, None, tween_x(2.0).into_handle());

        assert_ne!(a, b);
        assert_eq!(animator.keys_for(&target).len(), 2);
    }

    #[test]
    fn test_idempotent_removal() {
        let animator = Animator::new();
        let target = layer(0.0);
        animator.register(&target, Some("a"), tween_x(1.0).into_handle());
        animator.register(&target, Some("b"), tween_x(2.0).into_handle());

        animator.unregister(&target, "a");
        animator.unregister(&target, "a");

        assert_eq!(animator.keys_for(&target), vec!["b".to_string()]);
        assert_eq!(animator.active_count(), 1);
    }

    #[test]
    fn test_unregister_all() {
        let animator = Animator::new();
        let target = layer(0.0);
        let other = layer(0.0);
        animator.register(&target, Some("a"), tween_x(1.0).into_handle());
        animator.register(&target, Some("b"), tween_x(2.0).into_handle());
        animator.register(&other, Some("c"), tween_x(3.0).into_handle());

        animator.unregister_all(&target);

        assert!(animator.keys_for(&target).is_empty());
        assert_eq!(animator.keys_for(&other), vec!["c".to_string()]);
        assert_eq!(animator.active_count(), 1);
    }

    #[test]
    fn test_group_unregisters_members() {
        let animator = Animator::new();
        let target = layer(0.0);
        animator.register(&target, Some("a"), tween_x(1.0).into_handle());
        animator.register(&target, Some("b"), tween_x(2.0).into_handle());
        animator.register(
            &target,
            Some("both"),
            Animation::group(["a", "b"]).into_handle(),
        );

        animator.unregister(&target, "both");

        assert!(animator.keys_for(&target).is_empty());
        assert_eq!(animator.active_count(), 0);
    }

    #[test]
    fn test_pending_isolation() {
        let animator = Animator::new();
        let jobs: Arc<StdMutex<Vec<Box<dyn FnOnce() + Send>>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let sink = jobs.clone();
        animator.set_commit_hook(Some(Arc::new(move |job| sink.lock().unwrap().push(job))));

        struct Registrar {
            target: Arc<dyn Animatable>,
            registered: StdMutex<bool>,
        }
        impl AnimatorObserver for Registrar {
            fn on_will_animate(&self, animator: &Animator) {
                let mut registered = self.registered.lock().unwrap();
                if !*registered {
                    *registered = true;
                    animator.register(&self.target, Some("late"), tween_x(50.0).into_handle());
                }
            }
        }

        let target = layer(0.0);
        let observer = Arc::new(Registrar {
            target: target.clone(),
            registered: StdMutex::new(false),
        });
        animator.add_observer(observer);

        animator.render_at_time(0.0);
        // registered mid-pass: present in the lists but not yet visited
        assert_eq!(animator.pending_count(), 1);
        assert_eq!(layer_x(&target), 0.0);
        assert_eq!(layer_writes(&target), 0);

        // the deferred drain applies its first frame
        let drained: Vec<_> = jobs.lock().unwrap().drain(..).collect();
        for job in drained {
            job();
        }
        assert_eq!(animator.pending_count(), 0);
        assert!(layer_writes(&target) > 0);
    }

    #[test]
    fn test_write_suppression_on_finishing_pass() {
        let animator = Animator::new();
        let target = layer(0.0);
        animator.register(&target, Some("pos"), tween_x(100.0).into_handle());
        let baseline = layer_writes(&target);

        animator.render_at_time(2.0);

        // the done frame writes once; the finishing re-write of the same
        // value is suppressed through the read capability
        assert_eq!(layer_writes(&target), baseline + 1);
        assert_eq!(layer_x(&target), 100.0);
    }

    #[test]
    fn test_no_suppression_without_read_capability() {
        let animator = Animator::new();
        let target: Arc<dyn Animatable> = Arc::new(Layer::write_only(0.0));
        animator.register(&target, Some("pos"), tween_x(100.0).into_handle());
        let baseline = layer_writes(&target);

        animator.render_at_time(2.0);

        // done-frame write plus the unsuppressed finishing write
        assert_eq!(layer_writes(&target), baseline + 2);
    }

    #[test]
    fn test_repeat_continuity() {
        let animator = Animator::new();
        let target = layer(0.0);
        let tracer = Arc::new(CountingTracer::default());
        animator.register(
            &target,
            Some("pos"),
            tween_x(10.0)
                .repeat_count(3)
                .with_tracer(tracer.clone())
                .into_handle(),
        );

        // each completion cycle restarts at the frame that finished the
        // previous one, with bounds advanced forward by one span
        animator.render_at_time(0.0);
        animator.render_at_time(1.5); // cycle 2 starts here, 10..20
        animator.render_at_time(3.0); // cycle 3 starts here, 20..30
        animator.render_at_time(3.5);
        assert!((layer_x(&target) - 25.0).abs() < 1e-3);

        animator.render_at_time(5.0);
        assert_eq!(*tracer.starts.lock().unwrap(), 3);
        assert_eq!(*tracer.stops.lock().unwrap(), vec![true]);
        assert!(animator.keys_for(&target).is_empty());
        assert_eq!(animator.active_count(), 0);
        assert_eq!(layer_x(&target), 30.0);
    }

    #[test]
    fn test_autoreverse_symmetry() {
        let animator = Animator::new();
        let target = layer(0.0);
        let animation = tween_x(10.0)
            .repeat_count(2)
            .autoreverses(true)
            .removed_on_completion(false)
            .into_handle();
        animator.register(&target, Some("pos"), animation.clone());

        animator.render_at_time(0.0);
        animator.render_at_time(1.5); // mirrored cycle starts here, 10..0
        animator.render_at_time(2.0);
        assert!((layer_x(&target) - 5.0).abs() < 1e-3);

        animator.render_at_time(3.0);
        assert_eq!(layer_x(&target), 0.0);
        // bounds end restored to their original order
        let (from, to) = animation.bounds();
        assert_eq!(from, AnimValue::from(0.0));
        assert_eq!(to, AnimValue::from(10.0));
    }

    #[test]
    fn test_kept_on_completion_stays_registered() {
        let animator = Animator::new();
        let target = layer(0.0);
        let animation = tween_x(10.0).removed_on_completion(false).into_handle();
        animator.register(&target, Some("pos"), animation.clone());

        animator.render_at_time(2.0);

        assert!(!animation.is_active());
        assert!(animation.is_done());
        assert_eq!(animator.keys_for(&target), vec!["pos".to_string()]);
        assert_eq!(animator.active_count(), 1);

        // the finished item is gated, not advanced
        let writes = layer_writes(&target);
        animator.render_at_time(3.0);
        assert_eq!(layer_writes(&target), writes);
    }

    #[test]
    fn test_target_loss_cleanup() {
        let animator = Animator::new();
        let target = layer(0.0);
        let tracer = Arc::new(CountingTracer::default());
        animator.register(
            &target,
            Some("pos"),
            tween_x(10.0).with_tracer(tracer.clone()).into_handle(),
        );
        assert_eq!(animator.active_count(), 1);

        drop(target);
        animator.render_at_time(0.5);

        assert_eq!(animator.active_count(), 0);
        assert_eq!(*tracer.stops.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_decay_end_to_end() {
        let animator = Animator::new();
        let target = layer(0.0);
        animator.register(
            &target,
            Some("fling"),
            Animation::decay(
                "x",
                0.0.into(),
                AnimValue::from(1000.0),
                DecayConfig::default(),
            )
            .into_handle(),
        );

        let mut now = 0.0;
        while animator.active_count() > 0 && now < 20.0 {
            now += 1.0 / 60.0;
            animator.render_at_time(now);
        }

        assert_eq!(animator.active_count(), 0);
        assert!(layer_x(&target) > 0.0);
    }

    #[test]
    fn test_observer_order_and_delegate_wrapping() {
        let animator = Animator::new();
        let events: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));

        struct Recorder {
            name: &'static str,
            events: Arc<StdMutex<Vec<&'static str>>>,
        }
        impl AnimatorObserver for Recorder {
            fn on_will_animate(&self, _animator: &Animator) {
                self.events.lock().unwrap().push(self.name);
            }
            fn on_did_animate(&self, _animator: &Animator) {
                self.events.lock().unwrap().push(self.name);
            }
        }
        struct DelegateRecorder {
            events: Arc<StdMutex<Vec<&'static str>>>,
        }
        impl AnimatorDelegate for DelegateRecorder {
            fn on_will_animate(&self, _animator: &Animator) {
                self.events.lock().unwrap().push("delegate-will");
            }
            fn on_did_animate(&self, _animator: &Animator) {
                self.events.lock().unwrap().push("delegate-did");
            }
        }

        animator.set_delegate(Some(Arc::new(DelegateRecorder {
            events: events.clone(),
        })));
        animator.add_observer(Arc::new(Recorder {
            name: "first",
            events: events.clone(),
        }));
        animator.add_observer(Arc::new(Recorder {
            name: "second",
            events: events.clone(),
        }));

        animator.render_at_time(0.0);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "delegate-will",
                "first",
                "second",
                "first",
                "second",
                "delegate-did"
            ]
        );
    }

    #[test]
    fn test_remove_absent_observer_is_noop() {
        let animator = Animator::new();
        let observer: Arc<dyn AnimatorObserver> = Arc::new(CountingObserver::default());
        animator.remove_observer(&observer);
        animator.add_observer(observer.clone());
        animator.remove_observer(&observer);
        animator.remove_observer(&observer);
    }

    #[derive(Default)]
    struct CountingObserver {
        frames: StdMutex<u32>,
    }
    impl AnimatorObserver for CountingObserver {
        fn on_did_animate(&self, _animator: &Animator) {
            *self.frames.lock().unwrap() += 1;
        }
    }

    struct MockTimer {
        paused: AtomicBool,
    }
    impl MockTimer {
        fn new() -> Self {
            Self {
                paused: AtomicBool::new(true),
            }
        }
    }
    impl TimerSource for MockTimer {
        fn pause(&self) {
            self.paused.store(true, Ordering::Relaxed);
        }
        fn resume(&self) {
            self.paused.store(false, Ordering::Relaxed);
        }
        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn test_timer_pause_reflects_demand() {
        let animator = Animator::new();
        animator.set_timer_source(Some(Box::new(MockTimer::new())));

        let paused = |animator: &Animator| {
            animator
                .shared
                .timer
                .lock()
                .unwrap()
                .as_ref()
                .unwrap()
                .is_paused()
        };
        assert!(paused(&animator));

        let target = layer(0.0);
        animator.register(&target, Some("pos"), tween_x(10.0).into_handle());
        assert!(!paused(&animator));

        animator.unregister_all(&target);
        assert!(paused(&animator));

        let observer: Arc<dyn AnimatorObserver> = Arc::new(CountingObserver::default());
        animator.add_observer(observer.clone());
        assert!(!paused(&animator));

        animator.remove_observer(&observer);
        assert!(paused(&animator));

        // configuration wins over demand
        animator.add_observer(observer.clone());
        animator.set_timer_disabled(true);
        assert!(paused(&animator));
    }

    #[test]
    fn test_off_thread_ticks_coalesce() {
        let animator = Animator::new();
        let jobs: Arc<StdMutex<Vec<Box<dyn FnOnce() + Send>>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let sink = jobs.clone();
        animator.set_dispatcher(Some(Arc::new(move |job| sink.lock().unwrap().push(job))));

        let observer = Arc::new(CountingObserver::default());
        animator.add_observer(observer.clone());

        animator.clock_tick(0.1);
        animator.clock_tick(0.2);
        animator.clock_tick(0.3);
        // one hand-off outstanding; the extra ticks were dropped
        assert_eq!(jobs.lock().unwrap().len(), 1);

        let drained: Vec<_> = jobs.lock().unwrap().drain(..).collect();
        for job in drained {
            job();
        }
        assert_eq!(*observer.frames.lock().unwrap(), 1);

        // the hand-off completed; the next tick goes through again
        animator.clock_tick(0.4);
        assert_eq!(jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_coalescing_disabled_applies_inline() {
        let animator = Animator::new();
        animator.set_dispatcher(Some(Arc::new(|_job| {
            panic!("dispatcher must not be used when coalescing is disabled")
        })));
        animator.set_coalescing_disabled(true);

        let observer = Arc::new(CountingObserver::default());
        animator.add_observer(observer.clone());
        animator.clock_tick(0.1);
        assert_eq!(*observer.frames.lock().unwrap(), 1);
    }

    #[test]
    fn test_completion_can_reenter_animator() {
        let animator = Animator::new();
        let target = layer(0.0);
        animator.register(&target, Some("other"), tween_x(5.0).into_handle());

        let reentrant = animator.clone();
        let reentrant_target = target.clone();
        animator.register(
            &target,
            Some("pos"),
            Animation::tween("x", 0.0.into(), 1.0.into(), 0.5)
                .with_completion(move |_| reentrant.unregister(&reentrant_target, "other"))
                .into_handle(),
        );

        animator.render_at_time(1.0);

        assert!(animator.animation(&target, "other").is_none());
        assert!(animator.keys_for(&target).is_empty());
    }

    #[test]
    fn test_worked_scenario() {
        let animator = Animator::new();
        let jobs: Arc<StdMutex<Vec<Box<dyn FnOnce() + Send>>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let sink = jobs.clone();
        animator.set_commit_hook(Some(Arc::new(move |job| sink.lock().unwrap().push(job))));

        let target = layer(0.0);
        animator.register(&target, Some("pos"), tween_x(10.0).into_handle());
        assert_eq!(animator.keys_for(&target), vec!["pos".to_string()]);
        assert_eq!(animator.active_count(), 1);
        assert_eq!(animator.pending_count(), 1);

        // drain at t0: the animation starts, nothing is done yet
        let drained: Vec<_> = jobs.lock().unwrap().drain(..).collect();
        for job in drained {
            job();
        }
        assert_eq!(animator.pending_count(), 0);
        assert_eq!(animator.active_count(), 1);

        // next tick: advance, finish, deregister
        animator.render_at_time(animator.now() + 2.0);
        assert!(animator.keys_for(&target).is_empty());
        assert_eq!(animator.active_count(), 0);
        assert_eq!(layer_x(&target), 10.0);
    }

    #[test]
    fn test_shared_instance_is_process_wide() {
        let a = Animator::shared();
        let b = Animator::shared();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
