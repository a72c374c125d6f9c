//! Impel Animation Engine
//!
//! Frame-synchronized property animation for live objects:
//!
//! - **Curves**: RK4 spring physics, exponential decay, eased tweens, and
//!   custom time functions
//! - **Scheduling**: one [`Animator`] maps (target, key) pairs to
//!   animations, drives them from a display refresh signal, and retires them
//!   on completion
//! - **Deferred Commit**: registrations coalesce into a single pending drain
//!   applied just before the host's next commit point
//! - **Concurrency**: animations may be added, removed, or replaced from any
//!   thread, including from within per-frame callbacks
//!
//! # Example
//!
//! ```ignore
//! use impel_animation::{Animation, Animator, SpringConfig};
//!
//! let animator = Animator::shared();
//! let slide = Animation::spring("x", 0.0.into(), 240.0.into(), SpringConfig::stiff())
//!     .into_handle();
//! animator.register(&layer, Some("slide"), slide);
//! animator.start_timer(120);
//! ```

pub mod animation;
pub mod animator;
pub mod clock;
pub mod decay;
pub mod easing;
pub mod proxy;
pub mod spring;

pub use animation::{
    Animation, AnimationHandle, AnimationTracer, ApplyFn, CompletionFn, Curve,
};
pub use animator::{
    Animator, AnimatorDelegate, AnimatorObserver, CommitHookFn, DispatchFn,
};
pub use clock::{DisplayTimer, TimerSource};
pub use decay::{Decay, DecayConfig};
pub use easing::Easing;
pub use proxy::AnimatorProxy;
pub use spring::{Spring, SpringConfig};

// Re-export the core value and capability types alongside the engine
pub use impel_core::{AnimValue, Animatable, Property, PropertyError, TargetId};
