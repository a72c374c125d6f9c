//! Target capabilities and identity
//!
//! Targets are live objects that opt into animation by resolving string key
//! paths into [`Property`] capability pairs. The engine holds targets weakly
//! and identifies them by [`TargetId`], an address-sized token that remains
//! valid for comparison and hashing after the target itself is gone.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{PropertyError, Result};
use crate::value::AnimValue;

/// Read capability: produce the target's current committed value.
pub type ReadFn = Arc<dyn Fn(&dyn Animatable) -> AnimValue + Send + Sync>;

/// Write capability: commit a value to the target.
pub type WriteFn = Arc<dyn Fn(&dyn Animatable, &AnimValue) + Send + Sync>;

/// Default settling threshold for properties that don't specify one.
pub const DEFAULT_THRESHOLD: f32 = 0.01;

/// A named pair of read/write capabilities bound to a target type.
///
/// Either capability may be absent: an animation whose property cannot write
/// silently drops its values, and one that cannot read skips read-dependent
/// steps (additive composition, redundant-write suppression).
#[derive(Clone)]
pub struct Property {
    name: String,
    read: Option<ReadFn>,
    write: Option<WriteFn>,
    threshold: f32,
}

impl Property {
    /// Create a property from capability closures
    pub fn new(name: impl Into<String>, read: Option<ReadFn>, write: Option<WriteFn>) -> Self {
        Self {
            name: name.into(),
            read,
            write,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Override the settling threshold used by physics curves
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// The key path this property was resolved from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settling threshold for this property
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }

    /// Read the target's current committed value, if a read capability exists
    pub fn read(&self, target: &dyn Animatable) -> Option<AnimValue> {
        self.read.as_ref().map(|f| f(target))
    }

    /// Write `value` to the target. Returns false when no write capability
    /// exists (the value is dropped).
    pub fn write(&self, target: &dyn Animatable, value: &AnimValue) -> bool {
        match &self.write {
            Some(f) => {
                f(target, value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// A live object whose properties can be animated.
///
/// Implementors resolve key paths into capability pairs; resolution happens
/// once at registration time and the result is cached on the animation, so
/// the lookup cost is never paid per frame.
pub trait Animatable: Any + Send + Sync {
    /// Resolve a key path into a capability pair, or None if the target does
    /// not expose it.
    fn property(&self, key_path: &str) -> Option<Property>;

    /// Downcast support for capability closures
    fn as_any(&self) -> &dyn Any;
}

/// Resolve `key_path` against `target`, distinguishing the failure causes.
///
/// Callers that treat failure as a silent no-op log the error and move on;
/// the typed cause exists for diagnostics, not control flow.
pub fn resolve_property(target: &dyn Animatable, key_path: &str) -> Result<Property> {
    let property = target
        .property(key_path)
        .ok_or_else(|| PropertyError::UnknownKeyPath(key_path.to_string()))?;
    if !property.has_read() && !property.has_write() {
        return Err(PropertyError::NoCapabilities(key_path.to_string()));
    }
    Ok(property)
}

/// Address-sized identity token for a (possibly gone) target.
///
/// The token is the address of the target's allocation. Holding the `Weak`
/// the token was derived from keeps that allocation (not the target value)
/// alive, so the token stays unique among live registrations even after the
/// target is dropped. It is only ever compared and hashed, never
/// dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TargetId(usize);

impl TargetId {
    /// Identity of a live target
    pub fn of(target: &Arc<dyn Animatable>) -> Self {
        Self(Arc::as_ptr(target) as *const () as usize)
    }

    /// Identity of a weakly-held target; valid whether or not the referent
    /// is still alive.
    pub fn of_weak(target: &Weak<dyn Animatable>) -> Self {
        Self(target.as_ptr() as *const () as usize)
    }
}
