//! Per-target animator proxies
//!
//! An [`AnimatorProxy`] is a convenience handle scoped to one target: it
//! forwards add/remove/query calls to its animator and no-ops once the
//! target is gone. Proxies are cached weakly per target, so repeated
//! requests return the same instance and entries disappear with their
//! referents.

use std::sync::{Arc, Weak};

use impel_core::{Animatable, TargetId};

use crate::animation::AnimationHandle;
use crate::animator::Animator;

/// Lazily cached per-target handle onto an [`Animator`]
pub struct AnimatorProxy {
    animator: Animator,
    target: Weak<dyn Animatable>,
    target_id: TargetId,
}

impl AnimatorProxy {
    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    /// True while the proxied target is still referenced elsewhere
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Register `animation` on the proxied target; returns the key in use,
    /// or None once the target is gone
    pub fn add(&self, key: Option<&str>, animation: AnimationHandle) -> Option<String> {
        let target = self.target.upgrade()?;
        Some(self.animator.register(&target, key, animation))
    }

    pub fn remove(&self, key: &str) {
        if let Some(target) = self.target.upgrade() {
            self.animator.unregister(&target, key);
        }
    }

    pub fn remove_all(&self) {
        if let Some(target) = self.target.upgrade() {
            self.animator.unregister_all(&target);
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match self.target.upgrade() {
            Some(target) => self.animator.keys_for(&target),
            None => Vec::new(),
        }
    }

    pub fn animation(&self, key: &str) -> Option<AnimationHandle> {
        let target = self.target.upgrade()?;
        self.animator.animation(&target, key)
    }
}

impl Animator {
    /// The cached proxy for `target`, created on first request. Creation is
    /// idempotent: a second request for the same live target returns the
    /// existing instance. The cache keys weakly on both sides; dead entries
    /// are pruned opportunistically.
    pub fn proxy_for(&self, target: &Arc<dyn Animatable>) -> Arc<AnimatorProxy> {
        let target_id = TargetId::of(target);
        let mut inner = self.inner.lock().unwrap();
        inner.proxies.retain(|_, proxy| proxy.strong_count() > 0);
        if let Some(existing) = inner.proxies.get(&target_id).and_then(Weak::upgrade) {
            return existing;
        }
        let proxy = Arc::new(AnimatorProxy {
            animator: self.clone(),
            target: Arc::downgrade(target),
            target_id,
        });
        inner.proxies.insert(target_id, Arc::downgrade(&proxy));
        proxy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Animation;
    use impel_core::{AnimValue, Property, WriteFn};
    use std::any::Any;
    use std::sync::Mutex;

    struct Layer {
        x: Mutex<f32>,
    }

    impl Layer {
        fn new(x: f32) -> Self {
            Self { x: Mutex::new(x) }
        }
    }

    impl Animatable for Layer {
        fn property(&self, key_path: &str) -> Option<Property> {
            if key_path != "x" {
                return None;
            }
            let write: Option<WriteFn> = Some(Arc::new(|t: &dyn Animatable, v: &AnimValue| {
                let layer = t.as_any().downcast_ref::<Layer>().unwrap();
                *layer.x.lock().unwrap() = v.get(0);
            }));
            Some(Property::new("x", None, write))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn tween_x(to: f32) -> AnimationHandle {
        Animation::tween("x", 0.0.into(), to.into(), 1.0).into_handle()
    }

    #[test]
    fn test_proxy_idempotence() {
        let animator = Animator::new();
        let target: Arc<dyn Animatable> = Arc::new(Layer::new(0.0));

        let first = animator.proxy_for(&target);
        let second = animator.proxy_for(&target);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.target_id(), TargetId::of(&target));
    }

    #[test]
    fn test_proxy_forwards_to_animator() {
        let animator = Animator::new();
        let target: Arc<dyn Animatable> = Arc::new(Layer::new(0.0));
        let proxy = animator.proxy_for(&target);

        let key = proxy.add(Some("pos"), tween_x(10.0)).unwrap();
        assert_eq!(key, "pos");
        assert_eq!(proxy.keys(), vec!["pos".to_string()]);
        assert!(proxy.animation("pos").is_some());
        assert_eq!(animator.keys_for(&target), vec!["pos".to_string()]);

        proxy.remove("pos");
        assert!(proxy.keys().is_empty());

        proxy.add(None, tween_x(1.0));
        proxy.add(None, tween_x(2.0));
        proxy.remove_all();
        assert_eq!(animator.active_count(), 0);
    }

    #[test]
    fn test_proxy_entry_vanishes_with_target() {
        let animator = Animator::new();
        let target: Arc<dyn Animatable> = Arc::new(Layer::new(0.0));

        let proxy = animator.proxy_for(&target);
        assert!(proxy.is_alive());

        drop(target);
        assert!(!proxy.is_alive());
        assert!(proxy.add(Some("pos"), tween_x(1.0)).is_none());
        assert!(proxy.keys().is_empty());

        // a fresh target reuses nothing: the dead entry is pruned
        let fresh: Arc<dyn Animatable> = Arc::new(Layer::new(0.0));
        let fresh_proxy = animator.proxy_for(&fresh);
        assert!(!Arc::ptr_eq(&proxy, &fresh_proxy));
    }

    #[test]
    fn test_dropped_proxy_is_recreated() {
        let animator = Animator::new();
        let target: Arc<dyn Animatable> = Arc::new(Layer::new(0.0));

        let first = animator.proxy_for(&target);
        let first_id = first.target_id();
        drop(first);

        let second = animator.proxy_for(&target);
        assert_eq!(second.target_id(), first_id);
    }
}
