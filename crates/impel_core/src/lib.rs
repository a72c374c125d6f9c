//! Impel Core
//!
//! Foundational types for the Impel animation engine:
//!
//! - **Value Model**: [`AnimValue`], the small vector of components every
//!   curve integrates and every target reads/writes
//! - **Target Capabilities**: the [`Animatable`] trait, resolving string key
//!   paths into [`Property`] read/write capability pairs
//! - **Identity**: [`TargetId`], an address-sized token that stays valid for
//!   comparison after its target is gone
//!
//! This crate has no knowledge of curves or scheduling; those live in
//! `impel_animation`.

pub mod error;
pub mod property;
pub mod value;

pub use error::{PropertyError, Result};
pub use property::{resolve_property, Animatable, Property, ReadFn, TargetId, WriteFn};
pub use value::AnimValue;
