//! Animatable value model
//!
//! [`AnimValue`] is the raw currency exchanged between curves, animations,
//! and targets: a small vector of `f32` components (a scalar, a point, a
//! size, a color) with the component-wise math the integrators need.
//! Components are stored inline for up to four entries, which covers every
//! common animatable property without touching the heap.

use smallvec::SmallVec;

/// Inline component capacity; rect- and color-sized values fit without
/// spilling.
const INLINE_COMPONENTS: usize = 4;

/// A fixed-arity vector of animatable components.
///
/// Component-wise operations require both operands to have the same arity;
/// mixing arities is a programmer error and debug-asserts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimValue {
    components: SmallVec<[f32; INLINE_COMPONENTS]>,
}

impl AnimValue {
    /// Create a value from a slice of components
    pub fn new(components: &[f32]) -> Self {
        Self {
            components: SmallVec::from_slice(components),
        }
    }

    /// A value of `len` zeroed components
    pub fn zero(len: usize) -> Self {
        Self {
            components: std::iter::repeat(0.0).take(len).collect(),
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True if the value has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Borrow the components
    pub fn components(&self) -> &[f32] {
        &self.components
    }

    /// Component at `index`, or 0.0 when out of range
    pub fn get(&self, index: usize) -> f32 {
        self.components.get(index).copied().unwrap_or(0.0)
    }

    /// Linearly interpolate between self and other by factor t (0.0 to 1.0)
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        debug_assert_eq!(self.len(), other.len());
        Self {
            components: self
                .components
                .iter()
                .zip(&other.components)
                .map(|(a, b)| a + (b - a) * t)
                .collect(),
        }
    }

    /// Component-wise sum
    pub fn add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.len(), other.len());
        Self {
            components: self
                .components
                .iter()
                .zip(&other.components)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }

    /// Component-wise difference (self − other)
    pub fn sub(&self, other: &Self) -> Self {
        debug_assert_eq!(self.len(), other.len());
        Self {
            components: self
                .components
                .iter()
                .zip(&other.components)
                .map(|(a, b)| a - b)
                .collect(),
        }
    }

    /// Scale every component by `factor`
    pub fn scale(&self, factor: f32) -> Self {
        Self {
            components: self.components.iter().map(|c| c * factor).collect(),
        }
    }

    /// Negate every component
    pub fn negate(&self) -> Self {
        self.scale(-1.0)
    }

    /// Check if two values are approximately equal (for settling detection)
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.len() == other.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| (a - b).abs() < epsilon)
    }

    /// True when every component is exactly zero
    pub fn is_zero(&self) -> bool {
        self.components.iter().all(|c| *c == 0.0)
    }

    /// Largest component magnitude
    pub fn max_abs(&self) -> f32 {
        self.components.iter().fold(0.0f32, |m, c| m.max(c.abs()))
    }
}

impl From<f32> for AnimValue {
    fn from(v: f32) -> Self {
        Self::new(&[v])
    }
}

impl From<[f32; 2]> for AnimValue {
    fn from(v: [f32; 2]) -> Self {
        Self::new(&v)
    }
}

impl From<[f32; 3]> for AnimValue {
    fn from(v: [f32; 3]) -> Self {
        Self::new(&v)
    }
}

impl From<[f32; 4]> for AnimValue {
    fn from(v: [f32; 4]) -> Self {
        Self::new(&v)
    }
}

impl From<&[f32]> for AnimValue {
    fn from(v: &[f32]) -> Self {
        Self::new(v)
    }
}
