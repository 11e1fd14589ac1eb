//! Field axes and per-axis containers.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// One of the three orthogonal coil pairs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize, Deserialize,
)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// In-plane axes driven by the trig tables.
    pub const XY: [Axis; 2] = [Axis::X, Axis::Y];
}

/// One value per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisSet<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T> AxisSet<T> {
    pub fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    /// Build a set by calling `f` for X, Y, Z in that order.
    pub fn from_fn(mut f: impl FnMut(Axis) -> T) -> Self {
        let x = f(Axis::X);
        let y = f(Axis::Y);
        let z = f(Axis::Z);
        Self { x, y, z }
    }

    pub fn map<U>(self, mut f: impl FnMut(Axis, T) -> U) -> AxisSet<U> {
        AxisSet {
            x: f(Axis::X, self.x),
            y: f(Axis::Y, self.y),
            z: f(Axis::Z, self.z),
        }
    }

    pub fn as_ref(&self) -> AxisSet<&T> {
        AxisSet {
            x: &self.x,
            y: &self.y,
            z: &self.z,
        }
    }

    /// `(axis, value)` pairs in X, Y, Z order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &T)> {
        [(Axis::X, &self.x), (Axis::Y, &self.y), (Axis::Z, &self.z)].into_iter()
    }

    pub fn into_array(self) -> [(Axis, T); 3] {
        [(Axis::X, self.x), (Axis::Y, self.y), (Axis::Z, self.z)]
    }
}

impl<T> AxisSet<Option<T>> {
    /// Set with no entry on any axis.
    pub fn none() -> Self {
        Self {
            x: None,
            y: None,
            z: None,
        }
    }

    /// Number of axes with an entry.
    pub fn count(&self) -> usize {
        self.iter().filter(|(_, v)| v.is_some()).count()
    }
}

impl<T> Index<Axis> for AxisSet<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

impl<T> IndexMut<Axis> for AxisSet<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}
