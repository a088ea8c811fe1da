//! Random flips applied to training items.

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chance of each flip axis firing for a training item.
pub const DEFAULT_FLIP_PROB: f64 = 0.5;

/// RNG for one item draw: seeded per item and epoch when a seed is given, else from entropy.
pub fn item_rng(seed: Option<u64>, index: usize, epoch: u64) -> StdRng {
    match seed {
        Some(seed) => {
            let mixed = seed ^ (index as u64) ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            StdRng::seed_from_u64(mixed)
        }
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Which axes to flip. The same plan must be applied to an item's input and its label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlipPlan {
    pub vertical: bool,
    pub horizontal: bool,
}

impl FlipPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn sample(rng: &mut impl Rng, prob: f64) -> Self {
        Self {
            vertical: rng.random_bool(prob),
            horizontal: rng.random_bool(prob),
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.vertical && !self.horizontal
    }

    /// Flip a (rows, cols, channels) array.
    pub fn apply3<T>(&self, arr: &mut Array3<T>) {
        if self.vertical {
            arr.invert_axis(Axis(0));
        }
        if self.horizontal {
            arr.invert_axis(Axis(1));
        }
    }

    pub fn apply2<T>(&self, arr: &mut Array2<T>) {
        if self.vertical {
            arr.invert_axis(Axis(0));
        }
        if self.horizontal {
            arr.invert_axis(Axis(1));
        }
    }
}
