//! Action spaces.

pub mod space;

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

pub use space::Space;

/// A Box-like space with element type `T` and fixed compile-time length `N`.
/// Uses per-dimension inclusive lower/upper bounds for validation and sampling.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxSpace<T: Copy + PartialOrd, const N: usize> {
    low: [T; N],
    high: [T; N],
}

impl<T: Copy + PartialOrd, const N: usize> BoxSpace<T, N> {
    pub fn new(low: [T; N], high: [T; N]) -> Self {
        for i in 0..N {
            assert!(low[i] <= high[i], "low[{i}] > high[{i}]");
        }
        Self { low, high }
    }

    pub fn low(&self) -> &[T; N] { &self.low }
    pub fn high(&self) -> &[T; N] { &self.high }
}

impl<T, const N: usize> Space for BoxSpace<T, N>
where
    T: Copy + PartialOrd + rand::distributions::uniform::SampleUniform,
{
    type Element = [T; N];

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Element {
        let mut arr = self.low;
        for i in 0..N {
            let dist = Uniform::new_inclusive(self.low[i], self.high[i]);
            arr[i] = dist.sample(rng);
        }
        arr
    }

    fn contains(&self, elem: &Self::Element) -> bool {
        (0..N).all(|i| self.low[i] <= elem[i] && elem[i] <= self.high[i])
    }
}
