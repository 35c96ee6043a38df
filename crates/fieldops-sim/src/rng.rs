use serde::{Deserialize, Serialize};

/// Seeded generator for operator choices and fault injection.
///
/// SplitMix64: small, reproducible on every platform, and good enough to
/// spread choices across a handful of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Independent stream for a sub-component, stable for a given seed.
    #[must_use]
    pub const fn fork(&self, stream: u64) -> Self {
        Self::new(self.state ^ stream.wrapping_mul(0xA24B_AED4_963E_E407))
    }

    #[must_use]
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Value in `[0, upper)`; zero when `upper` is zero.
    #[must_use]
    pub const fn below(&mut self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.next_u64() % upper
    }

    /// Index into a collection of `len` items.
    #[must_use]
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let len = u64::try_from(len).unwrap_or(u64::MAX);
        usize::try_from(self.below(len)).ok()
    }

    #[must_use]
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.index(items.len()).and_then(|i| items.get(i))
    }

    /// Bernoulli trial with integer percent.
    #[must_use]
    pub fn chance(&mut self, percent: u8) -> bool {
        match percent {
            0 => false,
            100.. => true,
            _ => self.below(100) < u64::from(percent),
        }
    }

    /// Up to `max` distinct items, in their original order.
    #[must_use]
    pub fn sample<T: Clone>(&mut self, items: &[T], max: usize) -> Vec<T> {
        let mut picked: Vec<T> = items
            .iter()
            .filter(|_| self.chance(50))
            .cloned()
            .collect();
        picked.truncate(max);
        if picked.is_empty() {
            picked.extend(self.pick(items).cloned());
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = DeterministicRng::new(7);
        let mut b = DeterministicRng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn forks_diverge() {
        let root = DeterministicRng::new(7);
        let mut a = root.fork(1);
        let mut b = root.fork(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn chance_extremes() {
        let mut rng = DeterministicRng::new(1);
        assert!((0..100).all(|_| !rng.chance(0)));
        assert!((0..100).all(|_| rng.chance(100)));
    }

    #[test]
    fn sample_is_never_empty_for_nonempty_input() {
        let mut rng = DeterministicRng::new(3);
        let items = ["a", "b", "c"];
        for _ in 0..50 {
            let picked = rng.sample(&items, 2);
            assert!(!picked.is_empty());
            assert!(picked.len() <= 2);
        }
        assert!(rng.sample::<&str>(&[], 2).is_empty());
        assert_eq!(rng.pick::<u8>(&[]), None);
    }
}
