use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Picks the next endpoint index for an attempt.
///
/// Callers never invoke a strategy with an empty endpoint set; empty
/// resolution is rejected before dispatch.
pub trait Strategy: Send {
    fn next_index(&mut self, len: usize) -> usize;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    Random,
}

impl StrategyKind {
    pub(crate) fn build(self) -> Box<dyn Strategy> {
        match self {
            Self::RoundRobin => Box::new(RoundRobin::new()),
            Self::Random => Box::new(Random::new()),
        }
    }
}

/// Walks the endpoint list in order. The starting offset is randomised so a
/// fleet of providers does not hammer endpoints in lock-step.
pub struct RoundRobin {
    position: usize,
}

// === impl RoundRobin ===

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            position: SmallRng::from_entropy().gen(),
        }
    }
}

impl Strategy for RoundRobin {
    fn next_index(&mut self, len: usize) -> usize {
        let index = self.position % len;
        self.position = self.position.wrapping_add(1);
        index
    }
}

/// Uniform random selection, seeded once at construction.
pub struct Random {
    rng: SmallRng,
}

// === impl Random ===

impl Random {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl Strategy for Random {
    fn next_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_all_endpoints() {
        let mut strategy = RoundRobin { position: 0 };
        let picks: Vec<usize> = (0..6).map(|_| strategy.next_index(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn random_stays_in_bounds() {
        let mut strategy = Random {
            rng: SmallRng::seed_from_u64(42),
        };
        for _ in 0..100 {
            assert!(strategy.next_index(3) < 3);
        }
    }

    #[test]
    fn round_robin_offset_wraps() {
        let mut strategy = RoundRobin {
            position: usize::MAX,
        };
        let first = strategy.next_index(2);
        let second = strategy.next_index(2);
        assert_ne!(first, second);
    }
}
