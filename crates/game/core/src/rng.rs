//! Deterministic session RNG.
//!
//! `random`/`randomInt` blocks draw from a PCG-XSH-RR generator owned by the
//! authoritative session. Determinism here is per-authority: clients never
//! draw, they receive the resulting state, so no cross-host seed agreement
//! is needed.

/// PCG random number generator (Permuted Congruential Generator).
///
/// PCG-XSH-RR produces 32-bit output from 64-bit state with a single
/// multiply, an xorshift, and a rotate. Same seed, same sequence.
#[derive(Clone, Copy, Debug)]
pub struct SessionRng {
    state: u64,
}

impl SessionRng {
    const MULTIPLIER: u64 = 6364136223846793005;
    const INCREMENT: u64 = 1442695040888963407;

    pub fn new(seed: u64) -> Self {
        // One warm-up step so trivial seeds (0, 1, ...) diverge immediately.
        let mut rng = Self { state: seed };
        rng.next_u32();
        rng
    }

    /// Draws the next 32-bit value and advances the state.
    pub fn next_u32(&mut self) -> u32 {
        let state = self.state;
        self.state = state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);

        let xorshifted = (((state >> 18) ^ state) >> 27) as u32;
        let rot = (state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Uniform draw from `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        // 53 significant bits, the full precision of an f64 mantissa.
        let bits = (high << 21) ^ (low >> 11);
        (bits & ((1 << 53) - 1)) as f64 / (1u64 << 53) as f64
    }

    /// Uniform draw from `[min, max)`. Degenerate ranges return `min`.
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        if !(max > min) {
            return min;
        }
        min + self.next_f64() * (max - min)
    }

    /// Uniform integer draw from `[min, max]` inclusive.
    pub fn range_i64(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        let draw = (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32());
        // Span arithmetic stays in u64 so bounds like `i64::MIN..=i64::MAX`
        // cannot overflow the signed difference.
        let span = max.wrapping_sub(min) as u64;
        let Some(buckets) = span.checked_add(1) else {
            return draw as i64;
        };
        min.wrapping_add((draw % buckets) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SessionRng::new(42);
        let mut b = SessionRng::new(42);
        for _ in 0..32 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn range_bounds_hold() {
        let mut rng = SessionRng::new(7);
        for _ in 0..1000 {
            let x = rng.range_f64(2.0, 5.0);
            assert!((2.0..5.0).contains(&x));
            let n = rng.range_i64(1, 6);
            assert!((1..=6).contains(&n));
        }
    }

    #[test]
    fn extreme_integer_bounds_stay_in_range() {
        let mut rng = SessionRng::new(9);
        for _ in 0..100 {
            // The full i64 range must not panic on span arithmetic.
            let _ = rng.range_i64(i64::MIN, i64::MAX);
            let lo = i64::MIN / 2 - 1;
            let hi = i64::MAX / 2 + 1;
            let n = rng.range_i64(lo, hi);
            assert!((lo..=hi).contains(&n));
        }
    }

    #[test]
    fn degenerate_ranges_return_min() {
        let mut rng = SessionRng::new(1);
        assert_eq!(rng.range_i64(3, 3), 3);
        assert_eq!(rng.range_f64(4.0, 4.0), 4.0);
    }
}
