//! Id generation strategies for documents posted without an `id`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{IdGenerator, ResponseId};

/// Width of generated ids, matching keys like `1025655242481777`.
pub const GENERATED_ID_DIGITS: usize = 16;

/// Takes the leading decimal digits of a random UUID v4 read as an integer.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> ResponseId {
        // A v4 uuid has its version bits set, so the integer always has 24+ digits.
        let digits = uuid::Uuid::new_v4().as_u128().to_string();
        let lead: String = digits.chars().take(GENERATED_ID_DIGITS).collect();
        ResponseId::new(lead).unwrap_or_else(|_| fallback_id())
    }
}

/// Deterministic generator counting up from a seed; zero-padded to
/// [`GENERATED_ID_DIGITS`].
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> ResponseId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let s = format!("{:0width$}", n, width = GENERATED_ID_DIGITS);
        ResponseId::new(s).unwrap_or_else(|_| fallback_id())
    }
}

fn fallback_id() -> ResponseId {
    ResponseId("0".repeat(GENERATED_ID_DIGITS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_have_sixteen_digits() {
        let g = RandomIdGenerator::new();
        for _ in 0..32 {
            let id = g.next_id();
            assert_eq!(id.as_str().len(), GENERATED_ID_DIGITS);
            assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn sequential_ids_are_padded_and_increasing() {
        let g = SequentialIdGenerator::new(7);
        assert_eq!(g.next_id().as_str(), "0000000000000007");
        assert_eq!(g.next_id().as_str(), "0000000000000008");
    }
}
