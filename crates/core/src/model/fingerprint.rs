//! Prime-product block fingerprinting.
//!
//! Each instruction contributes the odd prime selected by its coarse opcode
//! category; the block fingerprint is the wrapping product of those primes,
//! as described in "Graph-based Comparison of Executable Objects"
//! (Flake, SSTIC 2005). The product is commutative, so the fingerprint is
//! invariant to instruction order within a block and sensitive only to the
//! category multiset. Collisions are expected and tolerated.

use std::sync::OnceLock;

const SIEVE_LIMIT: usize = 1_000;

static ODD_PRIMES: OnceLock<Vec<u64>> = OnceLock::new();

fn sieve_odd_primes() -> Vec<u64> {
    let mut is_prime = vec![true; SIEVE_LIMIT];
    let mut primes = Vec::new();
    for x in 2..SIEVE_LIMIT as u64 {
        if is_prime[x as usize] {
            primes.push(x);
        }
        for &p in &primes {
            if x * p >= SIEVE_LIMIT as u64 {
                break;
            }
            is_prime[(x * p) as usize] = false;
        }
    }
    // drop 2; keep only odd primes
    primes.remove(0);
    primes
}

/// The odd prime assigned to a coarse opcode category.
///
/// The table is built once and shared read-only across threads. Categories
/// beyond the table length wrap around, so every value in the 256-wide
/// category space maps to a prime deterministically.
pub fn category_prime(category: u8) -> u64 {
    let primes = ODD_PRIMES.get_or_init(sieve_odd_primes);
    primes[category as usize % primes.len()]
}

/// Wrapping product of the category primes of a block's instructions.
///
/// Arithmetic is modulo 2^64; silent wraparound is accepted, not an error.
pub fn block_fingerprint<I>(categories: I) -> u64
where
    I: IntoIterator<Item = u8>,
{
    categories
        .into_iter()
        .fold(1u64, |acc, category| acc.wrapping_mul(category_prime(category)))
}
