//! Binomial confidence intervals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side(s) of the interval are bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    TwoSided,
    /// One-sided interval `[low, 1]`.
    Greater,
}

/// Confidence interval for the success probability of a binomial sample.
pub trait BinomialInterval: fmt::Debug + Send + Sync {
    /// `(low, high)` for `successes` out of `trials` at `confidence`.
    ///
    /// `trials` must be positive.
    fn interval(
        &self,
        successes: u64,
        trials: u64,
        confidence: f64,
        alternative: Alternative,
    ) -> (f64, f64);
}

/// Exact (Clopper-Pearson) interval, found by bisection on the binomial tail.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClopperPearson;

const BISECTION_STEPS: usize = 100;

impl BinomialInterval for ClopperPearson {
    fn interval(
        &self,
        successes: u64,
        trials: u64,
        confidence: f64,
        alternative: Alternative,
    ) -> (f64, f64) {
        let k = successes.min(trials);
        let n = trials;
        let alpha = 1.0 - confidence;
        let tail = match alternative {
            Alternative::TwoSided => alpha / 2.0,
            Alternative::Greater => alpha,
        };

        let low = if k == 0 {
            0.0
        } else {
            // P(X >= k | p) grows with p.
            bisect(|p| upper_tail(n, k, p) >= tail)
        };
        let high = match alternative {
            Alternative::Greater => 1.0,
            Alternative::TwoSided if k == n => 1.0,
            // P(X <= k | p) shrinks with p.
            Alternative::TwoSided => bisect(|p| lower_tail(n, k, p) <= tail),
        };
        (low, high)
    }
}

/// Smallest `p` in `[0, 1]` for which the monotone predicate holds.
fn bisect(holds: impl Fn(f64) -> bool) -> f64 {
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if holds(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// `P(X <= k)` for `X ~ Binomial(n, p)`.
fn lower_tail(n: u64, k: u64, p: f64) -> f64 {
    tail_sum(n, p, 0, k)
}

/// `P(X >= k)` for `X ~ Binomial(n, p)`.
fn upper_tail(n: u64, k: u64, p: f64) -> f64 {
    tail_sum(n, p, k, n)
}

/// Sum of the binomial pmf over `from..=to`, accumulated in log space.
fn tail_sum(n: u64, p: f64, from: u64, to: u64) -> f64 {
    if p <= 0.0 {
        return if from == 0 { 1.0 } else { 0.0 };
    }
    if p >= 1.0 {
        return if to == n { 1.0 } else { 0.0 };
    }
    let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());

    let mut ln_choose = 0.0;
    let mut terms = Vec::with_capacity((to - from + 1) as usize);
    for i in 0..=to {
        if i > 0 {
            ln_choose += ((n - i + 1) as f64).ln() - (i as f64).ln();
        }
        if i >= from {
            terms.push(ln_choose + i as f64 * ln_p + (n - i) as f64 * ln_q);
        }
    }

    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = terms.iter().map(|t| (t - max).exp()).sum();
    (max + sum.ln()).exp().min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-4
    }

    #[test]
    fn test_two_sided_symmetric() {
        let (low, high) = ClopperPearson.interval(5, 10, 0.95, Alternative::TwoSided);
        assert!(close(low, 0.187086), "low = {low}");
        assert!(close(high, 0.812914), "high = {high}");
    }

    #[test]
    fn test_all_successes_greater() {
        let (low, high) = ClopperPearson.interval(10, 10, 0.95, Alternative::Greater);
        assert!(close(low, 0.05_f64.powf(0.1)), "low = {low}");
        assert_eq!(high, 1.0);
    }

    #[test]
    fn test_no_successes() {
        let (low, high) = ClopperPearson.interval(0, 10, 0.95, Alternative::TwoSided);
        assert_eq!(low, 0.0);
        assert!(close(high, 1.0 - 0.025_f64.powf(0.1)), "high = {high}");
    }

    #[test]
    fn test_tail_sums_to_one() {
        let total = lower_tail(20, 7, 0.3) + upper_tail(20, 8, 0.3);
        assert!((total - 1.0).abs() < 1e-12);
    }
}
