/// Strict majority of `n` participants. Exactly half is not a majority.
pub fn is_majority(count: usize, n: usize) -> bool {
    2 * count > n
}

/// Smallest count that satisfies [`is_majority`].
pub fn majority_size(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_half_is_not_majority() {
        assert!(!is_majority(2, 4));
        assert!(is_majority(3, 4));
        assert!(!is_majority(3, 6));
        assert!(is_majority(4, 6));
    }

    #[test]
    fn test_odd_sizes() {
        assert!(!is_majority(1, 3));
        assert!(is_majority(2, 3));
        assert!(is_majority(1, 1));
        assert!(!is_majority(0, 1));
    }

    #[test]
    fn test_majority_size_matches_rule() {
        for n in 1..20 {
            let m = majority_size(n);
            assert!(is_majority(m, n));
            assert!(!is_majority(m - 1, n));
        }
    }
}
