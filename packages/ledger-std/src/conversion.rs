use crate::SCALE;

/// `points * SCALE / points_to_well_rate`, truncating toward zero.
///
/// Returns `None` for a zero rate or when the result does not fit a token amount.
pub fn points_to_tokens(points: u64, points_to_well_rate: u64) -> Option<u64> {
    match points_to_well_rate {
        0 => None,
        rate => u64::try_from(points as u128 * SCALE as u128 / rate as u128).ok(),
    }
}

/// `amount * rate / SCALE`, the points value of a token amount at `rate` points per token.
pub fn tokens_to_points(amount: u64, rate: u64) -> Option<u64> {
    u64::try_from(amount as u128 * rate as u128 / SCALE as u128).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_to_tokens_truncates() {
        assert_eq!(points_to_tokens(250, 100), Some(2_500_000_000));
        assert_eq!(points_to_tokens(1, 3), Some(333_333_333));
        assert_eq!(points_to_tokens(0, 100), Some(0));
    }

    #[test]
    fn points_to_tokens_is_pure() {
        assert_eq!(points_to_tokens(12_345, 7), points_to_tokens(12_345, 7));
    }

    #[test]
    fn points_to_tokens_rejects_zero_rate() {
        assert_eq!(points_to_tokens(100, 0), None);
    }

    #[test]
    fn points_to_tokens_overflow() {
        assert_eq!(points_to_tokens(u64::MAX, 1), None);
    }

    #[test]
    fn tokens_to_points_inverse_at_same_rate() {
        assert_eq!(tokens_to_points(2_500_000_000, 100), Some(250));
        assert_eq!(tokens_to_points(1, 100), Some(0));
    }
}
