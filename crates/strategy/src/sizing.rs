//! Confidence-scaled position sizing.

use rust_decimal::Decimal;

/// Scales the base order quantity by aggregate confidence and caps it at the
/// remaining headroom under `max_position`.
///
/// A confidence of 0 trades half the base size, a confidence of 1 trades the
/// full base size. The result is never negative.
#[must_use]
pub fn confidence_scaled_size(
    base_size: Decimal,
    confidence: f64,
    max_position: Decimal,
    current_abs_size: Decimal,
) -> Decimal {
    let confidence = confidence.clamp(0.0, 1.0);
    let scale = Decimal::try_from(0.5 + 0.5 * confidence).unwrap_or(Decimal::ONE);
    let scaled = base_size * scale;
    let headroom = (max_position - current_abs_size).max(Decimal::ZERO);
    scaled.min(headroom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn full_confidence_trades_base_size() {
        let size = confidence_scaled_size(dec!(0.01), 1.0, dec!(0.05), dec!(0));
        assert_eq!(size, dec!(0.01));
    }

    #[test]
    fn zero_confidence_trades_half_base_size() {
        let size = confidence_scaled_size(dec!(0.01), 0.0, dec!(0.05), dec!(0));
        assert_eq!(size, dec!(0.005));
    }

    #[test]
    fn mid_confidence_interpolates() {
        let size = confidence_scaled_size(dec!(0.01), 0.5, dec!(0.05), dec!(0));
        assert_eq!(size, dec!(0.0075));
    }

    #[test]
    fn capped_by_remaining_headroom() {
        let size = confidence_scaled_size(dec!(0.01), 1.0, dec!(0.05), dec!(0.045));
        assert_eq!(size, dec!(0.005));
    }

    #[test]
    fn zero_headroom_yields_zero() {
        let size = confidence_scaled_size(dec!(0.01), 0.8, dec!(0.05), dec!(0.05));
        assert_eq!(size, Decimal::ZERO);
    }

    #[test]
    fn never_negative_when_over_cap() {
        let size = confidence_scaled_size(dec!(0.01), 0.8, dec!(0.05), dec!(0.06));
        assert_eq!(size, Decimal::ZERO);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let size = confidence_scaled_size(dec!(0.01), 7.0, dec!(0.05), dec!(0));
        assert_eq!(size, dec!(0.01));
    }
}
