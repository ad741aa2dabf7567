//! Exact-decimal money math shared by the ledger and the session orchestrator.
//!
//! All monetary values use [`rust_decimal::Decimal`] at 2-decimal precision; floating point
//! is never used for money anywhere in this crate.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

/// Number of whole minutes billed for a session that ran `duration_seconds` seconds.
/// Billing rounds up to the next started minute; a session of 0 or 1 seconds still bills
/// one minute (anti-abuse, preserved per the source behaviour).
pub fn minutes_billed(duration_seconds: i64) -> i64 {
    let duration_seconds = duration_seconds.max(1);
    (duration_seconds + 59) / 60
}

/// The minimum client balance required to start a session at the given per-minute rate:
/// one minute of charge plus two minutes of slack to absorb ring/connect time.
pub fn reserve_for_rate(rate_per_min: Decimal) -> Decimal {
    rate_per_min * Decimal::from(3)
}

/// A session's computed charge split: total, platform fee (half-even rounded), and the
/// reader's earnings derived by subtraction so `fee + earnings == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeSplit {
    /// Total amount charged for the session.
    pub total_amount: Decimal,
    /// Platform's retained share.
    pub platform_fee: Decimal,
    /// Reader's share, credited to their pending balance.
    pub reader_earnings: Decimal,
}

/// Computes total/fee/earnings for a session billed `minutes` at `rate_per_min`, with the
/// platform retaining `fee_fraction` of the total (half-even rounded to 2 decimals).
pub fn compute_charge(minutes: i64, rate_per_min: Decimal, fee_fraction: Decimal) -> ChargeSplit {
    let total_amount = round2(rate_per_min * Decimal::from(minutes));
    let platform_fee = round2_half_even(total_amount * fee_fraction);
    let reader_earnings = total_amount - platform_fee;
    ChargeSplit {
        total_amount,
        platform_fee,
        reader_earnings,
    }
}

/// Scales a charge split down to whatever the client's balance could actually cover,
/// preserving the fee/earnings proportion on the reduced total.
pub fn scale_charge(split: ChargeSplit, charged: Decimal) -> ChargeSplit {
    if charged >= split.total_amount {
        return split;
    }
    if split.total_amount.is_zero() {
        return ChargeSplit {
            total_amount: charged,
            platform_fee: Decimal::ZERO,
            reader_earnings: Decimal::ZERO,
        };
    }
    let ratio = charged / split.total_amount;
    let platform_fee = round2_half_even(split.platform_fee * ratio);
    let reader_earnings = charged - platform_fee;
    ChargeSplit {
        total_amount: charged,
        platform_fee,
        reader_earnings,
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp(2)
}

fn round2_half_even(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn one_second_bills_one_minute() {
        assert_eq!(minutes_billed(1), 1);
    }

    #[test]
    fn zero_seconds_bills_one_minute() {
        assert_eq!(minutes_billed(0), 1);
    }

    #[test]
    fn sixty_one_seconds_bills_two_minutes() {
        assert_eq!(minutes_billed(61), 2);
    }

    #[test]
    fn exactly_sixty_seconds_bills_one_minute() {
        assert_eq!(minutes_billed(60), 1);
    }

    #[test]
    fn reserve_is_three_times_the_rate() {
        assert_eq!(reserve_for_rate(dec!(1.50)), dec!(4.50));
    }

    #[test]
    fn charge_split_preserves_fee_plus_earnings_equals_total() {
        let split = compute_charge(2, dec!(1.50), dec!(0.30));
        assert_eq!(split.total_amount, dec!(3.00));
        assert_eq!(split.platform_fee, dec!(0.90));
        assert_eq!(split.reader_earnings, dec!(2.10));
        assert_eq!(split.platform_fee + split.reader_earnings, split.total_amount);
    }

    #[test]
    fn partial_settlement_scales_proportionally() {
        let split = compute_charge(1, dec!(1.50), dec!(0.30));
        assert_eq!(split.total_amount, dec!(1.50));
        let scaled = scale_charge(split, dec!(1.00));
        assert_eq!(scaled.total_amount, dec!(1.00));
        assert_eq!(scaled.platform_fee, dec!(0.30));
        assert_eq!(scaled.reader_earnings, dec!(0.70));
    }

    #[test]
    fn scaling_above_total_is_a_no_op() {
        let split = compute_charge(1, dec!(1.50), dec!(0.30));
        let scaled = scale_charge(split, dec!(100));
        assert_eq!(scaled, split);
    }
}
