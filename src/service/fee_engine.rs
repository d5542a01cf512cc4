//! 费用引擎
//!
//! 纯函数：不做任何I/O。各费用分量以足够精度计算，
//! 仅在结果记录上舍入到两位小数（远离零的四舍五入），
//! 并保证舍入后恒等式成立：
//! - inclusive: usdc_sent + total == amount
//! - additive:  total_charged - total == amount

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::domain::payment::{Corridor, FeeBreakdown, FeeHandling, PaymentMethod};

/// 单笔金额下限（USD）
pub const MIN_AMOUNT: Decimal = Decimal::from_parts(1000, 0, 0, false, 2); // 10.00
/// 单笔金额上限（USD）
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 2); // 10000.00

/// 平台费基数 2.99
const PLATFORM_BASE: Decimal = Decimal::from_parts(299, 0, 0, false, 2);
/// 平台费比例 0.5%
const PLATFORM_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);
/// 平台费下限 0.99
const PLATFORM_MIN: Decimal = Decimal::from_parts(99, 0, 0, false, 2);
/// 平台费上限 50.00
const PLATFORM_MAX: Decimal = Decimal::from_parts(5000, 0, 0, false, 2);
/// 链上gas固定费 0.05
const NETWORK_GAS: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeeError {
    #[error("amount must be between 10.00 and 10000.00 USD, got {0}")]
    AmountOutOfRange(Decimal),
    #[error("amount must have at most two decimal places, got {0}")]
    AmountPrecision(Decimal),
}

/// 费用计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct FeeQuote {
    pub breakdown: FeeBreakdown,
    /// 实际进入通道的USDC金额
    pub usdc_sent: Decimal,
    /// 向用户收取的总额
    pub total_charged: Decimal,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// 计算费用明细
///
/// 各分量先各自舍入到两位，total取舍入后分量之和，
/// usdc_sent / total_charged 从 amount 与 total 推导，恒等式由构造保证。
pub fn compute(
    amount: Decimal,
    method: PaymentMethod,
    corridor: Corridor,
    handling: FeeHandling,
) -> Result<FeeQuote, FeeError> {
    if amount.scale() > 2 && amount.normalize().scale() > 2 {
        return Err(FeeError::AmountPrecision(amount));
    }
    if amount < MIN_AMOUNT || amount > MAX_AMOUNT {
        return Err(FeeError::AmountOutOfRange(amount));
    }

    let onramp = round2(amount * method.onramp_fee_rate());
    let corridor_fee = round2(amount * corridor.fee_rate());
    let platform = round2((PLATFORM_BASE + amount * PLATFORM_RATE).clamp(PLATFORM_MIN, PLATFORM_MAX));
    let network_gas = NETWORK_GAS;

    let total = onramp + corridor_fee + platform + network_gas;

    let (usdc_sent, total_charged) = match handling {
        FeeHandling::Inclusive => (amount - total, amount),
        FeeHandling::Additive => (amount, amount + total),
    };

    Ok(FeeQuote {
        breakdown: FeeBreakdown {
            onramp,
            corridor: corridor_fee,
            platform,
            network_gas,
            total,
        },
        usdc_sent,
        total_charged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_ach_mxn_inclusive() {
        // 100 USD, ACH, MXN, inclusive
        let quote = compute(
            dec("100"),
            PaymentMethod::Ach,
            Corridor::Mxn,
            FeeHandling::Inclusive,
        )
        .unwrap();

        assert_eq!(quote.breakdown.onramp, dec("0.00"));
        assert_eq!(quote.breakdown.corridor, dec("1.00"));
        assert_eq!(quote.breakdown.platform, dec("3.49"));
        assert_eq!(quote.breakdown.network_gas, dec("0.05"));
        assert_eq!(quote.breakdown.total, dec("4.54"));
        assert_eq!(quote.usdc_sent, dec("95.46"));
        assert_eq!(quote.total_charged, dec("100"));
    }

    #[test]
    fn test_card_ngn_additive() {
        // 500 USD, card, NGN, additive
        let quote = compute(
            dec("500"),
            PaymentMethod::Card,
            Corridor::Ngn,
            FeeHandling::Additive,
        )
        .unwrap();

        assert_eq!(quote.breakdown.onramp, dec("14.50"));
        assert_eq!(quote.breakdown.corridor, dec("10.00"));
        assert_eq!(quote.breakdown.platform, dec("5.49"));
        assert_eq!(quote.breakdown.network_gas, dec("0.05"));
        assert_eq!(quote.breakdown.total, dec("30.04"));
        assert_eq!(quote.usdc_sent, dec("500"));
        assert_eq!(quote.total_charged, dec("530.04"));
    }

    #[test]
    fn test_inclusive_identity_holds_after_rounding() {
        for amount in ["10", "33.33", "100", "4999.99", "10000"] {
            for method in [PaymentMethod::Ach, PaymentMethod::Card] {
                for corridor in Corridor::all() {
                    let q = compute(dec(amount), method, corridor, FeeHandling::Inclusive).unwrap();
                    assert_eq!(
                        q.usdc_sent + q.breakdown.total,
                        dec(amount),
                        "identity broken for {amount} {method:?} {corridor:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_additive_identity_holds_after_rounding() {
        for amount in ["10", "271.82", "10000"] {
            let q = compute(
                dec(amount),
                PaymentMethod::Card,
                Corridor::Brl,
                FeeHandling::Additive,
            )
            .unwrap();
            assert_eq!(q.total_charged - q.breakdown.total, dec(amount));
        }
    }

    #[test]
    fn test_total_is_sum_of_components() {
        let q = compute(
            dec("777.77"),
            PaymentMethod::Card,
            Corridor::Inr,
            FeeHandling::Inclusive,
        )
        .unwrap();
        let b = &q.breakdown;
        assert_eq!(b.total, b.onramp + b.corridor + b.platform + b.network_gas);
    }

    #[test]
    fn test_platform_fee_clamped_at_max() {
        // 2.99 + 10000 * 0.005 = 52.99 -> 上限 50.00
        let q = compute(
            dec("10000"),
            PaymentMethod::Ach,
            Corridor::Mxn,
            FeeHandling::Inclusive,
        )
        .unwrap();
        assert_eq!(q.breakdown.platform, dec("50.00"));
    }

    #[test]
    fn test_amount_boundaries() {
        let args = |a: &str| {
            compute(
                dec(a),
                PaymentMethod::Ach,
                Corridor::Mxn,
                FeeHandling::Inclusive,
            )
        };

        assert_eq!(args("9.99").unwrap_err(), FeeError::AmountOutOfRange(dec("9.99")));
        assert!(args("10.00").is_ok());
        assert!(args("10000.00").is_ok());
        assert_eq!(
            args("10000.01").unwrap_err(),
            FeeError::AmountOutOfRange(dec("10000.01"))
        );
    }

    #[test]
    fn test_sub_cent_precision_rejected() {
        let err = compute(
            dec("100.001"),
            PaymentMethod::Ach,
            Corridor::Mxn,
            FeeHandling::Inclusive,
        )
        .unwrap_err();
        assert_eq!(err, FeeError::AmountPrecision(dec("100.001")));
    }
}
