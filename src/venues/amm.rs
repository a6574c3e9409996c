// AMM venue pricing module
// This file implements the constant-product (v2) and concentrated-liquidity (v3)
// pricing formulas over pool state oriented in the swap direction
//
// Numan Thabit 2025 Nov

use super::{net_of_fee, PoolModel, PricingError, SwapOutcome, VenueFamily};
use crate::quant::{amount_str, ratio_to_bps, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

/// Constant-product pool reserves, oriented `token_in -> token_out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantProductPool {
    #[serde(with = "amount_str")]
    pub reserve_in: u128,
    #[serde(with = "amount_str")]
    pub reserve_out: u128,
}

impl ConstantProductPool {
    pub fn inverted(&self) -> Self {
        Self {
            reserve_in: self.reserve_out,
            reserve_out: self.reserve_in,
        }
    }

    /// `amountOut = amountIn*(1-fee) * reserveOut / (reserveIn + amountIn*(1-fee))`
    pub fn swap(&self, amount_in: u128, fee_bps: u32) -> Result<SwapOutcome, PricingError> {
        if amount_in == 0 {
            return Err(PricingError::ZeroInput);
        }
        if self.reserve_in == 0 || self.reserve_out == 0 {
            return Err(PricingError::Degenerate("empty reserves"));
        }

        let amount_out = self
            .exact_output(amount_in, fee_bps)
            .unwrap_or_else(|| {
                let x = net_of_fee(amount_in, fee_bps);
                let out = (x * self.reserve_out as f64 / (self.reserve_in as f64 + x)).floor() as u128;
                // f64 rounding can reach the full reserve; a pool is never drained.
                out.min(self.reserve_out - 1)
            });
        if amount_out == 0 {
            return Err(PricingError::InsufficientLiquidity {
                requested: amount_in,
            });
        }

        // Realized rate vs spot, fee excluded: x / (reserveIn + x)
        let x = net_of_fee(amount_in, fee_bps);
        let impact = x / (self.reserve_in as f64 + x);

        Ok(SwapOutcome {
            amount_out,
            price_impact_bps: ratio_to_bps(impact),
        })
    }

    // Integer evaluation; None when an intermediate product overflows u128.
    fn exact_output(&self, amount_in: u128, fee_bps: u32) -> Option<u128> {
        let keep = (BPS_DENOMINATOR - fee_bps.min(BPS_DENOMINATOR)) as u128;
        let in_with_fee = amount_in.checked_mul(keep)?;
        let numerator = in_with_fee.checked_mul(self.reserve_out)?;
        let denominator = self
            .reserve_in
            .checked_mul(BPS_DENOMINATOR as u128)?
            .checked_add(in_with_fee)?;
        Some(numerator / denominator)
    }
}

/// Single active range of a concentrated-liquidity pool, oriented so that selling
/// `token_in` moves `sqrt_price` (sqrt of token_out per token_in) towards `sqrt_price_lower`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentratedPool {
    #[serde(with = "amount_str")]
    pub liquidity: u128,
    pub sqrt_price: f64,
    pub sqrt_price_lower: f64,
    pub sqrt_price_upper: f64,
}

impl ConcentratedPool {
    pub fn inverted(&self) -> Self {
        Self {
            liquidity: self.liquidity,
            sqrt_price: 1.0 / self.sqrt_price,
            sqrt_price_lower: 1.0 / self.sqrt_price_upper,
            sqrt_price_upper: 1.0 / self.sqrt_price_lower,
        }
    }

    pub fn swap(&self, amount_in: u128, fee_bps: u32) -> Result<SwapOutcome, PricingError> {
        if amount_in == 0 {
            return Err(PricingError::ZeroInput);
        }
        let sqrt_p = self.sqrt_price;
        if self.liquidity == 0
            || !sqrt_p.is_finite()
            || sqrt_p <= 0.0
            || !(self.sqrt_price_lower > 0.0 && self.sqrt_price_lower <= sqrt_p)
        {
            return Err(PricingError::Degenerate("invalid active range"));
        }

        let l = self.liquidity as f64;
        let x = net_of_fee(amount_in, fee_bps);
        let sqrt_next = l * sqrt_p / (l + x * sqrt_p);
        if sqrt_next < self.sqrt_price_lower {
            return Err(PricingError::InsufficientLiquidity {
                requested: amount_in,
            });
        }

        let amount_out = (l * (sqrt_p - sqrt_next)).floor() as u128;
        if amount_out == 0 {
            return Err(PricingError::InsufficientLiquidity {
                requested: amount_in,
            });
        }

        Ok(SwapOutcome {
            amount_out,
            price_impact_bps: ratio_to_bps(1.0 - sqrt_next / sqrt_p),
        })
    }
}

pub fn price_constant_product(
    model: &PoolModel,
    amount_in: u128,
    fee_bps: u32,
) -> Result<SwapOutcome, PricingError> {
    match model {
        PoolModel::ConstantProduct(pool) => pool.swap(amount_in, fee_bps),
        other => Err(PricingError::FamilyMismatch {
            expected: VenueFamily::AmmV2,
            found: other.family(),
        }),
    }
}

pub fn price_concentrated(
    model: &PoolModel,
    amount_in: u128,
    fee_bps: u32,
) -> Result<SwapOutcome, PricingError> {
    match model {
        PoolModel::Concentrated(pool) => pool.swap(amount_in, fee_bps),
        other => Err(PricingError::FamilyMismatch {
            expected: VenueFamily::AmmV3,
            found: other.family(),
        }),
    }
}
