// Order book venue pricing module
// This file implements taker pricing against a native order book by walking
// price levels best-first
//
// Numan Thabit 2025 Nov

use super::{net_of_fee, PoolModel, PricingError, SwapOutcome, VenueFamily};
use crate::quant::{amount_str, ratio_to_bps};
use serde::{Deserialize, Serialize};

/// One resting level: up to `max_input` of token_in filled at `price` token_out per token_in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    #[serde(with = "amount_str")]
    pub max_input: u128,
}

/// The side of the book a taker selling `token_in` hits, best level first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookPool {
    pub levels: Vec<BookLevel>,
}

impl OrderBookPool {
    pub fn depth(&self) -> u128 {
        self.levels.iter().map(|level| level.max_input).sum()
    }

    pub fn swap(&self, amount_in: u128, fee_bps: u32) -> Result<SwapOutcome, PricingError> {
        if amount_in == 0 {
            return Err(PricingError::ZeroInput);
        }
        let best = match self.levels.first() {
            Some(level) if level.price.is_finite() && level.price > 0.0 => level.price,
            Some(_) => return Err(PricingError::Degenerate("non-positive best price")),
            None => {
                return Err(PricingError::InsufficientLiquidity {
                    requested: amount_in,
                })
            }
        };

        let x = net_of_fee(amount_in, fee_bps);
        let mut remaining = x;
        let mut out = 0.0;
        for level in &self.levels {
            if remaining <= 0.0 {
                break;
            }
            let take = remaining.min(level.max_input as f64);
            out += take * level.price;
            remaining -= take;
        }
        if remaining > 0.0 {
            return Err(PricingError::InsufficientLiquidity {
                requested: amount_in,
            });
        }

        let amount_out = out.floor() as u128;
        if amount_out == 0 {
            return Err(PricingError::InsufficientLiquidity {
                requested: amount_in,
            });
        }

        Ok(SwapOutcome {
            amount_out,
            price_impact_bps: ratio_to_bps(1.0 - (out / x) / best),
        })
    }
}

pub fn price_order_book(
    model: &PoolModel,
    amount_in: u128,
    fee_bps: u32,
) -> Result<SwapOutcome, PricingError> {
    match model {
        PoolModel::OrderBook(book) => book.swap(amount_in, fee_bps),
        other => Err(PricingError::FamilyMismatch {
            expected: VenueFamily::OrderBook,
            found: other.family(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBookPool {
        OrderBookPool {
            levels: vec![
                BookLevel {
                    price: 1.0,
                    max_input: 500,
                },
                BookLevel {
                    price: 0.9,
                    max_input: 1_000,
                },
            ],
        }
    }

    #[test]
    fn walks_levels_best_first() {
        let out = book().swap(1_000, 0).unwrap();
        assert_eq!(out.amount_out, 950);
        assert_eq!(out.price_impact_bps, 500);
    }

    #[test]
    fn top_of_book_fill_has_no_impact() {
        let out = book().swap(400, 0).unwrap();
        assert_eq!(out.amount_out, 400);
        assert_eq!(out.price_impact_bps, 0);
    }

    #[test]
    fn input_beyond_depth_is_unfillable() {
        assert_eq!(book().depth(), 1_500);
        assert!(matches!(
            book().swap(2_000, 0),
            Err(PricingError::InsufficientLiquidity { .. })
        ));
        assert!(OrderBookPool { levels: vec![] }.swap(1, 0).is_err());
    }
}
