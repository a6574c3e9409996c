// Venue module - liquidity venue descriptors and pricing models
// This file defines assets, venues, venue families and the pool models
// the family-specific pricing formulas operate on
//
// Numan Thabit 2025 Nov

pub mod adapter;
pub mod amm;
pub mod orderbook;

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use adapter::{AdapterSettings, CurveHop, PricingCurve, Quote, VenueAdapter};
pub use amm::{ConcentratedPool, ConstantProductPool};
pub use orderbook::{BookLevel, OrderBookPool};

/// Chain-qualified fungible asset. Addresses are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef {
    pub chain_id: u64,
    pub address: String,
    pub decimals: u8,
}

impl AssetRef {
    pub fn new(chain_id: u64, address: &str, decimals: u8) -> Self {
        Self {
            chain_id,
            address: address.to_ascii_lowercase(),
            decimals,
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetPair {
    pub token_in: AssetRef,
    pub token_out: AssetRef,
}

impl AssetPair {
    pub fn new(token_in: AssetRef, token_out: AssetRef) -> Self {
        Self {
            token_in,
            token_out,
        }
    }
}

/// Known assets, addressable by address or symbol.
#[derive(Debug, Clone, Default)]
pub struct AssetBook {
    by_address: HashMap<String, AssetRef>,
    symbols: HashMap<String, String>,
}

impl AssetBook {
    pub fn insert(&mut self, symbol: &str, asset: AssetRef) {
        self.symbols
            .insert(symbol.to_ascii_uppercase(), asset.address.clone());
        self.by_address.insert(asset.address.clone(), asset);
    }

    /// Resolve an address (case-insensitive) or a symbol.
    pub fn resolve(&self, key: &str) -> Option<&AssetRef> {
        let key = key.trim();
        self.by_address.get(&key.to_ascii_lowercase()).or_else(|| {
            self.symbols
                .get(&key.to_ascii_uppercase())
                .and_then(|address| self.by_address.get(address))
        })
    }

    pub fn require(&self, key: &str) -> Result<AssetRef, ConfigError> {
        self.resolve(key)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAsset(key.to_string()))
    }

    /// (symbol, asset) pairs sorted by symbol.
    pub fn listing(&self) -> Vec<(String, AssetRef)> {
        let mut out: Vec<_> = self
            .symbols
            .iter()
            .filter_map(|(symbol, address)| {
                self.by_address
                    .get(address)
                    .map(|asset| (symbol.clone(), asset.clone()))
            })
            .collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Closed set of supported venue families. Each family has exactly one pricing formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueFamily {
    #[serde(rename = "amm-v2", alias = "uniswap-v2")]
    AmmV2,
    #[serde(rename = "amm-v3", alias = "uniswap-v3")]
    AmmV3,
    #[serde(rename = "order-book", alias = "hyperliquid-native")]
    OrderBook,
}

impl VenueFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmmV2 => "amm-v2",
            Self::AmmV3 => "amm-v3",
            Self::OrderBook => "order-book",
        }
    }
}

impl fmt::Display for VenueFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amm-v2" | "uniswap-v2" => Ok(Self::AmmV2),
            "amm-v3" | "uniswap-v3" => Ok(Self::AmmV3),
            "order-book" | "hyperliquid-native" => Ok(Self::OrderBook),
            other => Err(ConfigError::UnknownFamily(other.to_string())),
        }
    }
}

/// Static venue descriptor, created from configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub family: VenueFamily,
    pub fee_bps: u32,
    pub enabled: bool,
    pub address: String,
}

/// Result of pushing an input amount through one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub amount_out: u128,
    pub price_impact_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("insufficient liquidity for {requested} input")]
    InsufficientLiquidity { requested: u128 },
    #[error("zero input amount")]
    ZeroInput,
    #[error("pool state is degenerate: {0}")]
    Degenerate(&'static str),
    #[error("pool model is {found}, venue family is {expected}")]
    FamilyMismatch {
        expected: VenueFamily,
        found: VenueFamily,
    },
}

/// Pool state oriented in the swap direction (selling `token_in` for `token_out`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PoolModel {
    ConstantProduct(ConstantProductPool),
    Concentrated(ConcentratedPool),
    OrderBook(OrderBookPool),
}

impl PoolModel {
    pub fn family(&self) -> VenueFamily {
        match self {
            Self::ConstantProduct(_) => VenueFamily::AmmV2,
            Self::Concentrated(_) => VenueFamily::AmmV3,
            Self::OrderBook(_) => VenueFamily::OrderBook,
        }
    }

    /// Same pool seen from the opposite direction. Order books carry one side only.
    pub fn inverted(&self) -> Option<PoolModel> {
        match self {
            Self::ConstantProduct(pool) => Some(Self::ConstantProduct(pool.inverted())),
            Self::Concentrated(pool) => Some(Self::Concentrated(pool.inverted())),
            Self::OrderBook(_) => None,
        }
    }
}

/// Pricing function signature shared by every family.
pub type PricingFn = fn(&PoolModel, u128, u32) -> Result<SwapOutcome, PricingError>;

/// Resolve the pricing formula for a family. Called once per adapter.
pub fn pricing_for(family: VenueFamily) -> PricingFn {
    match family {
        VenueFamily::AmmV2 => amm::price_constant_product,
        VenueFamily::AmmV3 => amm::price_concentrated,
        VenueFamily::OrderBook => orderbook::price_order_book,
    }
}

/// Input left after the venue fee, as a float for curve evaluation.
pub(crate) fn net_of_fee(amount_in: u128, fee_bps: u32) -> f64 {
    amount_in as f64 * (1.0 - fee_bps.min(10_000) as f64 / 10_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_parses_aliases_and_rejects_unknown() {
        assert_eq!("uniswap-v2".parse::<VenueFamily>().unwrap(), VenueFamily::AmmV2);
        assert_eq!(" AMM-V3 ".parse::<VenueFamily>().unwrap(), VenueFamily::AmmV3);
        assert_eq!(
            "hyperliquid-native".parse::<VenueFamily>().unwrap(),
            VenueFamily::OrderBook
        );
        assert!(matches!(
            "curve".parse::<VenueFamily>(),
            Err(ConfigError::UnknownFamily(_))
        ));
    }

    #[test]
    fn asset_book_resolves_symbol_and_address() {
        let mut book = AssetBook::default();
        let usdc = AssetRef::new(999, "0xAbC0000000000000000000000000000000000001", 6);
        book.insert("usdc", usdc.clone());
        assert_eq!(book.resolve("USDC"), Some(&usdc));
        assert_eq!(
            book.resolve("0xabc0000000000000000000000000000000000001"),
            Some(&usdc)
        );
        assert!(book.require("WETH").is_err());
    }

    #[test]
    fn order_book_cannot_be_inverted() {
        let book = PoolModel::OrderBook(OrderBookPool { levels: vec![] });
        assert!(book.inverted().is_none());
        assert_eq!(book.family(), VenueFamily::OrderBook);
    }
}
