// Library root module for swap-aggr
// This file defines the public API and module structure for the swap-aggr library
// It exports the quote aggregation, routing and planning functionality
//
// Numan Thabit 2025 Nov

pub mod config;
pub mod control;
pub mod errors;
pub mod metrics;
pub mod quant;
pub mod router;
pub mod state;
pub mod transport;
pub mod venues;
