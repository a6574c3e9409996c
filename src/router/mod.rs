// Router module - quote routing and execution planning
// This file wires the quote collector, route optimizer, cost estimator
// and execution planner into the request pipeline served over HTTP
//
// Numan Thabit 2025 Nov

pub mod collector;
pub mod cost;
pub mod execution;
pub mod optimizer;
pub mod routes;
pub mod validation;

#[allow(clippy::module_inception)]
pub mod router;

pub use collector::{CollectRequest, CollectorSettings, QuoteCollection, QuoteCollector};
pub use cost::{CostEstimate, CostEstimator, CostSettings};
pub use execution::{ExecutionEngine, ExecutionPlan, ExecutionPlanner, Settlement};
pub use optimizer::{OptimizerSettings, RouteOptimizer};
pub use router::{create_api_router, Router, RouterSettings};
pub use routes::{Route, RouteKind, RouteLeg, RouteSelection};
