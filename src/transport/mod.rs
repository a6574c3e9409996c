// Transport layer
// Upstream clients for the price source and settlement services
//
// Numan Thabit 2025 Nov

pub mod jsonrpc;
