//! Package-level constants.

/// Current version of the gateway (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name, reported as `serverInfo.name`.
pub const NAME: &str = "scangate";

/// JSON-RPC protocol tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";
