//! RPC handler modules and registration.

pub mod system;
pub mod tools;

use serde_json::Value;

use crate::errors::RpcError;
use crate::registry::MethodRegistry;

/// Register all RPC handlers with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // Lifecycle
    registry.register("initialize", system::InitializeHandler);
    registry.register("notifications/initialized", system::InitializedHandler);
    registry.register("ping", system::PingHandler);

    // Tools
    registry.register("tools/list", tools::ListToolsHandler);
    registry.register_streamable("tools/call", tools::CallToolHandler);

    // Gateway
    registry.register("gateway/stats", system::StatsHandler);
    registry.register("gateway/clearCache", system::ClearCacheHandler);
}

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(params: Option<&'a Value>, key: &str) -> Result<&'a Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::invalid_params(format!("Missing required parameter: {key}")))
}

/// Extract a required string parameter.
pub(crate) fn require_string_param(params: Option<&Value>, key: &str) -> Result<String, RpcError> {
    require_param(params, key)?
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| RpcError::invalid_params(format!("Parameter '{key}' must be a string")))
}
