//! Per-request configuration overlay.
//!
//! Query parameters on an inbound request can pick a scan profile or bypass
//! the cache for that one call. The overlay travels with the request; the
//! process-wide [`GatewaySettings`](crate::GatewaySettings) are never mutated.

use serde::Serialize;

use crate::loader::parse_bool;

/// Request-scoped overrides taken from query parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOverlay {
    /// `profile`: scan profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    /// `profileId`: scan profile id. Wins over the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// `cache`: per-request cache switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

impl RequestOverlay {
    /// Build an overlay from decoded query pairs. Unknown keys are ignored,
    /// blank values count as absent, the last occurrence of a key wins.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut overlay = Self::default();
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "profile" | "profileName" => overlay.profile_name = Some(value.to_string()),
                "profileId" => overlay.profile_id = Some(value.to_string()),
                "cache" => {
                    if let Some(flag) = parse_bool(value) {
                        overlay.cache = Some(flag);
                    } else {
                        tracing::debug!(value, "ignoring unparsable cache flag");
                    }
                }
                _ => {}
            }
        }
        overlay
    }

    /// Whether the cache applies, given the process-wide switch.
    ///
    /// The overlay can only turn caching off; it never enables a cache that
    /// is disabled in settings.
    pub fn cache_enabled(&self, configured: bool) -> bool {
        configured && self.cache.unwrap_or(true)
    }

    /// True when no override is present.
    pub fn is_empty(&self) -> bool {
        self.profile_name.is_none() && self.profile_id.is_none() && self.cache.is_none()
    }
}
