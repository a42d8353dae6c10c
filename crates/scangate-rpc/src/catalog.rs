//! Tools exposed through `tools/list` and `tools/call`.

use serde_json::{Value, json};

/// A callable tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    /// Synchronous content scan.
    ScanContent,
    /// Batch submission for asynchronous scanning.
    SubmitAsync,
    /// Results lookup by scan id.
    GetResults,
    /// Threat report lookup by report id.
    GetReports,
}

impl Tool {
    /// Every tool, in listing order.
    pub const ALL: [Self; 4] = [
        Self::ScanContent,
        Self::SubmitAsync,
        Self::GetResults,
        Self::GetReports,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ScanContent => "scan_content",
            Self::SubmitAsync => "scan_submit_async",
            Self::GetResults => "scan_get_results",
            Self::GetReports => "scan_get_reports",
        }
    }

    /// Look a tool up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    fn description(self) -> &'static str {
        match self {
            Self::ScanContent => {
                "Scan a prompt and/or model response for threats and return the verdict. \
                 Identical content under the same profile is served from cache."
            }
            Self::SubmitAsync => {
                "Submit a batch of scans for asynchronous processing. Returns scan and report ids."
            }
            Self::GetResults => "Fetch results for up to five previously submitted scans.",
            Self::GetReports => "Fetch detailed threat reports for up to five report ids.",
        }
    }

    fn input_schema(self) -> Value {
        match self {
            Self::ScanContent => {
                let mut schema = scan_item_schema();
                if let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) {
                    let _ = props.insert(
                        "profile_name".into(),
                        json!({"type": "string", "description": "Scan profile name for this call"}),
                    );
                    let _ = props.insert(
                        "profile_id".into(),
                        json!({"type": "string", "description": "Scan profile id for this call"}),
                    );
                }
                schema
            }
            Self::SubmitAsync => json!({
                "type": "object",
                "properties": {
                    "scans": {"type": "array", "minItems": 1, "items": scan_item_schema()},
                    "profile_name": {"type": "string"},
                    "profile_id": {"type": "string"}
                },
                "required": ["scans"]
            }),
            Self::GetResults => ids_schema("scan_ids"),
            Self::GetReports => ids_schema("report_ids"),
        }
    }

    /// `tools/list` entry.
    pub fn definition(self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "inputSchema": self.input_schema(),
        })
    }
}

fn scan_item_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": {"type": "string", "description": "User prompt to scan"},
            "response": {"type": "string", "description": "Model response to scan"},
            "context": {"type": "string", "description": "Grounding context"},
            "contents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "prompt": {"type": "string"},
                        "response": {"type": "string"},
                        "context": {"type": "string"}
                    }
                }
            },
            "tr_id": {"type": "string", "description": "Caller transaction id"},
            "metadata": {"type": "object", "description": "Caller metadata"}
        }
    })
}

fn ids_schema(field: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 1,
                "maxItems": scangate_upstream::types::MAX_IDS_PER_LOOKUP
            }
        },
        "required": [field]
    })
}

/// All tool definitions.
pub fn tool_definitions() -> Vec<Value> {
    Tool::ALL.into_iter().map(Tool::definition).collect()
}
