use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    pub fn error(id: serde_json::Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self::error(serde_json::Value::Null, -32700, "Parse error")
    }

    pub fn invalid_request(id: serde_json::Value) -> Self {
        Self::error(id, -32600, "Invalid request")
    }

    pub fn internal_error(id: serde_json::Value) -> Self {
        Self::error(id, -32603, "Internal error")
    }

    pub fn bad_gateway(id: serde_json::Value) -> Self {
        Self::error(id, -32000, "All providers exhausted")
    }

    /// Parses `result` as a JSON-RPC numeric value for validator comparison.
    /// Accepts `0x`-prefixed hex strings (the common Ethereum encoding) and
    /// plain decimal numbers. Returns `None` if the result is absent, an
    /// error, or not numeric — the validator treats that as "unknown".
    pub fn numeric_result(&self) -> Option<f64> {
        let result = self.result.as_ref()?;
        match result {
            serde_json::Value::String(s) => {
                if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    u128::from_str_radix(hex, 16).ok().map(|v| v as f64)
                } else {
                    s.parse::<f64>().ok()
                }
            }
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_result_parses_hex() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: Some(serde_json::json!("0x64")),
            error: None,
            id: serde_json::json!(1),
        };
        assert_eq!(resp.numeric_result(), Some(100.0));
    }

    #[test]
    fn numeric_result_none_for_error_response() {
        let resp = JsonRpcResponse::error(serde_json::json!(1), -32000, "boom");
        assert_eq!(resp.numeric_result(), None);
    }

    #[test]
    fn numeric_result_none_for_non_numeric_string() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: Some(serde_json::json!("Geth/v1.0")),
            error: None,
            id: serde_json::json!(1),
        };
        assert_eq!(resp.numeric_result(), None);
    }
}
