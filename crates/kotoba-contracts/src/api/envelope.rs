use serde::Serialize;
use serde_json::{Map, Value};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_UNSUPPORTED_MEDIA_TYPE: u16 = 415;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
pub const STATUS_INTERNAL: u16 = 500;
pub const STATUS_UNAVAILABLE: u16 = 503;
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// Status code plus the JSON envelope: `{success, data}` or
/// `{success: false, error, fallbackResponse?, details?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(true));
        body.insert("data".to_string(), data);
        Self {
            status: STATUS_OK,
            body: Value::Object(body),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(false));
        body.insert("error".to_string(), Value::String(message.into()));
        Self {
            status,
            body: Value::Object(body),
        }
    }

    pub fn with_fallback(self, fallback: impl Into<String>) -> Self {
        self.with_field("fallbackResponse", Value::String(fallback.into()))
    }

    pub fn with_details(self, details: Value) -> Self {
        self.with_field("details", details)
    }

    pub fn is_success(&self) -> bool {
        self.body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(body) = &mut self.body {
            body.insert(key.to_string(), value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ApiResponse, STATUS_GATEWAY_TIMEOUT};

    #[test]
    fn success_envelope() {
        let response = ApiResponse::ok(json!({"reply": "こんにちは"}));
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body["data"]["reply"], json!("こんにちは"));
    }

    #[test]
    fn failure_envelope_carries_fallback_and_details() {
        let response = ApiResponse::error(STATUS_GATEWAY_TIMEOUT, "Request timed out")
            .with_fallback("Please try again.")
            .with_details(json!({"task": "chat"}));
        assert!(!response.is_success());
        assert_eq!(
            response.body,
            json!({
                "success": false,
                "error": "Request timed out",
                "fallbackResponse": "Please try again.",
                "details": {"task": "chat"}
            })
        );
    }
}
