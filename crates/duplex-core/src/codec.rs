//! Request and response envelopes.
//!
//! Requests arrive as `{"method": ..., "params": [arg], "id": ...}` and
//! responses leave as `{"result": ..., "error": ..., "id": ...}`. A request
//! whose id is absent or `null` is a notification and produces no response
//! text at all.
//!
//! ```text
//! -> {"method":"Service1.Multiply","params":[{"A":3,"B":4}],"id":1}
//! <- {"result":{"Result":12},"error":null,"id":1}
//! ```

use crate::error::MethodError;
use crate::{Result, RpcError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestEnvelope {
    /// `Namespace.Method` or a bare `Method`.
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// Correlation id; `None` marks a notification.
    #[serde(default)]
    pub id: Option<Value>,
}

impl RequestEnvelope {
    /// Decode one request frame.
    ///
    /// The frame must be a JSON object with a string `method` field. Any
    /// failure is reported once, here; the returned envelope never needs to
    /// be re-checked.
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RpcError::parse("empty request"));
        }

        let value: Value = serde_json::from_str(raw).map_err(|e| RpcError::Parse {
            message: e.to_string(),
            source: Some(e),
        })?;
        if !value.is_object() {
            return Err(RpcError::parse("request must be a JSON object"));
        }

        serde_json::from_value(value).map_err(|e| RpcError::Parse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// True when the caller expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Bind the request's single argument into `args`.
    ///
    /// The wire wraps the argument in a one-element array for positional
    /// JSON-RPC compatibility; that wrapper is removed here. A bare object is
    /// accepted as the argument itself.
    pub fn read_params<T: DeserializeOwned>(&self, args: &mut T) -> Result<()> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| RpcError::parse("missing params field"))?;

        let argument = match params {
            Value::Array(items) => match items.as_slice() {
                [single] => single,
                other => {
                    return Err(RpcError::Bind {
                        method: self.method.clone(),
                        message: format!(
                            "expected exactly one element in params, got {}",
                            other.len()
                        ),
                        source: None,
                    })
                }
            },
            other => other,
        };

        *args = T::deserialize(argument).map_err(|e| RpcError::Bind {
            method: self.method.clone(),
            message: e.to_string(),
            source: Some(e),
        })?;
        Ok(())
    }
}

/// An outbound response.
///
/// `result` and `error` are mutually exclusive; both are always present on
/// the wire, one of them as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub result: Value,
    pub error: Option<String>,
    pub id: Value,
}

impl ResponseEnvelope {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, message: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            error: Some(message.into()),
            id,
        }
    }

    /// Serialize to the wire text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RpcError::Encode {
            message: e.to_string(),
            source: Some(e),
        })
    }
}

/// Encode the outcome of one call.
///
/// Returns an empty string for notifications (`id` is `None`); the caller
/// must then write nothing to the connection.
pub fn encode_response(
    reply: Value,
    method_error: Option<&MethodError>,
    id: Option<&Value>,
) -> Result<String> {
    let Some(id) = id else {
        return Ok(String::new());
    };

    let envelope = match method_error {
        Some(err) => ResponseEnvelope::failure(id.clone(), err.message()),
        None => ResponseEnvelope::success(id.clone(), reply),
    };
    envelope.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Operands {
        #[serde(rename = "A")]
        a: i64,
        #[serde(rename = "B")]
        b: i64,
    }

    #[test]
    fn test_decode_full_request() {
        let request =
            RequestEnvelope::decode(r#"{"method":"Multiply","params":[{"A":3,"B":4}],"id":1}"#)
                .unwrap();
        assert_eq!(request.method(), "Multiply");
        assert_eq!(request.id(), Some(&json!(1)));
        assert!(!request.is_notification());
    }

    #[test]
    fn test_decode_null_id_is_notification() {
        let request =
            RequestEnvelope::decode(r#"{"method":"Ping","params":[{}],"id":null}"#).unwrap();
        assert!(request.is_notification());

        let request = RequestEnvelope::decode(r#"{"method":"Ping","params":[{}]}"#).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_decode_string_id_is_kept_verbatim() {
        let request = RequestEnvelope::decode(r#"{"method":"Ping","id":"abc-1"}"#).unwrap();
        assert_eq!(request.id(), Some(&json!("abc-1")));
    }

    #[test]
    fn test_decode_missing_method_fails() {
        let err = RequestEnvelope::decode(r#"{"params":[{}],"id":1}"#).unwrap_err();
        assert!(matches!(err, RpcError::Parse { .. }));
        assert!(err.to_string().contains("method"));
    }

    #[test]
    fn test_decode_malformed_input_fails() {
        for raw in ["", "   ", "not json", "[1,2]", r#"{"method":5}"#] {
            let err = RequestEnvelope::decode(raw).unwrap_err();
            assert!(matches!(err, RpcError::Parse { .. }), "input {:?}", raw);
        }
    }

    #[test]
    fn test_read_params_unwraps_single_element_array() {
        let request =
            RequestEnvelope::decode(r#"{"method":"Multiply","params":[{"A":3,"B":4}],"id":1}"#)
                .unwrap();
        let mut args = Operands::default();
        request.read_params(&mut args).unwrap();
        assert_eq!(args, Operands { a: 3, b: 4 });
    }

    #[test]
    fn test_read_params_accepts_bare_object() {
        let request =
            RequestEnvelope::decode(r#"{"method":"Multiply","params":{"A":2},"id":1}"#).unwrap();
        let mut args = Operands::default();
        request.read_params(&mut args).unwrap();
        assert_eq!(args, Operands { a: 2, b: 0 });
    }

    #[test]
    fn test_read_params_missing_field_is_parse_failure() {
        let request = RequestEnvelope::decode(r#"{"method":"Ping","id":1}"#).unwrap();
        let mut args = Operands::default();
        let err = request.read_params(&mut args).unwrap_err();
        assert!(matches!(err, RpcError::Parse { .. }));
        assert!(err.to_string().contains("missing params field"));
    }

    #[test]
    fn test_read_params_shape_mismatch_is_bind_failure() {
        let request =
            RequestEnvelope::decode(r#"{"method":"Multiply","params":[{"A":"x"}],"id":1}"#)
                .unwrap();
        let mut args = Operands::default();
        let err = request.read_params(&mut args).unwrap_err();
        assert!(matches!(err, RpcError::Bind { .. }));

        let request =
            RequestEnvelope::decode(r#"{"method":"Multiply","params":[{},{}],"id":1}"#).unwrap();
        let err = request.read_params(&mut args).unwrap_err();
        assert!(err.to_string().contains("exactly one element"));
    }

    #[test]
    fn test_encode_success() {
        let text = encode_response(json!({"Result": 12}), None, Some(&json!(1))).unwrap();
        assert_eq!(text, r#"{"result":{"Result":12},"error":null,"id":1}"#);

        let decoded: ResponseEnvelope = serde_json::from_str(&text).unwrap();
        assert!(decoded.error.is_none());
        assert_eq!(decoded.result, json!({"Result": 12}));
    }

    #[test]
    fn test_encode_method_failure_nulls_result() {
        let err = MethodError::new("response error");
        let text = encode_response(json!({"Result": 0}), Some(&err), Some(&json!(7))).unwrap();
        assert_eq!(text, r#"{"result":null,"error":"response error","id":7}"#);
    }

    #[test]
    fn test_encode_notification_is_empty() {
        let text = encode_response(json!({"Result": 12}), None, None).unwrap();
        assert!(text.is_empty());
    }
}
