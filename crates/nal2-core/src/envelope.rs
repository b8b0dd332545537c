//! Fitting request/response envelope.
//!
//! Requests: `{"sequence_num": 3, "function": "SetGender", "input_parameters": {...}}`.
//! Responses echo the sequence number and function name, with
//! `result`/`return` set to `0` on success or `-1` on failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Return code for a successful call.
pub const RETURN_OK: i32 = 0;
/// Return code for a failed call.
pub const RETURN_ERROR: i32 = -1;

/// Errors produced while reading an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
}

/// An inbound fitting call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitRequest {
    pub sequence_num: i64,
    pub function: String,
    pub input_parameters: Value,
}

impl FitRequest {
    /// Parse and validate a request body.
    ///
    /// `sequence_num` defaults to `0`; `function` must be a non-empty
    /// string and `input_parameters` must be present and non-null.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        let sequence_num = value
            .get("sequence_num")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let function = value
            .get("function")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
            .ok_or(EnvelopeError::MissingField("function"))?
            .to_string();
        let input_parameters = match value.get("input_parameters") {
            Some(Value::Null) | None => return Err(EnvelopeError::MissingField("input_parameters")),
            Some(params) => params.clone(),
        };
        Ok(Self {
            sequence_num,
            function,
            input_parameters,
        })
    }

    /// Check that every name in `fields` is present in `input_parameters`.
    pub fn require(&self, fields: &[&str]) -> Result<(), EnvelopeError> {
        for field in fields {
            if self.input_parameters.get(*field).is_none() {
                return Err(EnvelopeError::MissingParameter((*field).to_string()));
            }
        }
        Ok(())
    }
}

/// An outbound fitting result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitResponse {
    pub sequence_num: i64,
    pub result: i32,
    pub function: String,
    #[serde(rename = "return")]
    pub return_code: i32,
    pub output_parameters: Value,
}

impl FitResponse {
    pub fn success(sequence_num: i64, function: impl Into<String>, output: Value) -> Self {
        let output_parameters = if output.is_null() {
            Value::Object(Map::new())
        } else {
            output
        };
        Self {
            sequence_num,
            result: RETURN_OK,
            function: function.into(),
            return_code: RETURN_OK,
            output_parameters,
        }
    }

    pub fn failure(sequence_num: i64, function: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sequence_num,
            result: RETURN_ERROR,
            function: function.into(),
            return_code: RETURN_ERROR,
            output_parameters: json!({ "error": message.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == RETURN_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_request() {
        let req = FitRequest::parse(
            r#"{"sequence_num":7,"function":"SetGender","input_parameters":{"gender":1}}"#,
        )
        .unwrap();
        assert_eq!(req.sequence_num, 7);
        assert_eq!(req.function, "SetGender");
        assert_eq!(req.input_parameters["gender"], 1);
    }

    #[test]
    fn sequence_num_defaults_to_zero() {
        let req = FitRequest::parse(r#"{"function":"dllVersion","input_parameters":{}}"#).unwrap();
        assert_eq!(req.sequence_num, 0);
    }

    #[test]
    fn missing_function_rejected() {
        let err = FitRequest::parse(r#"{"input_parameters":{}}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("function")));
    }

    #[test]
    fn null_parameters_rejected() {
        let err =
            FitRequest::parse(r#"{"function":"dllVersion","input_parameters":null}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("input_parameters")));
    }

    #[test]
    fn invalid_json_rejected() {
        let err = FitRequest::parse("{not json").unwrap_err();
        assert!(err.to_string().starts_with("invalid JSON"));
    }

    #[test]
    fn require_reports_first_missing_parameter() {
        let req = FitRequest::parse(
            r#"{"function":"CrossOverFrequencies_NL2","input_parameters":{"channels":3,"AC":[]}}"#,
        )
        .unwrap();
        assert!(req.require(&["channels", "AC"]).is_ok());
        let err = req.require(&["channels", "AC", "BC"]).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: BC");
    }

    #[test]
    fn success_serializes_return_keyword() {
        let resp = FitResponse::success(2, "dllVersion", json!({"major": 1, "minor": 0}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["return"], 0);
        assert_eq!(value["result"], 0);
        assert_eq!(value["sequence_num"], 2);
        assert_eq!(value["output_parameters"]["major"], 1);
        assert!(resp.is_success());
    }

    #[test]
    fn failure_carries_error_message() {
        let resp = FitResponse::failure(4, "GetMLE", "unknown function: GetMLE");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["return"], -1);
        assert_eq!(value["output_parameters"]["error"], "unknown function: GetMLE");
        assert!(!resp.is_success());
    }
}
