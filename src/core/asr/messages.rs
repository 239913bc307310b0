//! Wire types for the ASR endpoint.
//!
//! The request is a flat form-encoded body. The response is a JSON document
//! whose exact schema belongs to the provider; only `errorCode` and `result`
//! are interpreted, and anything unexpected is reported as a parse failure.

use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroize;

use super::TranscriptionFailure;

/// Form body of a single recognition request.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionRequest {
    #[serde(rename = "appKey")]
    pub app_key: String,

    /// Base64 encoded audio payload.
    #[serde(rename = "q")]
    pub payload_base64: String,

    pub format: String,

    #[serde(rename = "rate")]
    pub sample_rate_hz: u32,

    #[serde(rename = "channel")]
    pub channel_count: u16,

    /// Upload type, `1` means the audio is inlined in `q`.
    #[serde(rename = "type")]
    pub upload_type: String,

    #[serde(rename = "langType")]
    pub language_hint: String,

    pub salt: String,

    #[serde(rename = "curtime")]
    pub timestamp_seconds: String,

    #[serde(rename = "sign")]
    pub signature: String,

    #[serde(rename = "signType")]
    pub signature_version: String,
}

impl Drop for TranscriptionRequest {
    fn drop(&mut self) {
        // The body carries user audio; clear it once the request is gone.
        self.payload_base64.zeroize();
    }
}

/// Extract recognized text from a response body.
pub fn parse_response(body: &str) -> Result<String, TranscriptionFailure> {
    if body.trim().is_empty() {
        return Err(TranscriptionFailure::Parse(
            "empty response body".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| TranscriptionFailure::Parse(format!("invalid JSON: {e}")))?;

    let object = value.as_object().ok_or_else(|| {
        TranscriptionFailure::Parse("response is not a JSON object".to_string())
    })?;

    if let Some(code) = object.get("errorCode") {
        let code = match code {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(TranscriptionFailure::Parse(format!(
                    "unexpected errorCode type: {other}"
                )));
            }
        };
        if code != "0" {
            return Err(TranscriptionFailure::Service {
                code,
                message: object
                    .get("msg")
                    .or_else(|| object.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("recognition rejected")
                    .to_string(),
            });
        }
    }

    let text = match object.get("result") {
        None | Some(Value::Null) => return Err(TranscriptionFailure::EmptyResult),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let mut text = String::new();
            for item in items {
                match item {
                    Value::String(s) => text.push_str(s),
                    other => {
                        return Err(TranscriptionFailure::Parse(format!(
                            "unexpected result item: {other}"
                        )));
                    }
                }
            }
            text
        }
        Some(other) => {
            return Err(TranscriptionFailure::Parse(format!(
                "unexpected result type: {other}"
            )));
        }
    };

    if text.trim().is_empty() {
        return Err(TranscriptionFailure::EmptyResult);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_array() {
        assert_eq!(parse_response(r#"{"result":["你好"]}"#).unwrap(), "你好");
    }

    #[test]
    fn test_parse_result_array_concatenates() {
        let body = r#"{"errorCode":"0","result":["今天天气", "不错"]}"#;
        assert_eq!(parse_response(body).unwrap(), "今天天气不错");
    }

    #[test]
    fn test_parse_result_string() {
        assert_eq!(
            parse_response(r#"{"errorCode":0,"result":"hello"}"#).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(matches!(parse_response(""), Err(TranscriptionFailure::Parse(_))));
        assert!(matches!(parse_response("  \n"), Err(TranscriptionFailure::Parse(_))));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(matches!(
            parse_response("<html>Bad Gateway</html>"),
            Err(TranscriptionFailure::Parse(_))
        ));
    }

    #[test]
    fn test_parse_not_object() {
        assert!(matches!(
            parse_response(r#"["你好"]"#),
            Err(TranscriptionFailure::Parse(_))
        ));
    }

    #[test]
    fn test_parse_schema_mismatch() {
        assert!(matches!(
            parse_response(r#"{"result": 42}"#),
            Err(TranscriptionFailure::Parse(_))
        ));
        assert!(matches!(
            parse_response(r#"{"result": [1, 2]}"#),
            Err(TranscriptionFailure::Parse(_))
        ));
    }

    #[test]
    fn test_parse_missing_result() {
        assert!(matches!(
            parse_response(r#"{"errorCode":"0"}"#),
            Err(TranscriptionFailure::EmptyResult)
        ));
        assert!(matches!(
            parse_response(r#"{"result": null}"#),
            Err(TranscriptionFailure::EmptyResult)
        ));
    }

    #[test]
    fn test_parse_blank_result() {
        assert!(matches!(
            parse_response(r#"{"result":[]}"#),
            Err(TranscriptionFailure::EmptyResult)
        ));
        assert!(matches!(
            parse_response(r#"{"result":["  ", ""]}"#),
            Err(TranscriptionFailure::EmptyResult)
        ));
    }

    #[test]
    fn test_parse_service_error() {
        let err = parse_response(r#"{"errorCode":"108","msg":"invalid appKey"}"#).unwrap_err();
        match err {
            TranscriptionFailure::Service { code, message } => {
                assert_eq!(code, "108");
                assert_eq!(message, "invalid appKey");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_request_form_field_names() {
        let request = TranscriptionRequest {
            app_key: "key".to_string(),
            payload_base64: "UklGRg==".to_string(),
            format: "wav".to_string(),
            sample_rate_hz: 16000,
            channel_count: 1,
            upload_type: "1".to_string(),
            language_hint: "zh-CHS".to_string(),
            salt: "salt".to_string(),
            timestamp_seconds: "1700000000".to_string(),
            signature: "ABCDEF".to_string(),
            signature_version: "v2".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        for field in [
            "appKey", "q", "format", "rate", "channel", "type", "langType", "salt", "curtime",
            "sign", "signType",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["signType"], "v2");
        assert_eq!(json["rate"], 16000);
    }
}
