//! Positional parameter helpers.
//!
//! Parameters arrive as a JSON array. A missing index and an explicit `null`
//! are treated the same.

use lobby_rpc::RpcError;
use serde_json::Value;

/// Parameter at `index` unless missing or `null`.
pub fn param(params: &[Value], index: usize) -> Option<&Value> {
    params.get(index).filter(|v| !v.is_null())
}

/// Optional string parameter; empty strings count as missing.
pub fn opt_str(params: &[Value], index: usize) -> Option<&str> {
    param(params, index)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Required non-empty string parameter, failing with `message`.
pub fn require_str<'a>(params: &'a [Value], index: usize, message: &str) -> Result<&'a str, RpcError> {
    opt_str(params, index).ok_or_else(|| RpcError::invalid_params(message))
}

/// Boolean parameter with a default.
pub fn opt_bool(params: &[Value], index: usize, default: bool) -> bool {
    param(params, index).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_missing_are_equivalent() {
        let params = [json!(null)];
        assert!(param(&params, 0).is_none());
        assert!(param(&params, 3).is_none());
    }

    #[test]
    fn strings() {
        let params = [json!("alpha"), json!(""), json!(5)];
        assert_eq!(opt_str(&params, 0), Some("alpha"));
        assert_eq!(opt_str(&params, 1), None);
        assert_eq!(opt_str(&params, 2), None);
        let err = require_str(&params, 1, "A key must be provided").unwrap_err();
        assert_eq!(err.code(), lobby_rpc::errors::INVALID_PARAMS);
        assert_eq!(err.to_string(), "A key must be provided");
    }

    #[test]
    fn bools_fall_back() {
        let params = [json!(false), json!("yes")];
        assert!(!opt_bool(&params, 0, true));
        assert!(opt_bool(&params, 1, true));
        assert!(!opt_bool(&params, 9, false));
    }
}
