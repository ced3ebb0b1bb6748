//! Fuzz target: envelope boundary validation
//!
//! Feeds arbitrary bytes through the JSON parser into
//! `RpcRequest::from_value` and checks the boundary contract: whatever
//! comes out is either a fully-formed request (non-empty string method,
//! array/object/null params) or nothing at all.
//!
//! cargo fuzz run fuzz_envelope_parse

#![no_main]

use glowlink::RpcRequest;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    if let Some(req) = RpcRequest::from_value(value, 0) {
        assert!(!req.method.is_empty());
        assert!(matches!(
            req.params,
            Value::Null | Value::Array(_) | Value::Object(_)
        ));
        // A null id must have been normalised to a notification.
        assert!(req.id.as_ref().is_none_or(|id| !id.is_null()));
    }
});
