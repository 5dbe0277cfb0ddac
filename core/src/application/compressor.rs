// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Output compressor (§4.10): a pure recursive function that collapses
//! long arrays into a `{count, sample}` summary so large tool results
//! don't blow out the client's context budget.

use serde_json::{json, Value};

/// `threshold <= 0` is a caller bug, not a runtime condition — the source
/// raises `ValueError` for it; the idiomatic translation is `panic!`,
/// since this can only happen from a hardcoded misconfiguration, never
/// from untrusted input.
pub fn encode(value: &Value, threshold: usize) -> Value {
    assert!(threshold > 0, "compressor threshold must be positive");
    encode_recursive(value, threshold)
}

fn encode_recursive(value: &Value, threshold: usize) -> Value {
    match value {
        Value::Array(items) => {
            if items.len() > threshold {
                let sample: Vec<Value> = items
                    .iter()
                    .take(3)
                    .map(|v| encode_recursive(v, threshold))
                    .collect();
                json!({
                    "__toon": true,
                    "count": items.len(),
                    "sample": sample,
                })
            } else {
                Value::Array(items.iter().map(|v| encode_recursive(v, threshold)).collect())
            }
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), encode_recursive(v, threshold));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Never let a compression bug propagate into a tool response — fail
/// ignored, returning the raw value, per §7. Unlike `encode`, a
/// non-positive threshold here is a misconfigured feature flag, not a
/// programmer error, so it degrades instead of panicking.
pub fn encode_best_effort(value: &Value, threshold: usize) -> Value {
    if threshold == 0 {
        return value.clone();
    }
    encode_recursive(value, threshold)
}
