//! Canonical form rewriting for CBOR values.

use crate::error::{CodecError, CodecResult};
use ciborium::Value;

/// Rewrites a CBOR value into canonical form.
///
/// Arrays and map values are canonicalized recursively; map entries are
/// sorted by the encoded bytes of their keys. Floats and duplicate keys
/// are rejected.
pub fn canonicalize(value: Value) -> CodecResult<Value> {
    match value {
        Value::Integer(_) | Value::Bytes(_) | Value::Text(_) | Value::Bool(_) | Value::Null => {
            Ok(value)
        }
        Value::Float(_) => Err(CodecError::Float),
        Value::Tag(tag, inner) => Ok(Value::Tag(tag, Box::new(canonicalize(*inner)?))),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(canonicalize(item)?);
            }
            Ok(Value::Array(out))
        }
        Value::Map(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (key, val) in entries {
                let key = canonicalize(key)?;
                let val = canonicalize(val)?;
                keyed.push((encode_key(&key)?, key, val));
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            for pair in keyed.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(CodecError::DuplicateKey);
                }
            }
            Ok(Value::Map(
                keyed.into_iter().map(|(_, k, v)| (k, v)).collect(),
            ))
        }
        other => Err(CodecError::Unsupported(format!("{other:?}"))),
    }
}

fn encode_key(key: &Value) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(key, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn sorts_map_entries_by_encoded_key() {
        let value = Value::Map(vec![
            (text("zz"), Value::Integer(1.into())),
            (text("a"), Value::Integer(2.into())),
        ]);
        let canonical = canonicalize(value).unwrap();
        let Value::Map(entries) = canonical else {
            panic!("expected map");
        };
        assert_eq!(entries[0].0, text("a"));
        assert_eq!(entries[1].0, text("zz"));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let value = Value::Map(vec![
            (text("k"), Value::Integer(1.into())),
            (text("k"), Value::Integer(2.into())),
        ]);
        assert!(matches!(canonicalize(value), Err(CodecError::DuplicateKey)));
    }

    #[test]
    fn rejects_floats_nested_in_arrays() {
        let value = Value::Array(vec![Value::Integer(1.into()), Value::Float(0.5)]);
        assert!(matches!(canonicalize(value), Err(CodecError::Float)));
    }

    #[test]
    fn canonicalizes_nested_maps() {
        let inner = Value::Map(vec![
            (text("b"), Value::Null),
            (text("a"), Value::Bool(true)),
        ]);
        let value = Value::Map(vec![(text("outer"), inner)]);
        let canonical = canonicalize(value).unwrap();
        let Value::Map(entries) = canonical else {
            panic!("expected map");
        };
        let Value::Map(inner) = &entries[0].1 else {
            panic!("expected inner map");
        };
        assert_eq!(inner[0].0, text("a"));
    }
}
