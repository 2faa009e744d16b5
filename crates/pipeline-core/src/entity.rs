//! Versioned entity base.
//!
//! Every record written to the ledger is a JSON object whose first members
//! are the `class` discriminator and the record's composite `key`, followed
//! by the entity's own fields in declaration order. The encoding is
//! deterministic, so byte-for-byte comparison of two stored versions is
//! meaningful.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};
use crate::key::CompositeKey;

pub const CLASS_FIELD: &str = "class";
pub const KEY_FIELD: &str = "key";

/// A concrete record kind stored in the ledger.
pub trait Entity: Serialize + DeserializeOwned {
    /// Discriminator written into every serialized payload.
    const CLASS: &'static str;

    /// Ordered identity components; together they form the composite key.
    fn key_parts(&self) -> Vec<String>;

    fn key(&self, namespace: &str) -> CompositeKey {
        CompositeKey::new(namespace, self.key_parts())
    }
}

/// Decoder for one concrete entity type, injected into a collection.
pub type DecodeFn<T> = fn(&[u8]) -> Result<T>;

#[derive(Serialize)]
struct Envelope<'a, T> {
    class: &'a str,
    key: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

/// Serialize `entity` under `key` with its discriminator.
pub fn serialize<T: Entity>(entity: &T, key: &CompositeKey) -> Result<Vec<u8>> {
    let envelope = Envelope {
        class: T::CLASS,
        key: key.as_str(),
        body: entity,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse a stored payload, which must be a JSON object.
fn parse_object(bytes: &[u8]) -> Result<serde_json::Map<String, serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::Deserialization(e.to_string()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(PipelineError::Deserialization(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Discriminator of a stored payload, if it is a JSON object that has one.
pub fn class_of(bytes: &[u8]) -> Result<String> {
    let map = parse_object(bytes)?;
    match map.get(CLASS_FIELD) {
        Some(serde_json::Value::String(class)) => Ok(class.clone()),
        Some(_) => Err(PipelineError::Deserialization(
            "record class is not a string".to_string(),
        )),
        None => Err(PipelineError::Deserialization(
            "record has no class".to_string(),
        )),
    }
}

/// Decode a stored payload as `T`.
///
/// Fails with `Deserialization` on malformed input or when the payload's
/// discriminator is not `T::CLASS`.
pub fn deserialize<T: Entity>(bytes: &[u8]) -> Result<T> {
    let mut map = parse_object(bytes)?;
    match map.remove(CLASS_FIELD) {
        Some(serde_json::Value::String(class)) if class == T::CLASS => {}
        Some(serde_json::Value::String(class)) => {
            return Err(PipelineError::Deserialization(format!(
                "expected class '{}', found '{class}'",
                T::CLASS
            )))
        }
        _ => {
            return Err(PipelineError::Deserialization(format!(
                "payload has no class, expected '{}'",
                T::CLASS
            )))
        }
    }
    map.remove(KEY_FIELD);
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| PipelineError::Deserialization(e.to_string()))
}

/// Extra members a newer writer attached to a record. Kept through a
/// read-modify-write so older readers never drop them.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// DecoderRegistry
// ---------------------------------------------------------------------------

/// Generic decode function: bytes to the record's JSON form.
pub type ValueDecodeFn = fn(&[u8]) -> Result<serde_json::Value>;

/// Maps discriminators to decode functions, so scans over a shared store can
/// decode records of any registered kind without knowing the concrete type.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    decoders: BTreeMap<String, ValueDecodeFn>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the decoder for `T`, validating payloads against `T` before
    /// handing back their JSON form.
    pub fn register<T: Entity>(&mut self) -> &mut Self {
        self.decoders.insert(T::CLASS.to_string(), decode_as_value::<T>);
        self
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.decoders.contains_key(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Decode `bytes` with the decoder registered for their discriminator.
    pub fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        let class = class_of(bytes)?;
        let decoder = self.decoders.get(&class).ok_or_else(|| {
            PipelineError::Deserialization(format!("no decoder registered for class '{class}'"))
        })?;
        decoder(bytes)
    }
}

fn decode_as_value<T: Entity>(bytes: &[u8]) -> Result<serde_json::Value> {
    deserialize::<T>(bytes)?;
    Ok(serde_json::from_slice(bytes)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        sku: String,
        colour: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u32>,
        #[serde(flatten)]
        extra: ExtraFields,
    }

    impl Entity for Widget {
        const CLASS: &'static str = "test.widget";

        fn key_parts(&self) -> Vec<String> {
            vec![self.sku.clone()]
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Gadget {
        id: String,
    }

    impl Entity for Gadget {
        const CLASS: &'static str = "test.gadget";

        fn key_parts(&self) -> Vec<String> {
            vec![self.id.clone()]
        }
    }

    fn widget() -> Widget {
        Widget {
            sku: "w-1".into(),
            colour: "red".into(),
            size: Some(3),
            extra: ExtraFields::new(),
        }
    }

    #[test]
    fn serialize_puts_class_and_key_first() {
        let w = widget();
        let bytes = serialize(&w, &w.key("widgets")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"class":"test.widget","key":""#), "{text}");
        assert!(text.ends_with(r#""sku":"w-1","colour":"red","size":3}"#), "{text}");
    }

    #[test]
    fn serialize_is_deterministic() {
        let w = widget();
        let key = w.key("widgets");
        assert_eq!(serialize(&w, &key).unwrap(), serialize(&w.clone(), &key).unwrap());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let w = widget();
        let bytes = serialize(&w, &w.key("widgets")).unwrap();
        let back: Widget = deserialize(&bytes).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn unknown_members_survive_round_trip() {
        let raw = br#"{"class":"test.widget","key":"k","sku":"w-2","colour":"blue","reviewer":"Ola"}"#;
        let w: Widget = deserialize(raw).unwrap();
        assert_eq!(w.extra.get("reviewer"), Some(&serde_json::json!("Ola")));

        let again = serialize(&w, &w.key("widgets")).unwrap();
        let text = String::from_utf8(again).unwrap();
        assert!(text.contains(r#""reviewer":"Ola""#));
    }

    #[test]
    fn class_mismatch_is_rejected() {
        let g = Gadget { id: "g".into() };
        let bytes = serialize(&g, &g.key("gadgets")).unwrap();
        let err = deserialize::<Widget>(&bytes).unwrap_err();
        assert!(matches!(err, PipelineError::Deserialization(_)));
        assert!(err.to_string().contains("test.gadget"));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let cases: [&[u8]; 4] = [b"not json", b"[1,2]", br#"{"sku":"x"}"#, br#"{"class":7}"#];
        for raw in cases {
            let err = deserialize::<Widget>(raw).unwrap_err();
            assert!(matches!(err, PipelineError::Deserialization(_)), "{raw:?}");
        }
    }

    #[test]
    fn registry_dispatches_on_class() {
        let mut registry = DecoderRegistry::new();
        registry.register::<Widget>().register::<Gadget>();
        assert!(registry.is_registered("test.gadget"));

        let g = Gadget { id: "g-9".into() };
        let value = registry.decode(&serialize(&g, &g.key("gadgets")).unwrap()).unwrap();
        assert_eq!(value["id"], "g-9");

        let err = registry
            .decode(br#"{"class":"test.unknown"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("test.unknown"));
    }
}
