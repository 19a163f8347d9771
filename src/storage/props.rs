//! Typed property columns.
//!
//! A property is stored as one cell: the qualifier is
//! `name || PROP_TYPE_DELIM || tag-name` and the value holds the
//! type-specific encoding. Numbers are big-endian IEEE-754 / two's
//! complement, strings are UTF-8, booleans a single `0x00`/`0x01` byte.

use crate::types::{GraphError, Result};

use super::types::{PropValue, TypeTag};

/// Separates the property name from its type tag inside a qualifier.
pub const PROP_TYPE_DELIM: u8 = b'$';

/// Builds the column qualifier for `name` stored as `tag`.
pub fn encode_qualifier(name: &str, tag: TypeTag) -> Vec<u8> {
    let tag_name = tag.name();
    let mut buf = Vec::with_capacity(name.len() + 1 + tag_name.len());
    buf.extend_from_slice(name.as_bytes());
    buf.push(PROP_TYPE_DELIM);
    buf.extend_from_slice(tag_name.as_bytes());
    buf
}

/// Splits a qualifier into property name and tag.
///
/// The last delimiter wins so property names may themselves contain it.
pub fn decode_qualifier(qualifier: &[u8]) -> Result<(String, TypeTag)> {
    let text = std::str::from_utf8(qualifier)
        .map_err(|_| GraphError::UnsupportedType("qualifier is not utf8".into()))?;
    let (name, tag_name) = text.rsplit_once(PROP_TYPE_DELIM as char).ok_or_else(|| {
        GraphError::UnsupportedType(format!("qualifier '{text}' carries no type tag"))
    })?;
    let tag = TypeTag::from_name(tag_name).ok_or_else(|| {
        GraphError::UnsupportedType(format!("unknown type tag '{tag_name}' on '{name}'"))
    })?;
    Ok((name.to_owned(), tag))
}

/// Encodes a property value as its cell payload.
///
/// Numbers are big-endian, strings are their UTF-8 bytes and a boolean is a
/// single 0 or 1 byte. The type tag travels in the qualifier, not here.
pub fn encode_value(value: &PropValue) -> Vec<u8> {
    match value {
        PropValue::Str(v) => v.as_bytes().to_vec(),
        PropValue::Int(v) => v.to_be_bytes().to_vec(),
        PropValue::Long(v) => v.to_be_bytes().to_vec(),
        PropValue::Float(v) => v.to_be_bytes().to_vec(),
        PropValue::Double(v) => v.to_be_bytes().to_vec(),
        PropValue::Bool(v) => vec![u8::from(*v)],
    }
}

/// Decodes `bytes` as `tag`; a payload that does not fit the tag fails.
pub fn decode_value(tag: TypeTag, bytes: &[u8]) -> Result<PropValue> {
    let value = match tag {
        TypeTag::Str => PropValue::Str(
            String::from_utf8(bytes.to_vec())
                .map_err(|_| mismatch(tag, bytes.len(), "payload is not utf8"))?,
        ),
        TypeTag::Int => PropValue::Int(i32::from_be_bytes(fixed::<4>(tag, bytes)?)),
        TypeTag::Long => PropValue::Long(i64::from_be_bytes(fixed::<8>(tag, bytes)?)),
        TypeTag::Float => PropValue::Float(f32::from_be_bytes(fixed::<4>(tag, bytes)?)),
        TypeTag::Double => PropValue::Double(f64::from_be_bytes(fixed::<8>(tag, bytes)?)),
        TypeTag::Bool => match bytes {
            [0] => PropValue::Bool(false),
            [1] => PropValue::Bool(true),
            _ => return Err(mismatch(tag, bytes.len(), "boolean payload invalid")),
        },
    };
    Ok(value)
}

/// Decodes an optional cell, substituting the tag's default when absent.
pub fn decode_or_default(tag: TypeTag, bytes: Option<&[u8]>) -> Result<PropValue> {
    match bytes {
        Some(bytes) => decode_value(tag, bytes),
        None => Ok(tag.default_value()),
    }
}

/// Decodes a full cell given its qualifier.
pub fn decode_cell(qualifier: &[u8], value: &[u8]) -> Result<(String, PropValue)> {
    let (name, tag) = decode_qualifier(qualifier)?;
    Ok((name, decode_value(tag, value)?))
}

fn fixed<const N: usize>(tag: TypeTag, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| mismatch(tag, bytes.len(), "payload length mismatch"))
}

fn mismatch(tag: TypeTag, len: usize, reason: &str) -> GraphError {
    GraphError::UnsupportedType(format!("{reason} for {tag} ({len} bytes)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_roundtrip() {
        let q = encode_qualifier("pageRank", TypeTag::Double);
        assert_eq!(q, b"pageRank$Double".to_vec());
        assert_eq!(decode_qualifier(&q).unwrap(), ("pageRank".to_string(), TypeTag::Double));
    }

    #[test]
    fn qualifier_name_may_contain_delimiter() {
        let q = encode_qualifier("cost$usd", TypeTag::Long);
        assert_eq!(decode_qualifier(&q).unwrap(), ("cost$usd".to_string(), TypeTag::Long));
    }

    #[test]
    fn untagged_or_unknown_qualifier_fails() {
        assert!(matches!(decode_qualifier(b"pageRank"), Err(GraphError::UnsupportedType(_))));
        assert!(matches!(
            decode_qualifier(b"pageRank$Decimal"),
            Err(GraphError::UnsupportedType(_))
        ));
    }

    #[test]
    fn double_is_big_endian_ieee754() {
        let bytes = encode_value(&PropValue::Double(1.0));
        assert_eq!(bytes, vec![0x3f, 0xf0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn mismatched_payload_length_fails() {
        let bytes = encode_value(&PropValue::Int(7));
        assert!(matches!(
            decode_value(TypeTag::Double, &bytes),
            Err(GraphError::UnsupportedType(_))
        ));
        assert!(matches!(decode_value(TypeTag::Bool, &[2]), Err(GraphError::UnsupportedType(_))));
    }

    #[test]
    fn absent_rank_defaults_to_zero() {
        assert_eq!(decode_or_default(TypeTag::Double, None).unwrap(), PropValue::Double(0.0));
        assert_eq!(decode_or_default(TypeTag::Str, None).unwrap(), PropValue::Str(String::new()));
    }

    #[test]
    fn every_tag_roundtrips() {
        let samples = [
            PropValue::Str("héllo".into()),
            PropValue::Int(-42),
            PropValue::Long(i64::MIN),
            PropValue::Float(2.5),
            PropValue::Double(-0.125),
            PropValue::Bool(true),
        ];
        for value in samples {
            let decoded = decode_value(value.tag(), &encode_value(&value)).unwrap();
            assert_eq!(decoded, value);
        }
    }
}
