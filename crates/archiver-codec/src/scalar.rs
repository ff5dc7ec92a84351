use std::sync::OnceLock;

use base64::Engine as _;
use snafu::{OptionExt as _, ResultExt as _};

use crate::error::{
    CodecResult, InvalidBase64Snafu, InvalidIdArrayLengthSnafu,
    InvalidPermissionOverwriteLengthSnafu, InvalidTimestampSnafu, TypeMismatchSnafu,
};
use crate::schema::ScalarType;
use crate::value::{ColumnValue, EmojiValue};

fn image_hash_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(a_)?[0-9a-f]{32}$").expect("valid regex"))
}

/// Encode one scalar field. `path` is only used for error messages.
pub fn encode_scalar(path: &str, ty: ScalarType, value: &serde_json::Value) -> CodecResult<ColumnValue> {
    match ty {
        ScalarType::Str => {
            let s = value
                .as_str()
                .with_context(|| TypeMismatchSnafu {
                    path: path.to_string(),
                    expected: "string",
                    got: describe(value),
                })?;
            Ok(ColumnValue::Text(s.to_string()))
        }
        ScalarType::Bool { .. } => {
            let b = value.as_bool().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "bool",
                got: describe(value),
            })?;
            Ok(ColumnValue::Integer(b as i64))
        }
        ScalarType::Int64AsString => {
            let n = parse_i64_from_string_or_number(path, value)?;
            Ok(ColumnValue::Integer(n))
        }
        ScalarType::Integer => {
            let n = value.as_i64().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "integer",
                got: describe(value),
            })?;
            Ok(ColumnValue::Integer(n))
        }
        ScalarType::Float => {
            let f = value.as_f64().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "float",
                got: describe(value),
            })?;
            Ok(ColumnValue::Real(f))
        }
        ScalarType::Base64Blob => {
            let s = value.as_str().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "base64 string",
                got: describe(value),
            })?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .context(InvalidBase64Snafu {
                    path: path.to_string(),
                })?;
            Ok(ColumnValue::Blob(bytes))
        }
        ScalarType::ImageHash => {
            let s = value.as_str().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "image hash string",
                got: describe(value),
            })?;
            Ok(encode_image_hash(s))
        }
        ScalarType::IdArray => {
            let arr = value.as_array().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "array",
                got: describe(value),
            })?;
            let mut bytes = Vec::with_capacity(arr.len() * 8);
            for item in arr {
                let n = parse_i64_from_string_or_number(path, item)?;
                bytes.extend_from_slice(&(n as u64).to_be_bytes());
            }
            Ok(ColumnValue::Blob(bytes))
        }
        ScalarType::PermissionOverwrites => {
            let arr = value.as_array().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "array",
                got: describe(value),
            })?;
            let mut bytes = Vec::with_capacity(arr.len() * 25);
            for item in arr {
                let obj = item.as_object().with_context(|| TypeMismatchSnafu {
                    path: path.to_string(),
                    expected: "permission overwrite object",
                    got: describe(item),
                })?;
                let ty = obj
                    .get("type")
                    .and_then(|v| v.as_u64())
                    .with_context(|| TypeMismatchSnafu {
                        path: path.to_string(),
                        expected: "overwrite.type",
                        got: "missing".to_string(),
                    })?;
                let id = parse_i64_from_string_or_number(
                    path,
                    obj.get("id").unwrap_or(&serde_json::Value::Null),
                )? as u64;
                let allow = parse_u64_from_string(path, obj, "allow")?;
                let deny = parse_u64_from_string(path, obj, "deny")?;
                bytes.push(ty as u8);
                bytes.extend_from_slice(&id.to_be_bytes());
                bytes.extend_from_slice(&allow.to_be_bytes());
                bytes.extend_from_slice(&deny.to_be_bytes());
            }
            Ok(ColumnValue::Blob(bytes))
        }
        ScalarType::Timestamp => {
            let s = value.as_str().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "ISO-8601 timestamp",
                got: describe(value),
            })?;
            let ms = parse_timestamp_ms(path, s)?;
            Ok(ColumnValue::Integer(ms))
        }
        ScalarType::Emoji => match value {
            serde_json::Value::String(s) => Ok(ColumnValue::Text(s.clone())),
            serde_json::Value::Object(obj) => {
                if let Some(id) = obj.get("id").filter(|v| !v.is_null()) {
                    let n = parse_i64_from_string_or_number(path, id)?;
                    Ok(ColumnValue::Integer(n))
                } else if let Some(name) = obj.get("name").and_then(|v| v.as_str()) {
                    Ok(ColumnValue::Text(name.to_string()))
                } else {
                    TypeMismatchSnafu {
                        path: path.to_string(),
                        expected: "emoji id or name",
                        got: describe(value),
                    }
                    .fail()
                }
            }
            _ => TypeMismatchSnafu {
                path: path.to_string(),
                expected: "emoji id or name",
                got: describe(value),
            }
            .fail(),
        },
        ScalarType::Json => Ok(ColumnValue::Text(value.to_string())),
        ScalarType::NullSentinel => {
            if value.is_null() {
                Ok(ColumnValue::Null)
            } else {
                TypeMismatchSnafu {
                    path: path.to_string(),
                    expected: "null",
                    got: describe(value),
                }
                .fail()
            }
        }
    }
}

pub fn decode_scalar(path: &str, ty: ScalarType, value: &ColumnValue) -> CodecResult<serde_json::Value> {
    use serde_json::Value as J;
    match ty {
        ScalarType::Str => Ok(J::String(
            value
                .as_text()
                .with_context(|| TypeMismatchSnafu {
                    path: path.to_string(),
                    expected: "text column",
                    got: format!("{value:?}"),
                })?
                .to_string(),
        )),
        ScalarType::Bool { .. } => {
            let n = value.as_integer().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "integer column",
                got: format!("{value:?}"),
            })?;
            Ok(J::Bool(n != 0))
        }
        ScalarType::Int64AsString | ScalarType::Integer => {
            let n = value.as_integer().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "integer column",
                got: format!("{value:?}"),
            })?;
            if matches!(ty, ScalarType::Int64AsString) {
                Ok(J::String(n.to_string()))
            } else {
                Ok(J::Number(n.into()))
            }
        }
        ScalarType::Float => {
            let f = match value {
                ColumnValue::Real(f) => *f,
                ColumnValue::Integer(n) => *n as f64,
                _ => {
                    return TypeMismatchSnafu {
                        path: path.to_string(),
                        expected: "real column",
                        got: format!("{value:?}"),
                    }
                    .fail()
                }
            };
            Ok(serde_json::Number::from_f64(f).map(J::Number).unwrap_or(J::Null))
        }
        ScalarType::Base64Blob => {
            let bytes = value.as_blob().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "blob column",
                got: format!("{value:?}"),
            })?;
            Ok(J::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
        }
        ScalarType::ImageHash => Ok(J::String(decode_image_hash(value)?)),
        ScalarType::IdArray => {
            let bytes = value.as_blob().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "blob column",
                got: format!("{value:?}"),
            })?;
            if bytes.len() % 8 != 0 {
                return InvalidIdArrayLengthSnafu {
                    path: path.to_string(),
                    len: bytes.len(),
                }
                .fail();
            }
            let ids = bytes
                .chunks_exact(8)
                .map(|c| {
                    let n = u64::from_be_bytes(c.try_into().expect("chunk of 8"));
                    J::String(n.to_string())
                })
                .collect();
            Ok(J::Array(ids))
        }
        ScalarType::PermissionOverwrites => {
            let bytes = value.as_blob().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "blob column",
                got: format!("{value:?}"),
            })?;
            if bytes.len() % 25 != 0 {
                return InvalidPermissionOverwriteLengthSnafu {
                    path: path.to_string(),
                    len: bytes.len(),
                }
                .fail();
            }
            let overwrites = bytes
                .chunks_exact(25)
                .map(|c| {
                    let ty = c[0];
                    let id = u64::from_be_bytes(c[1..9].try_into().expect("8 bytes"));
                    let allow = u64::from_be_bytes(c[9..17].try_into().expect("8 bytes"));
                    let deny = u64::from_be_bytes(c[17..25].try_into().expect("8 bytes"));
                    let mut obj = serde_json::Map::new();
                    obj.insert("type".to_string(), J::Number(ty.into()));
                    obj.insert("id".to_string(), J::String(id.to_string()));
                    obj.insert("allow".to_string(), J::String(allow.to_string()));
                    obj.insert("deny".to_string(), J::String(deny.to_string()));
                    J::Object(obj)
                })
                .collect();
            Ok(J::Array(overwrites))
        }
        ScalarType::Timestamp => {
            let ms = value.as_integer().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "integer column",
                got: format!("{value:?}"),
            })?;
            Ok(J::String(format_timestamp_ms(ms)))
        }
        ScalarType::Emoji => match value {
            ColumnValue::Integer(n) => Ok(emoji_to_json(EmojiValue::Custom(*n))),
            ColumnValue::Text(s) => Ok(emoji_to_json(EmojiValue::Unicode(s.clone()))),
            _ => TypeMismatchSnafu {
                path: path.to_string(),
                expected: "emoji column",
                got: format!("{value:?}"),
            }
            .fail(),
        },
        ScalarType::Json => {
            let s = value.as_text().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "json text column",
                got: format!("{value:?}"),
            })?;
            serde_json::from_str(s).ok().with_context(|| TypeMismatchSnafu {
                path: path.to_string(),
                expected: "valid json",
                got: s.to_string(),
            })
        }
        ScalarType::NullSentinel => Ok(J::Null),
    }
}

fn emoji_to_json(emoji: EmojiValue) -> serde_json::Value {
    match emoji {
        EmojiValue::Custom(id) => {
            let mut obj = serde_json::Map::new();
            obj.insert("id".to_string(), serde_json::Value::String(id.to_string()));
            obj.insert("name".to_string(), serde_json::Value::String(String::new()));
            serde_json::Value::Object(obj)
        }
        EmojiValue::Unicode(s) => {
            let mut obj = serde_json::Map::new();
            obj.insert("id".to_string(), serde_json::Value::Null);
            obj.insert("name".to_string(), serde_json::Value::String(s));
            serde_json::Value::Object(obj)
        }
    }
}

fn encode_image_hash(s: &str) -> ColumnValue {
    if !image_hash_re().is_match(s) {
        return ColumnValue::Text(s.to_string());
    }
    let animated = s.starts_with("a_");
    let hex = if animated { &s[2..] } else { s };
    let mut bytes = Vec::with_capacity(17);
    bytes.push(animated as u8);
    for i in 0..16 {
        let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).expect("regex validated hex");
        bytes.push(byte);
    }
    ColumnValue::Blob(bytes)
}

fn decode_image_hash(value: &ColumnValue) -> CodecResult<String> {
    match value {
        ColumnValue::Text(s) => Ok(s.clone()),
        ColumnValue::Blob(bytes) if bytes.len() == 17 => {
            let animated = bytes[0] & 1 != 0;
            let mut hex = String::with_capacity(34);
            if animated {
                hex.push_str("a_");
            }
            for b in &bytes[1..] {
                hex.push_str(&format!("{b:02x}"));
            }
            Ok(hex)
        }
        other => TypeMismatchSnafu {
            path: "image_hash".to_string(),
            expected: "17-byte blob or text",
            got: format!("{other:?}"),
        }
        .fail(),
    }
}

fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn parse_i64_from_string_or_number(path: &str, value: &serde_json::Value) -> CodecResult<i64> {
    match value {
        serde_json::Value::String(s) => s.parse::<i64>().ok().with_context(|| {
            crate::error::IntegerOverflowSnafu {
                path: path.to_string(),
                value: s.clone(),
            }
        }),
        serde_json::Value::Number(n) => n.as_i64().with_context(|| {
            crate::error::IntegerOverflowSnafu {
                path: path.to_string(),
                value: n.to_string(),
            }
        }),
        other => TypeMismatchSnafu {
            path: path.to_string(),
            expected: "integer or numeric string",
            got: describe(other),
        }
        .fail(),
    }
}

fn parse_u64_from_string(
    path: &str,
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> CodecResult<u64> {
    let value = obj.get(field).unwrap_or(&serde_json::Value::Null);
    match value {
        serde_json::Value::String(s) => s.parse::<u64>().ok().with_context(|| {
            crate::error::IntegerOverflowSnafu {
                path: format!("{path}.{field}"),
                value: s.clone(),
            }
        }),
        serde_json::Value::Number(n) => n.as_u64().with_context(|| {
            crate::error::IntegerOverflowSnafu {
                path: format!("{path}.{field}"),
                value: n.to_string(),
            }
        }),
        other => TypeMismatchSnafu {
            path: format!("{path}.{field}"),
            expected: "u64 or numeric string",
            got: describe(other),
        }
        .fail(),
    }
}

fn parse_timestamp_ms(path: &str, s: &str) -> CodecResult<i64> {
    use time::format_description::well_known::Rfc3339;
    let odt = time::OffsetDateTime::parse(s, &Rfc3339)
        .ok()
        .with_context(|| InvalidTimestampSnafu {
            path: path.to_string(),
            text: s.to_string(),
        })?;
    Ok(odt.unix_timestamp() * 1000 + i64::from(odt.millisecond()))
}

fn format_timestamp_ms(ms: i64) -> String {
    use time::format_description::well_known::Rfc3339;
    let odt = time::OffsetDateTime::from_unix_timestamp(ms.div_euclid(1000))
        .expect("in-range timestamp")
        + time::Duration::milliseconds(ms.rem_euclid(1000));
    odt.format(&Rfc3339).expect("RFC3339 formats any OffsetDateTime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_hash_roundtrips_valid_hex() {
        let hash = "5fc4ad372a7f6e47a8e1a3b1e6c8a123";
        let encoded = encode_image_hash(hash);
        assert_eq!(decode_image_hash(&encoded).unwrap(), hash);
    }

    #[test]
    fn image_hash_roundtrips_animated_flag() {
        let hash = "a_5fc4ad372a7f6e47a8e1a3b1e6c8a123";
        let encoded = encode_image_hash(hash);
        assert_eq!(decode_image_hash(&encoded).unwrap(), hash);
    }

    #[test]
    fn image_hash_passes_through_non_matching_values() {
        let weird = "not-a-real-hash";
        let encoded = encode_image_hash(weird);
        assert_eq!(encoded, ColumnValue::Text(weird.to_string()));
        assert_eq!(decode_image_hash(&encoded).unwrap(), weird);
    }

    #[test]
    fn id_array_rejects_lengths_not_divisible_by_8() {
        let bad = ColumnValue::Blob(vec![0u8; 7]);
        let err = decode_scalar("ids", ScalarType::IdArray, &bad).unwrap_err();
        assert!(matches!(err, crate::error::CodecError::InvalidIdArrayLength { .. }));
    }

    #[test]
    fn timestamp_roundtrips_through_ms() {
        let ms = parse_timestamp_ms("t", "2025-04-01T12:00:00.000Z").unwrap();
        assert_eq!(format_timestamp_ms(ms), "2025-04-01T12:00:00Z");
    }

    #[test]
    fn emoji_distinguishes_custom_and_unicode() {
        let custom = emoji_to_json(EmojiValue::Custom(42));
        assert_eq!(custom["id"], serde_json::json!("42"));
        assert_eq!(custom["name"], serde_json::json!(""), "unknown custom-emoji name decodes as empty string");
        let unicode = emoji_to_json(EmojiValue::Unicode("👍".to_string()));
        assert_eq!(unicode["name"], serde_json::json!("👍"));
    }
}

#[cfg(test)]
mod proptest_roundtrip {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn id_array_roundtrips_any_id_list(ids in prop::collection::vec(any::<u64>(), 0..20)) {
            let input = serde_json::Value::Array(
                ids.iter().map(|id| serde_json::Value::String(id.to_string())).collect(),
            );
            let encoded = encode_scalar("ids", ScalarType::IdArray, &input).unwrap();
            let decoded = decode_scalar("ids", ScalarType::IdArray, &encoded).unwrap();
            let round_tripped: Vec<u64> = decoded
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().parse().unwrap())
                .collect();
            prop_assert_eq!(round_tripped, ids);
        }

        #[test]
        fn permission_overwrites_roundtrip_any_values(
            ty in 0u8..2,
            id in any::<u64>(),
            allow in any::<u64>(),
            deny in any::<u64>(),
        ) {
            let input = serde_json::json!([{
                "type": ty,
                "id": id.to_string(),
                "allow": allow.to_string(),
                "deny": deny.to_string(),
            }]);
            let encoded = encode_scalar("ow", ScalarType::PermissionOverwrites, &input).unwrap();
            let decoded = decode_scalar("ow", ScalarType::PermissionOverwrites, &encoded).unwrap();
            let row = &decoded.as_array().unwrap()[0];
            prop_assert_eq!(row["type"].as_u64().unwrap(), ty as u64);
            prop_assert_eq!(row["id"].as_str().unwrap().parse::<u64>().unwrap(), id);
            prop_assert_eq!(row["allow"].as_str().unwrap().parse::<u64>().unwrap(), allow);
            prop_assert_eq!(row["deny"].as_str().unwrap().parse::<u64>().unwrap(), deny);
        }
    }
}
