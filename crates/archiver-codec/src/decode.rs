use serde_json::{Map, Value};

use crate::error::CodecResult;
use crate::schema::{FieldKind, FieldSpec, ObjectSchema, join_column};
use crate::scalar::decode_scalar;
use crate::value::RowSource;

/// Decode a row back into the object shape it was encoded from: the inverse of [`crate::encode::encode_object`].
///
/// `extras` is whatever was stored alongside the row's columns (`None` if
/// the object never had any); its nested shape mirrors the `sub` fields it
/// was captured under.
pub fn decode_object(schema: ObjectSchema, row: &dyn RowSource, extras: Option<&Value>) -> CodecResult<Value> {
    let extras_obj = extras.and_then(Value::as_object);
    let fields = decode_fields(schema, "", row, extras_obj)?;
    Ok(Value::Object(fields))
}

fn decode_fields(
    schema: &[FieldSpec],
    prefix: &str,
    row: &dyn RowSource,
    extras: Option<&Map<String, Value>>,
) -> CodecResult<Map<String, Value>> {
    let mut out = Map::new();
    for field in schema {
        let path = join_column(prefix, field.key);
        match field.kind {
            FieldKind::Scalar(ty) => {
                let column = row.get(&path);
                match column {
                    Some(value) if !value.is_null() => {
                        out.insert(field.key.to_string(), decode_scalar(&path, ty, value)?);
                    }
                    _ => {
                        if let Some(decoded) = field.null_policy.decode_absent() {
                            out.insert(field.key.to_string(), decoded);
                        }
                    }
                }
            }
            FieldKind::Sub(sub_schema) => {
                let sub_extras = extras.and_then(|e| e.get(field.key)).and_then(Value::as_object);
                let sub = decode_fields(sub_schema, &path, row, sub_extras)?;
                out.insert(field.key.to_string(), Value::Object(sub));
            }
            FieldKind::Extra => {
                if let Some(value) = extras.and_then(|e| e.get(field.key)) {
                    out.insert(field.key.to_string(), value.clone());
                } else if let Some(decoded) = field.null_policy.decode_absent() {
                    out.insert(field.key.to_string(), decoded);
                }
            }
            FieldKind::Ignore => {}
        }
    }
    // Anything left in the extras map that isn't a declared `extra` field is
    // an unrecognized field preserved verbatim from encode time.
    if let Some(extras) = extras {
        let declared: std::collections::HashSet<&str> =
            schema.iter().map(|f| f.key).collect();
        for (key, value) in extras {
            if !declared.contains(key.as_str()) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NullPolicy, ScalarType};
    use crate::value::ColumnValue;
    use std::collections::BTreeMap;

    const SUB: &[FieldSpec] = &[FieldSpec::scalar(
        "id",
        ScalarType::Int64AsString,
        NullPolicy::Absent,
        true,
    )];

    const SCHEMA: &[FieldSpec] = &[
        FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
        FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Absent, false),
        FieldSpec::sub("author", SUB, NullPolicy::Null, false),
        FieldSpec::extra("accent_color", NullPolicy::Absent),
    ];

    #[test]
    fn decode_is_inverse_of_encode_for_known_fields() {
        let mut row: BTreeMap<String, ColumnValue> = BTreeMap::new();
        row.insert("id".to_string(), ColumnValue::Integer(123));
        row.insert("name".to_string(), ColumnValue::Text("hello".to_string()));
        row.insert("author__id".to_string(), ColumnValue::Integer(9));
        let extras = serde_json::json!({ "accent_color": 12345, "mystery": "field" });
        let decoded = decode_object(SCHEMA, &row, Some(&extras)).unwrap();
        assert_eq!(decoded["id"], serde_json::json!("123"));
        assert_eq!(decoded["author"]["id"], serde_json::json!("9"));
        assert_eq!(decoded["accent_color"], serde_json::json!(12345));
        assert_eq!(decoded["mystery"], serde_json::json!("field"));
    }

    #[test]
    fn absent_extra_field_is_omitted() {
        let mut row: BTreeMap<String, ColumnValue> = BTreeMap::new();
        row.insert("id".to_string(), ColumnValue::Integer(1));
        row.insert("name".to_string(), ColumnValue::Text("x".to_string()));
        let decoded = decode_object(SCHEMA, &row, None).unwrap();
        assert!(decoded.as_object().unwrap().get("accent_color").is_none());
    }
}
