use std::collections::BTreeMap;

use archiver_core::ObjectKind;
use serde_json::{Map, Value};
use snafu::OptionExt as _;

use crate::error::{CodecResult, TypeMismatchSnafu};
use crate::extras::warn_unknown_field_once;
use crate::schema::{FieldKind, FieldSpec, NullPolicy, ObjectSchema, join_column};
use crate::scalar::encode_scalar;
use crate::value::ColumnValue;

/// Result of encoding one object: the flat columns plus an optional extras
/// blob. `extras` is `None` when nothing fell
/// through to the side channel, matching the "omit the column entirely when
/// empty" rule.
pub struct EncodedObject {
    pub columns: BTreeMap<String, ColumnValue>,
    pub extras: Option<Value>,
}

/// Encode a JSON object against `schema`.
///
/// Declared scalar fields become columns. Declared `sub` fields recurse and
/// flatten under `parent__child` column names. Declared `extra` fields and
/// any field the schema does not mention at all are folded into a nested
/// extras document that mirrors the input's own shape; unrecognized fields
/// are logged once per `(kind, path, key)` for the life of the process.
pub fn encode_object(kind: ObjectKind, schema: ObjectSchema, input: &Value) -> CodecResult<EncodedObject> {
    let obj = input.as_object().with_context(|| TypeMismatchSnafu {
        path: "$".to_string(),
        expected: "object",
        got: describe_top(input),
    })?;
    let mut columns = BTreeMap::new();
    let mut extras = Map::new();
    encode_fields(kind, schema, "", obj, &mut columns, &mut extras)?;
    Ok(EncodedObject {
        columns,
        extras: if extras.is_empty() { None } else { Some(Value::Object(extras)) },
    })
}

fn encode_fields(
    kind: ObjectKind,
    schema: &[FieldSpec],
    prefix: &str,
    obj: &Map<String, Value>,
    columns: &mut BTreeMap<String, ColumnValue>,
    extras: &mut Map<String, Value>,
) -> CodecResult<()> {
    let mut declared: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for field in schema {
        declared.insert(field.key);
        let path = join_column(prefix, field.key);
        let present = obj.get(field.key);
        match field.kind {
            FieldKind::Scalar(ty) => {
                let value = present.cloned().unwrap_or(Value::Null);
                if value.is_null() {
                    columns.insert(path, ColumnValue::Null);
                    continue;
                }
                let column = encode_scalar(&path, ty, &value)?;
                columns.insert(path, column);
            }
            FieldKind::Sub(sub_schema) => match present {
                Some(Value::Object(sub_obj)) => {
                    let mut sub_extras = Map::new();
                    encode_fields(kind, sub_schema, &path, sub_obj, columns, &mut sub_extras)?;
                    if !sub_extras.is_empty() {
                        extras.insert(field.key.to_string(), Value::Object(sub_extras));
                    }
                }
                Some(Value::Null) | None => {
                    for leaf in crate::schema::column_names(sub_schema) {
                        columns.insert(join_column(&path, &leaf), ColumnValue::Null);
                    }
                }
                Some(other) => {
                    return TypeMismatchSnafu {
                        path,
                        expected: "object",
                        got: describe_top(other),
                    }
                    .fail();
                }
            },
            FieldKind::Extra => {
                if let Some(value) = present {
                    if !field.null_policy.is_neutral(value) {
                        extras.insert(field.key.to_string(), value.clone());
                    }
                }
            }
            FieldKind::Ignore => {}
        }
    }
    for (key, value) in obj {
        if declared.contains(key.as_str()) {
            continue;
        }
        warn_unknown_field_once(kind, prefix, key);
        extras.insert(key.clone(), value.clone());
    }
    Ok(())
}

fn describe_top(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;

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
    fn known_fields_become_columns() {
        let input = serde_json::json!({
            "id": "123456789012345",
            "name": "hello",
            "author": { "id": "9" },
            "accent_color": 12345,
        });
        let encoded = encode_object(ObjectKind::Message, SCHEMA, &input).unwrap();
        assert_eq!(encoded.columns["name"].as_text(), Some("hello"));
        assert_eq!(encoded.columns["author__id"].as_integer(), Some(9));
        assert_eq!(encoded.extras.unwrap()["accent_color"], serde_json::json!(12345));
    }

    #[test]
    fn unknown_fields_fall_through_to_extras() {
        let input = serde_json::json!({
            "id": "1",
            "name": "hello",
            "author": { "id": "2" },
            "mystery": "field",
        });
        let encoded = encode_object(ObjectKind::Message, SCHEMA, &input).unwrap();
        assert_eq!(encoded.extras.unwrap()["mystery"], serde_json::json!("field"));
    }

    #[test]
    fn missing_sub_object_nulls_out_its_leaves() {
        let input = serde_json::json!({ "id": "1", "name": "hello" });
        let encoded = encode_object(ObjectKind::Message, SCHEMA, &input).unwrap();
        assert!(encoded.columns["author__id"].is_null());
    }
}
