use archiver_codec::ColumnValue;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

pub(crate) fn to_sql(value: &ColumnValue) -> ToSqlOutput<'_> {
    match value {
        ColumnValue::Null => ToSqlOutput::Owned(Value::Null),
        ColumnValue::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
        ColumnValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
        ColumnValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        ColumnValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
    }
}

pub(crate) fn from_value_ref(value: ValueRef<'_>) -> ColumnValue {
    match value {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(n) => ColumnValue::Integer(n),
        ValueRef::Real(f) => ColumnValue::Real(f),
        ValueRef::Text(bytes) => {
            ColumnValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(bytes) => ColumnValue::Blob(bytes.to_vec()),
    }
}
