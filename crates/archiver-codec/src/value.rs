/// A column value in the flat relational row shape the codec produces.
///
/// Mirrors SQLite's dynamic column typing deliberately: a single column (the
/// emoji or image-hash columns, for instance) can legitimately hold
/// different variants across rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ColumnValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            ColumnValue::Blob(v) => Some(v),
            _ => None,
        }
    }
}

/// Read access to a row's flat columns, keyed by the dotted `__`-joined
/// column name the codec assigns to a (possibly nested) field.
pub trait RowSource {
    fn get(&self, column: &str) -> Option<&ColumnValue>;
}

impl RowSource for std::collections::BTreeMap<String, ColumnValue> {
    fn get(&self, column: &str) -> Option<&ColumnValue> {
        std::collections::BTreeMap::get(self, column)
    }
}

impl RowSource for std::collections::HashMap<String, ColumnValue> {
    fn get(&self, column: &str) -> Option<&ColumnValue> {
        std::collections::HashMap::get(self, column)
    }
}

/// An emoji reference, preserving the custom-vs-built-in distinction
/// needed at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum EmojiValue {
    Custom(i64),
    Unicode(String),
}
