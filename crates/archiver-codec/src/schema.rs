/// What happens on decode when storage holds `NULL` for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Storage-null means the field is omitted entirely on decode.
    Absent,
    /// Storage-null decodes to an explicit JSON `null`.
    Null,
    /// Storage-null decodes to `[]`.
    EmptyArray,
}

impl NullPolicy {
    /// The "neutral" value that does *not* get copied into the extras bag
    /// for `extra`-tagged fields.
    pub fn is_neutral(self, value: &serde_json::Value) -> bool {
        match self {
            NullPolicy::Absent | NullPolicy::Null => value.is_null(),
            NullPolicy::EmptyArray => value.as_array().is_some_and(|a| a.is_empty()),
        }
    }

    pub fn decode_absent(self) -> Option<serde_json::Value> {
        match self {
            NullPolicy::Absent => None,
            NullPolicy::Null => Some(serde_json::Value::Null),
            NullPolicy::EmptyArray => Some(serde_json::Value::Array(vec![])),
        }
    }
}

/// One of the scalar type tags a schema field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Str,
    Bool { nullable: bool },
    /// A 64-bit integer stored as `INTEGER`, surfaced as a decimal string at
    /// the codec boundary (used for all snowflake id fields).
    Int64AsString,
    Integer,
    Float,
    Base64Blob,
    /// `^(a_)?[0-9a-f]{32}$` -> 17 packed bytes; anything else passes
    /// through as a plain string.
    ImageHash,
    /// Concatenated big-endian `u64`s.
    IdArray,
    /// Fixed 25-byte `(type: u8, id: u64, allow: u64, deny: u64)` records,
    /// concatenated.
    PermissionOverwrites,
    /// Ms-since-epoch integer in storage, ISO-8601 string at the boundary.
    Timestamp,
    Emoji,
    Json,
    /// Storage is always null; any non-null input is a schema violation.
    NullSentinel,
}

/// What a schema entry is.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Nested object flattened into `parent__child` columns.
    Sub(&'static [FieldSpec]),
    /// Stored as JSON in the extras bag, never as a column.
    Extra,
    /// Dropped on encode, ignored on decode.
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    pub null_policy: NullPolicy,
    /// Whether this field belongs to the object kind's immutable column
    /// partition — only meaningful for top-level fields.
    pub immutable: bool,
}

impl FieldSpec {
    pub const fn scalar(
        key: &'static str,
        ty: ScalarType,
        null_policy: NullPolicy,
        immutable: bool,
    ) -> Self {
        Self {
            key,
            kind: FieldKind::Scalar(ty),
            null_policy,
            immutable,
        }
    }

    pub const fn sub(
        key: &'static str,
        fields: &'static [FieldSpec],
        null_policy: NullPolicy,
        immutable: bool,
    ) -> Self {
        Self {
            key,
            kind: FieldKind::Sub(fields),
            null_policy,
            immutable,
        }
    }

    pub const fn extra(key: &'static str, null_policy: NullPolicy) -> Self {
        Self {
            key,
            kind: FieldKind::Extra,
            null_policy,
            immutable: false,
        }
    }

    pub const fn ignore(key: &'static str) -> Self {
        Self {
            key,
            kind: FieldKind::Ignore,
            null_policy: NullPolicy::Absent,
            immutable: false,
        }
    }
}

pub type ObjectSchema = &'static [FieldSpec];

/// Join a column prefix and a field key the way nested sub-schemas flatten,
/// e.g. `("author", "id") -> "author__id"`.
pub fn join_column(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}__{key}")
    }
}

/// Every column name a schema produces (scalars only; `Extra`/`Ignore`
/// entries contribute none), in declaration order. Used by `archiver-db` to
/// generate `CREATE TABLE` column lists.
pub fn column_names(schema: ObjectSchema) -> Vec<String> {
    fn walk(schema: ObjectSchema, prefix: &str, out: &mut Vec<String>) {
        for field in schema {
            let column = join_column(prefix, field.key);
            match field.kind {
                FieldKind::Scalar(_) => out.push(column),
                FieldKind::Sub(sub) => walk(sub, &column, out),
                FieldKind::Extra | FieldKind::Ignore => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(schema, "", &mut out);
    out
}

/// Immutable-partition column names only.
pub fn immutable_column_names(schema: ObjectSchema) -> Vec<String> {
    fn walk(schema: ObjectSchema, prefix: &str, immutable: bool, out: &mut Vec<String>) {
        for field in schema {
            let column = join_column(prefix, field.key);
            let field_immutable = immutable || field.immutable;
            match field.kind {
                FieldKind::Scalar(_) if field_immutable => out.push(column),
                FieldKind::Sub(sub) => walk(sub, &column, field_immutable, out),
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(schema, "", false, &mut out);
    out
}

/// Mutable-partition column names only: everything not in
/// [`immutable_column_names`].
pub fn mutable_column_names(schema: ObjectSchema) -> Vec<String> {
    let immutable: std::collections::HashSet<String> =
        immutable_column_names(schema).into_iter().collect();
    column_names(schema)
        .into_iter()
        .filter(|c| !immutable.contains(c))
        .collect()
}
