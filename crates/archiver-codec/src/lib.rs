//! Translates semi-typed nested external objects into flat, SQL-ready rows
//! plus a JSON extras side-channel, and back.

mod decode;
mod encode;
mod error;
mod extras;
pub mod kinds;
mod scalar;
mod schema;
mod value;

pub use decode::decode_object;
pub use encode::{EncodedObject, encode_object};
pub use error::{CodecError, CodecResult};
pub use kinds::schema_for;
pub use schema::{
    FieldKind, FieldSpec, NullPolicy, ObjectSchema, ScalarType, column_names,
    immutable_column_names, join_column, mutable_column_names,
};
pub use value::{ColumnValue, EmojiValue, RowSource};
