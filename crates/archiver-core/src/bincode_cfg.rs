//! Shared `bincode` configuration for the packed binary encodings used by
//! the codec (id-arrays, permission overwrites, image hashes).

use bincode::config;

pub const STD_BINCODE_CONFIG: config::Configuration<config::BigEndian, config::Fixint> =
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding();
