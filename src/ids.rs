/// Synthetic identifier generation.
///
/// Identifiers are random (version 4) UUIDs in their canonical hyphenated
/// lowercase form, e.g. `0b5f6a3e-2c1d-4f8a-9e7b-1a2b3c4d5e6f`. They carry
/// 122 random bits, so collisions across millions of iterations are
/// negligible and concurrent virtual users never share an entity.
use uuid::Uuid;

/// Length of a generated identifier.
pub const ID_LEN: usize = 36;

/// Generate a fresh identifier.
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}
