//! Deterministic object names and default-value hashes.
//!
//! Generated constraint, index and trigger names embed a hash of the
//! object's normalized definition: `<table>_<hash>_<suffix>`. The same
//! rules are used when compiling the local schema and when reconciling
//! renamed objects in the remote snapshot, so unchanged objects diff to
//! nothing. Any change to the normalization below changes every generated
//! name and is therefore a compatibility break.

use sha2::{Digest, Sha256};

/// Maximum identifier length accepted by PostgreSQL.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Kind of a generated object, which decides its name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ObjectKind {
    /// Primary key constraint.
    PrimaryKey,
    /// Foreign key constraint.
    ForeignKey,
    /// Unique constraint.
    Unique,
    /// Check constraint.
    Check,
    /// Index.
    Index,
    /// Trigger.
    Trigger,
}

impl ObjectKind {
    /// Suffix appended to generated names.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "pkey",
            Self::ForeignKey => "fk",
            Self::Unique => "key",
            Self::Check => "chk",
            Self::Index => "idx",
            Self::Trigger => "trg",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrimaryKey => "primaryKey",
            Self::ForeignKey => "foreignKeys",
            Self::Unique => "uniqueConstraints",
            Self::Check => "checkConstraints",
            Self::Index => "indexes",
            Self::Trigger => "triggers",
        };
        f.write_str(name)
    }
}

/// First 8 hex characters of the SHA-256 of `value`.
pub fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(8);
    encoded
}

/// Collapse whitespace runs into single spaces and trim the ends.
pub fn normalize_sql(sql: &str) -> String {
    sql.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a boolean SQL expression: whitespace as in [`normalize_sql`],
/// minus any parentheses enclosing the whole expression.
///
/// The catalog deparses `length(email) > 3` as `(length(email) > 3)`.
pub fn normalize_expression(sql: &str) -> String {
    let mut expression = sql.trim();
    while let Some(inner) = enclosed(expression) {
        expression = inner.trim();
    }
    normalize_sql(expression)
}

/// The inside of `expression` when one pair of parentheses wraps all of it.
fn enclosed(expression: &str) -> Option<&str> {
    let inner = expression.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0usize;
    let mut quoted = false;
    for c in inner.chars() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.checked_sub(1)?,
            _ => {}
        }
    }
    (depth == 0 && !quoted).then_some(inner)
}

/// Build the generated name for an object definition on `table`.
pub fn object_name(table: &str, definition: &str, kind: ObjectKind) -> String {
    object_name_with_hash(table, &hash_value(definition), kind)
}

/// Build a generated name from an already computed definition hash.
pub fn object_name_with_hash(table: &str, hash: &str, kind: ObjectKind) -> String {
    if kind == ObjectKind::PrimaryKey {
        return primary_key_name(table);
    }

    let tail = format!("_{}_{}", hash, kind.suffix());
    let budget = MAX_IDENTIFIER_LEN.saturating_sub(tail.len());
    format!("{}{}", truncate_to_boundary(table, budget), tail)
}

/// Definition hash embedded in `name`, if `name` is a generated name of
/// `kind` on `table`.
pub fn generated_hash<'a>(name: &'a str, table: &str, kind: ObjectKind) -> Option<&'a str> {
    if kind == ObjectKind::PrimaryKey {
        return None;
    }
    let rest = name.strip_suffix(kind.suffix())?.strip_suffix('_')?;
    let (prefix, hash) = rest.rsplit_once('_')?;
    if hash.len() != 8 || !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    let budget = MAX_IDENTIFIER_LEN.saturating_sub(hash.len() + kind.suffix().len() + 2);
    (prefix == truncate_to_boundary(table, budget)).then_some(hash)
}

/// Name PostgreSQL gives a table's primary key by default.
pub fn primary_key_name(table: &str) -> String {
    let tail = "_pkey";
    let budget = MAX_IDENTIFIER_LEN - tail.len();
    format!("{}{}", truncate_to_boundary(table, budget), tail)
}

fn truncate_to_boundary(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Join column names the way definitions expect them.
pub fn join_columns(columns: &[String]) -> String {
    columns.join(",")
}
