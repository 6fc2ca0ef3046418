//! Padding-minimizing column order for new tables.
//!
//! PostgreSQL stores columns in declaration order and pads each value to
//! its type's alignment. Placing wide fixed-length types first and
//! variable-length types last avoids most of that padding. Only
//! `CREATE TABLE` uses this order; existing tables are never rewritten.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::ColumnSnapshot;

/// Catalog alignment facts for one data type (`pg_type.typalign`, `typlen`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAlignment {
    /// Type name as it appears in `format_type`.
    pub type_name: String,
    /// Alignment class: `c`, `s`, `i` or `d`.
    pub typalign: char,
    /// Storage length in bytes; negative for variable-length types.
    pub typlen: i32,
    /// Primary sort key: the alignment in bytes, or `-1` for variable length.
    pub sort_criteria: i32,
    /// Alignment in bytes (1, 2, 4 or 8).
    pub typalign_bytes: i32,
}

impl TypeAlignment {
    /// Build from the raw catalog values.
    pub fn new(type_name: impl Into<String>, typalign: char, typlen: i32) -> Self {
        let typalign_bytes = alignment_bytes(typalign);
        Self {
            type_name: type_name.into(),
            typalign,
            typlen,
            sort_criteria: if typlen < 0 { -1 } else { typalign_bytes },
            typalign_bytes,
        }
    }

    /// Alignment used for enum-backed columns, which are stored as 4-byte OIDs.
    pub fn enum_type(type_name: impl Into<String>) -> Self {
        Self::new(type_name, 'i', 4)
    }
}

fn alignment_bytes(typalign: char) -> i32 {
    match typalign {
        'c' => 1,
        's' => 2,
        'i' => 4,
        'd' => 8,
        _ => 1,
    }
}

/// Lookup table of alignment facts keyed by normalized type name.
#[derive(Debug, Clone, Default)]
pub struct AlignmentCatalog {
    types: HashMap<String, TypeAlignment>,
}

impl AlignmentCatalog {
    /// Index a list of catalog facts.
    pub fn new(alignments: impl IntoIterator<Item = TypeAlignment>) -> Self {
        let types = alignments
            .into_iter()
            .map(|a| (normalize_type_name(&a.type_name), a))
            .collect();
        Self { types }
    }

    /// Facts commonly reported by PostgreSQL for built-in types.
    pub fn builtin() -> Self {
        Self::new(
            [
                ("boolean", 'c', 1),
                ("\"char\"", 'c', 1),
                ("smallint", 's', 2),
                ("integer", 'i', 4),
                ("real", 'i', 4),
                ("date", 'i', 4),
                ("oid", 'i', 4),
                ("bigint", 'd', 8),
                ("double precision", 'd', 8),
                ("money", 'd', 8),
                ("timestamp without time zone", 'd', 8),
                ("timestamp with time zone", 'd', 8),
                ("time without time zone", 'd', 8),
                ("time with time zone", 'd', 12),
                ("interval", 'd', 16),
                ("uuid", 'c', 16),
                ("text", 'i', -1),
                ("character varying", 'i', -1),
                ("character", 'i', -1),
                ("numeric", 'i', -1),
                ("bytea", 'i', -1),
                ("json", 'i', -1),
                ("jsonb", 'i', -1),
                ("xml", 'i', -1),
                ("inet", 'i', -1),
                ("cidr", 'i', -1),
                ("tsvector", 'i', -1),
            ]
            .into_iter()
            .map(|(name, align, len)| TypeAlignment::new(name, align, len)),
        )
    }

    /// Facts for `data_type`, if the catalog knows it.
    pub fn get(&self, data_type: &str) -> Option<&TypeAlignment> {
        self.types.get(&normalize_type_name(data_type))
    }

    /// Number of known types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is known.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Normalize a DDL type name to its catalog spelling.
///
/// Type modifiers are dropped (`varchar(255)` is `character varying`) and
/// common aliases are resolved. Array types keep their `[]` suffix.
pub fn normalize_type_name(data_type: &str) -> String {
    let lower = data_type.trim().to_ascii_lowercase();
    let (base, array) = match lower.strip_suffix("[]") {
        Some(base) => (base.trim_end(), "[]"),
        None => (lower.as_str(), ""),
    };

    let mut stripped = String::with_capacity(base.len());
    let mut depth = 0usize;
    for ch in base.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch),
            _ => {}
        }
    }
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let canonical = match stripped.as_str() {
        "int" | "int4" | "serial" | "serial4" => "integer",
        "int2" | "smallserial" | "serial2" => "smallint",
        "int8" | "bigserial" | "serial8" => "bigint",
        "float4" => "real",
        "float8" | "float" => "double precision",
        "bool" => "boolean",
        "varchar" => "character varying",
        "char" | "bpchar" => "character",
        "decimal" => "numeric",
        "timestamp" => "timestamp without time zone",
        "timestamptz" => "timestamp with time zone",
        "time" => "time without time zone",
        "timetz" => "time with time zone",
        other => other,
    };

    format!("{}{}", canonical, array)
}

/// Whether two DDL type spellings denote the same type, modifiers included.
pub fn same_type(a: &str, b: &str) -> bool {
    canonical_type(a) == canonical_type(b)
}

fn canonical_type(data_type: &str) -> String {
    let modifiers: String = data_type
        .split('(')
        .skip(1)
        .filter_map(|part| part.split(')').next())
        .flat_map(|m| m.chars().filter(|c| !c.is_whitespace()))
        .collect();
    let base = normalize_type_name(data_type);
    if modifiers.is_empty() {
        base
    } else {
        format!("{}({})", base, modifiers)
    }
}

struct SortKey<'a> {
    known: bool,
    sort_criteria: i32,
    typalign_bytes: i32,
    nullable: bool,
    name: &'a str,
}

impl SortKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .known
            .cmp(&self.known)
            .then_with(|| other.sort_criteria.cmp(&self.sort_criteria))
            .then_with(|| other.typalign_bytes.cmp(&self.typalign_bytes))
            .then_with(|| self.nullable.cmp(&other.nullable))
            .then_with(|| self.name.cmp(other.name))
    }
}

/// Order columns for minimal row padding.
///
/// Known types come first, by descending sort criteria then descending
/// alignment; types missing from the catalog come last. Ties put NOT NULL
/// columns first and then sort by name.
pub fn align_columns<'a>(
    columns: impl IntoIterator<Item = &'a ColumnSnapshot>,
    catalog: &AlignmentCatalog,
) -> Vec<&'a ColumnSnapshot> {
    let mut keyed: Vec<(SortKey<'a>, &'a ColumnSnapshot)> = columns
        .into_iter()
        .map(|column| {
            let enum_alignment;
            let alignment = if column.enum_type {
                enum_alignment = TypeAlignment::enum_type(&column.data_type);
                Some(&enum_alignment)
            } else {
                catalog.get(&column.data_type)
            };
            let key = SortKey {
                known: alignment.is_some(),
                sort_criteria: alignment.map_or(0, |a| a.sort_criteria),
                typalign_bytes: alignment.map_or(0, |a| a.typalign_bytes),
                nullable: column.nullable,
                name: column.name.as_str(),
            };
            (key, column)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    keyed.into_iter().map(|(_, column)| column).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnSnapshot {
        ColumnSnapshot {
            nullable,
            ..ColumnSnapshot::new(name, data_type)
        }
    }

    fn names(columns: Vec<&ColumnSnapshot>) -> Vec<&str> {
        columns.into_iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_type_alignment_criteria() {
        let bigint = TypeAlignment::new("bigint", 'd', 8);
        assert_eq!(bigint.typalign_bytes, 8);
        assert_eq!(bigint.sort_criteria, 8);

        let text = TypeAlignment::new("text", 'i', -1);
        assert_eq!(text.typalign_bytes, 4);
        assert_eq!(text.sort_criteria, -1);

        // cstring reports -2 and is variable length too.
        assert_eq!(TypeAlignment::new("cstring", 'c', -2).sort_criteria, -1);
    }

    #[test]
    fn test_align_columns_minimizes_padding() {
        let columns = vec![
            column("a", "bigint", true),
            column("b", "text", true),
            column("c", "smallint", false),
            column("d", "smallint", true),
        ];
        let ordered = align_columns(&columns, &AlignmentCatalog::builtin());
        assert_eq!(names(ordered), vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn test_enum_columns_align_as_four_bytes() {
        let mut status = column("status", "status", true);
        status.enum_type = true;
        let columns = vec![
            column("flag", "boolean", true),
            status,
            column("id", "bigint", false),
        ];
        let ordered = align_columns(&columns, &AlignmentCatalog::builtin());
        assert_eq!(names(ordered), vec!["id", "status", "flag"]);
    }

    #[test]
    fn test_unknown_types_sort_last() {
        let columns = vec![
            column("z", "custom_domain", true),
            column("y", "custom_domain", false),
            column("body", "text", true),
        ];
        let ordered = align_columns(&columns, &AlignmentCatalog::builtin());
        assert_eq!(names(ordered), vec!["body", "y", "z"]);
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("VARCHAR(255)"), "character varying");
        assert_eq!(normalize_type_name("int4"), "integer");
        assert_eq!(normalize_type_name("numeric(10, 2)"), "numeric");
        assert_eq!(normalize_type_name("timestamptz"), "timestamp with time zone");
        assert_eq!(normalize_type_name("int8[]"), "bigint[]");
        assert_eq!(normalize_type_name("timestamp(3) with time zone"), "timestamp with time zone");
    }

    #[test]
    fn test_same_type() {
        assert!(same_type("varchar(255)", "character varying(255)"));
        assert!(same_type("numeric(10, 2)", "NUMERIC(10,2)"));
        assert!(same_type("int8", "bigint"));
        assert!(!same_type("varchar(100)", "varchar(255)"));
        assert!(!same_type("integer", "bigint"));
    }

    #[test]
    fn test_catalog_lookup_uses_aliases() {
        let catalog = AlignmentCatalog::new([TypeAlignment::new("bigint", 'd', 8)]);
        assert!(catalog.get("int8").is_some());
        assert!(catalog.get("text").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
