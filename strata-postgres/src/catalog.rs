//! Catalog queries.
//!
//! Everything is read from `pg_catalog` for one schema. Rows are turned into
//! [`CatalogFacts`] without interpretation; the migration core builds the
//! snapshot from them.

use strata_migrate::{
    CatalogFacts, ColumnInfo, ConstraintInfo, ConstraintType, EnumInfo, IndexInfo, TableInfo,
    TriggerInfo, TypeAlignment,
};
use tokio_postgres::{Client, Row};
use tracing::debug;

use crate::error::{PgError, PgResult};

const TABLES_SQL: &str = r#"
    SELECT c.relname::text
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') AND NOT c.relispartition
    ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        c.relname::text,
        a.attname::text,
        format_type(a.atttypid, a.atttypmod),
        NOT a.attnotnull,
        pg_get_expr(d.adbin, d.adrelid),
        NULLIF(a.attidentity::text, ''),
        a.attnum::int4,
        col_description(c.oid, a.attnum)
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY c.relname, a.attnum
"#;

const CONSTRAINTS_SQL: &str = r#"
    SELECT
        con.conname::text,
        con.contype::text,
        rel.relname::text,
        ARRAY(
            SELECT att.attname::text
            FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
            ORDER BY k.ord
        ),
        frel.relname::text,
        ARRAY(
            SELECT att.attname::text
            FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute att ON att.attrelid = con.confrelid AND att.attnum = k.attnum
            ORDER BY k.ord
        ),
        CASE WHEN con.contype = 'f' THEN con.confdeltype::text END,
        CASE WHEN con.contype = 'f' THEN con.confupdtype::text END,
        CASE WHEN con.contype = 'c' THEN pg_get_constraintdef(con.oid) END,
        COALESCE(NOT idx.indnullsnotdistinct, true)
    FROM pg_constraint con
    JOIN pg_class rel ON rel.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = rel.relnamespace
    LEFT JOIN pg_class frel ON frel.oid = con.confrelid
    LEFT JOIN pg_index idx ON idx.indexrelid = con.conindid AND con.contype = 'u'
    WHERE n.nspname = $1 AND con.contype IN ('p', 'f', 'u', 'c')
    ORDER BY rel.relname, con.conname
"#;

const INDEXES_SQL: &str = r#"
    SELECT
        i.relname::text,
        t.relname::text,
        ARRAY(
            SELECT att.attname::text
            FROM unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute att ON att.attrelid = ix.indrelid AND att.attnum = k.attnum
            ORDER BY k.ord
        ),
        ix.indisunique,
        EXISTS (
            SELECT 1 FROM pg_constraint con
            WHERE con.conindid = ix.indexrelid AND con.contype IN ('p', 'u', 'x')
        ),
        am.amname::text,
        pg_get_expr(ix.indpred, ix.indrelid)
    FROM pg_index ix
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_am am ON am.oid = i.relam
    WHERE n.nspname = $1
    ORDER BY t.relname, i.relname
"#;

const TRIGGERS_SQL: &str = r#"
    SELECT
        tg.tgname::text,
        t.relname::text,
        CASE
            WHEN tg.tgtype & 2 = 2 THEN 'BEFORE'
            WHEN tg.tgtype & 64 = 64 THEN 'INSTEAD OF'
            ELSE 'AFTER'
        END,
        array_remove(ARRAY[
            CASE WHEN tg.tgtype & 4 = 4 THEN 'INSERT' END,
            CASE WHEN tg.tgtype & 16 = 16 THEN 'UPDATE' END,
            CASE WHEN tg.tgtype & 8 = 8 THEN 'DELETE' END,
            CASE WHEN tg.tgtype & 32 = 32 THEN 'TRUNCATE' END
        ], NULL),
        CASE WHEN tg.tgtype & 1 = 1 THEN 'ROW' ELSE 'STATEMENT' END,
        substring(pg_get_triggerdef(tg.oid) FROM 'EXECUTE (?:FUNCTION|PROCEDURE) .*$')
    FROM pg_trigger tg
    JOIN pg_class t ON t.oid = tg.tgrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = $1 AND NOT tg.tgisinternal
    ORDER BY t.relname, tg.tgname
"#;

const ENUMS_SQL: &str = r#"
    SELECT t.typname::text, array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
    FROM pg_type t
    JOIN pg_enum e ON e.enumtypid = t.oid
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = $1
    GROUP BY t.typname
    ORDER BY t.typname
"#;

const TYPE_ALIGNMENTS_SQL: &str = r#"
    SELECT format_type(t.oid, NULL), t.typalign::text, t.typlen::int4
    FROM pg_type t
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname IN ('pg_catalog', $1)
      AND t.typisdefined
      AND t.typtype IN ('b', 'd', 'e', 'r', 'm')
"#;

/// Read every catalog fact of `schema`.
pub async fn read_catalog(client: &Client, schema: &str) -> PgResult<CatalogFacts> {
    let facts = CatalogFacts {
        tables: query(client, TABLES_SQL, schema, table).await?,
        columns: query(client, COLUMNS_SQL, schema, column).await?,
        constraints: query(client, CONSTRAINTS_SQL, schema, constraint)
            .await?
            .into_iter()
            .flatten()
            .collect(),
        indexes: query(client, INDEXES_SQL, schema, index).await?,
        triggers: query(client, TRIGGERS_SQL, schema, trigger).await?,
        enums: query(client, ENUMS_SQL, schema, enum_type).await?,
        type_alignments: query(client, TYPE_ALIGNMENTS_SQL, schema, type_alignment).await?,
    };

    debug!(
        schema = %schema,
        tables = facts.tables.len(),
        columns = facts.columns.len(),
        constraints = facts.constraints.len(),
        indexes = facts.indexes.len(),
        triggers = facts.triggers.len(),
        enums = facts.enums.len(),
        types = facts.type_alignments.len(),
        "read catalog"
    );
    Ok(facts)
}

async fn query<T>(
    client: &Client,
    sql: &str,
    schema: &str,
    convert: fn(&Row) -> PgResult<T>,
) -> PgResult<Vec<T>> {
    let rows = client.query(sql, &[&schema]).await?;
    rows.iter().map(convert).collect()
}

fn table(row: &Row) -> PgResult<TableInfo> {
    Ok(TableInfo {
        name: row.try_get(0)?,
    })
}

fn column(row: &Row) -> PgResult<ColumnInfo> {
    Ok(ColumnInfo {
        table_name: row.try_get(0)?,
        name: row.try_get(1)?,
        data_type: row.try_get(2)?,
        is_nullable: row.try_get(3)?,
        column_default: row.try_get(4)?,
        identity: row.try_get(5)?,
        ordinal_position: row.try_get(6)?,
        comment: row.try_get(7)?,
    })
}

/// Constraint row; `None` for constraint kinds the snapshot does not model.
fn constraint(row: &Row) -> PgResult<Option<ConstraintInfo>> {
    let code: String = row.try_get(1)?;
    let Some(constraint_type) = ConstraintType::from_code(&code) else {
        return Ok(None);
    };
    Ok(Some(ConstraintInfo {
        name: row.try_get(0)?,
        constraint_type,
        table_name: row.try_get(2)?,
        columns: row.try_get(3)?,
        referenced_table: row.try_get(4)?,
        referenced_columns: row.try_get(5)?,
        on_delete: row.try_get(6)?,
        on_update: row.try_get(7)?,
        definition: row.try_get(8)?,
        nulls_distinct: row.try_get(9)?,
    }))
}

fn index(row: &Row) -> PgResult<IndexInfo> {
    Ok(IndexInfo {
        name: row.try_get(0)?,
        table_name: row.try_get(1)?,
        columns: row.try_get(2)?,
        is_unique: row.try_get(3)?,
        is_constraint: row.try_get(4)?,
        index_method: row.try_get(5)?,
        predicate: row.try_get(6)?,
    })
}

fn trigger(row: &Row) -> PgResult<TriggerInfo> {
    let action: Option<String> = row.try_get(5)?;
    Ok(TriggerInfo {
        name: row.try_get(0)?,
        table_name: row.try_get(1)?,
        timing: row.try_get(2)?,
        events: row.try_get(3)?,
        orientation: row.try_get(4)?,
        action_statement: action.unwrap_or_default(),
    })
}

fn enum_type(row: &Row) -> PgResult<EnumInfo> {
    Ok(EnumInfo {
        name: row.try_get(0)?,
        values: row.try_get(1)?,
    })
}

fn type_alignment(row: &Row) -> PgResult<TypeAlignment> {
    let type_name: String = row.try_get(0)?;
    let typalign: String = row.try_get(1)?;
    let typlen: i32 = row.try_get(2)?;
    let typalign = parse_typalign(&typalign)
        .ok_or_else(|| PgError::catalog(format!("{}: unknown typalign '{}'", type_name, typalign)))?;
    Ok(TypeAlignment::new(type_name, typalign, typlen))
}

fn parse_typalign(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ ('c' | 's' | 'i' | 'd')), None) => Some(c),
        _ => None,
    }
}
