//! PostgreSQL DDL statement builders.
//!
//! Every identifier is quoted and every table is schema qualified, so the
//! statements stay valid whatever `search_path` the executing connection
//! uses.

use crate::snapshot::{
    CheckSnapshot, ColumnSnapshot, ForeignKeySnapshot, Identity, IndexSnapshot,
    PrimaryKeySnapshot, TriggerSnapshot, UniqueSnapshot,
};

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL generator for PostgreSQL, bound to one schema.
#[derive(Debug, Clone)]
pub struct PostgresSqlGenerator {
    schema: String,
}

impl PostgresSqlGenerator {
    /// Create a generator for `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Schema-qualified, quoted name.
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(name))
    }

    // ------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------

    /// Generate CREATE TYPE for an enum.
    pub fn create_enum(&self, name: &str, values: &[String]) -> String {
        let values: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
        format!(
            "CREATE TYPE {} AS ENUM ({});",
            self.qualified(name),
            values.join(", ")
        )
    }

    /// Generate DROP TYPE.
    pub fn drop_enum(&self, name: &str) -> String {
        format!("DROP TYPE {};", self.qualified(name))
    }

    /// Generate ALTER TYPE ... ADD VALUE, optionally placed before an existing value.
    pub fn add_enum_value(&self, name: &str, value: &str, before: Option<&str>) -> String {
        let position = before
            .map(|b| format!(" BEFORE {}", quote_literal(b)))
            .unwrap_or_default();
        format!(
            "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}{};",
            self.qualified(name),
            quote_literal(value),
            position
        )
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Generate CREATE TABLE with columns in the given order.
    pub fn create_table<'a>(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = &'a ColumnSnapshot>,
    ) -> String {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| self.column_definition(c))
            .collect();
        if columns.is_empty() {
            return format!("CREATE TABLE {} ();", self.qualified(name));
        }
        format!(
            "CREATE TABLE {} (\n    {}\n);",
            self.qualified(name),
            columns.join(",\n    ")
        )
    }

    /// Generate DROP TABLE.
    pub fn drop_table(&self, name: &str) -> String {
        format!("DROP TABLE {};", self.qualified(name))
    }

    /// Generate ALTER TABLE ... RENAME TO.
    pub fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {};",
            self.qualified(from),
            quote_ident(to)
        )
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    /// Generate a column definition.
    pub fn column_definition(&self, column: &ColumnSnapshot) -> String {
        let data_type = if column.enum_type {
            self.qualified(&column.data_type)
        } else {
            column.data_type.clone()
        };
        let mut parts = vec![quote_ident(&column.name), data_type];

        if let Some(identity) = column.identity {
            parts.push(format!("GENERATED {} AS IDENTITY", identity.as_sql()));
        }
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default.sql));
        }

        parts.join(" ")
    }

    /// Generate COMMENT ON COLUMN carrying a default hash, or clearing it.
    pub fn comment_on_column(&self, table: &str, column: &str, hash: Option<&str>) -> String {
        let value = hash.map(quote_literal).unwrap_or_else(|| "NULL".to_string());
        format!(
            "COMMENT ON COLUMN {}.{} IS {};",
            self.qualified(table),
            quote_ident(column),
            value
        )
    }

    /// Generate ADD COLUMN.
    pub fn add_column(&self, table: &str, column: &ColumnSnapshot) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            self.qualified(table),
            self.column_definition(column)
        )
    }

    /// Generate DROP COLUMN.
    pub fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {};",
            self.qualified(table),
            quote_ident(column)
        )
    }

    /// Generate RENAME COLUMN.
    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            self.qualified(table),
            quote_ident(from),
            quote_ident(to)
        )
    }

    fn alter_column(&self, table: &str, column: &str, action: &str) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {};",
            self.qualified(table),
            quote_ident(column),
            action
        )
    }

    /// Generate ALTER COLUMN ... TYPE with an explicit cast.
    pub fn alter_column_type(&self, table: &str, column: &str, data_type: &str) -> String {
        self.alter_column(
            table,
            column,
            &format!(
                "TYPE {} USING {}::{}",
                data_type,
                quote_ident(column),
                data_type
            ),
        )
    }

    /// Generate SET DEFAULT.
    pub fn set_default(&self, table: &str, column: &str, sql: &str) -> String {
        self.alter_column(table, column, &format!("SET DEFAULT {}", sql))
    }

    /// Generate DROP DEFAULT.
    pub fn drop_default(&self, table: &str, column: &str) -> String {
        self.alter_column(table, column, "DROP DEFAULT")
    }

    /// Generate SET NOT NULL.
    pub fn set_not_null(&self, table: &str, column: &str) -> String {
        self.alter_column(table, column, "SET NOT NULL")
    }

    /// Generate DROP NOT NULL.
    pub fn drop_not_null(&self, table: &str, column: &str) -> String {
        self.alter_column(table, column, "DROP NOT NULL")
    }

    /// Generate ADD GENERATED ... AS IDENTITY.
    pub fn add_identity(&self, table: &str, column: &str, identity: Identity) -> String {
        self.alter_column(
            table,
            column,
            &format!("ADD GENERATED {} AS IDENTITY", identity.as_sql()),
        )
    }

    /// Generate SET GENERATED.
    pub fn set_identity(&self, table: &str, column: &str, identity: Identity) -> String {
        self.alter_column(table, column, &format!("SET GENERATED {}", identity.as_sql()))
    }

    /// Generate DROP IDENTITY.
    pub fn drop_identity(&self, table: &str, column: &str) -> String {
        self.alter_column(table, column, "DROP IDENTITY")
    }

    // ------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------

    fn add_constraint(&self, table: &str, name: &str, body: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {};",
            self.qualified(table),
            quote_ident(name),
            body
        )
    }

    /// Generate DROP CONSTRAINT.
    pub fn drop_constraint(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            self.qualified(table),
            quote_ident(name)
        )
    }

    /// Generate RENAME CONSTRAINT.
    pub fn rename_constraint(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME CONSTRAINT {} TO {};",
            self.qualified(table),
            quote_ident(from),
            quote_ident(to)
        )
    }

    /// Generate ADD PRIMARY KEY.
    pub fn add_primary_key(&self, table: &str, pk: &PrimaryKeySnapshot) -> String {
        self.add_constraint(
            table,
            &pk.name,
            &format!("PRIMARY KEY ({})", quote_list(&pk.columns)),
        )
    }

    /// Generate ADD FOREIGN KEY; `referenced_table` may differ from the
    /// snapshot's while the referenced table is mid-rename.
    pub fn add_foreign_key(
        &self,
        table: &str,
        fk: &ForeignKeySnapshot,
        referenced_table: &str,
        referenced_columns: &[String],
    ) -> String {
        self.add_constraint(
            table,
            &fk.name,
            &format!(
                "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                quote_list(&fk.columns),
                self.qualified(referenced_table),
                quote_list(referenced_columns),
                fk.on_delete.as_sql(),
                fk.on_update.as_sql()
            ),
        )
    }

    /// Generate ADD UNIQUE.
    pub fn add_unique(&self, table: &str, unique: &UniqueSnapshot) -> String {
        let nulls = if unique.nulls_distinct {
            ""
        } else {
            " NULLS NOT DISTINCT"
        };
        self.add_constraint(
            table,
            &unique.name,
            &format!("UNIQUE{} ({})", nulls, quote_list(&unique.columns)),
        )
    }

    /// Generate ADD CHECK.
    pub fn add_check(&self, table: &str, check: &CheckSnapshot) -> String {
        self.add_constraint(table, &check.name, &format!("CHECK ({})", check.expression))
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Generate CREATE INDEX, optionally CONCURRENTLY.
    pub fn create_index(&self, table: &str, index: &IndexSnapshot, concurrently: bool) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let concurrently = if concurrently { "CONCURRENTLY " } else { "" };
        let predicate = index
            .predicate
            .as_ref()
            .map(|p| format!(" WHERE {}", p))
            .unwrap_or_default();
        format!(
            "CREATE {}INDEX {}{} ON {} USING {} ({}){};",
            unique,
            concurrently,
            quote_ident(&index.name),
            self.qualified(table),
            index.method,
            quote_list(&index.columns),
            predicate
        )
    }

    /// Generate DROP INDEX, optionally CONCURRENTLY.
    pub fn drop_index(&self, name: &str, concurrently: bool) -> String {
        let concurrently = if concurrently { "CONCURRENTLY " } else { "" };
        format!("DROP INDEX {}{};", concurrently, self.qualified(name))
    }

    /// Generate ALTER INDEX ... RENAME TO.
    pub fn rename_index(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER INDEX {} RENAME TO {};",
            self.qualified(from),
            quote_ident(to)
        )
    }

    // ------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------

    /// Generate CREATE TRIGGER.
    pub fn create_trigger(&self, table: &str, trigger: &TriggerSnapshot) -> String {
        format!(
            "CREATE TRIGGER {} {} {} ON {} FOR EACH {} EXECUTE FUNCTION {};",
            quote_ident(&trigger.name),
            trigger.timing.as_sql(),
            trigger.events.join(" OR "),
            self.qualified(table),
            trigger.level.as_sql(),
            trigger.function
        )
    }

    /// Generate DROP TRIGGER.
    pub fn drop_trigger(&self, table: &str, name: &str) -> String {
        format!(
            "DROP TRIGGER {} ON {};",
            quote_ident(name),
            self.qualified(table)
        )
    }

    /// Generate ALTER TRIGGER ... RENAME TO.
    pub fn rename_trigger(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TRIGGER {} ON {} RENAME TO {};",
            quote_ident(from),
            self.qualified(table),
            quote_ident(to)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ColumnDefault, ForeignKeyAction, TriggerLevel, TriggerTiming};

    fn generator() -> PostgresSqlGenerator {
        PostgresSqlGenerator::new("public")
    }

    #[test]
    fn test_quote_escaping() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_create_enum() {
        let sql = generator().create_enum("role", &["admin".into(), "member".into()]);
        assert_eq!(sql, "CREATE TYPE \"public\".\"role\" AS ENUM ('admin', 'member');");
    }

    #[test]
    fn test_add_enum_value() {
        assert_eq!(
            generator().add_enum_value("role", "guest", Some("member")),
            "ALTER TYPE \"public\".\"role\" ADD VALUE IF NOT EXISTS 'guest' BEFORE 'member';"
        );
    }

    #[test]
    fn test_create_table() {
        let id = ColumnSnapshot {
            nullable: false,
            identity: Some(Identity::Always),
            ..ColumnSnapshot::new("id", "bigint")
        };
        let status = ColumnSnapshot {
            default: Some(ColumnDefault::from_sql("'active'")),
            enum_type: true,
            ..ColumnSnapshot::new("status", "status")
        };
        let sql = generator().create_table("users", [&id, &status]);
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"users\" (\n    \
             \"id\" bigint GENERATED ALWAYS AS IDENTITY NOT NULL,\n    \
             \"status\" \"public\".\"status\" DEFAULT 'active'\n);"
        );
    }

    #[test]
    fn test_alter_column_type() {
        assert_eq!(
            generator().alter_column_type("users", "age", "bigint"),
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"age\" TYPE bigint USING \"age\"::bigint;"
        );
    }

    #[test]
    fn test_comment_on_column() {
        assert_eq!(
            generator().comment_on_column("users", "status", Some("abcd1234")),
            "COMMENT ON COLUMN \"public\".\"users\".\"status\" IS 'abcd1234';"
        );
        assert!(
            generator()
                .comment_on_column("users", "status", None)
                .ends_with("IS NULL;")
        );
    }

    #[test]
    fn test_add_foreign_key() {
        let fk = ForeignKeySnapshot {
            name: "posts_fk".into(),
            columns: vec!["author_id".into()],
            referenced_table: "accounts".into(),
            referenced_columns: vec!["id".into()],
            on_delete: ForeignKeyAction::Cascade,
            on_update: ForeignKeyAction::NoAction,
        };
        let sql = generator().add_foreign_key("posts", &fk, "users", &["id".into()]);
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"posts\" ADD CONSTRAINT \"posts_fk\" FOREIGN KEY (\"author_id\") \
             REFERENCES \"public\".\"users\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION;"
        );
    }

    #[test]
    fn test_create_index_concurrently() {
        let index = IndexSnapshot {
            name: "users_idx".into(),
            columns: vec!["email".into()],
            unique: true,
            method: "btree".into(),
            predicate: Some("deleted_at IS NULL".into()),
        };
        assert_eq!(
            generator().create_index("users", &index, true),
            "CREATE UNIQUE INDEX CONCURRENTLY \"users_idx\" ON \"public\".\"users\" USING btree (\"email\") WHERE deleted_at IS NULL;"
        );
        assert_eq!(
            generator().drop_index("users_idx", false),
            "DROP INDEX \"public\".\"users_idx\";"
        );
    }

    #[test]
    fn test_create_trigger() {
        let trigger = TriggerSnapshot {
            name: "users_trg".into(),
            timing: TriggerTiming::Before,
            events: vec!["INSERT".into(), "UPDATE".into()],
            level: TriggerLevel::Row,
            function: "moddatetime(updated_at)".into(),
        };
        assert_eq!(
            generator().create_trigger("users", &trigger),
            "CREATE TRIGGER \"users_trg\" BEFORE INSERT OR UPDATE ON \"public\".\"users\" FOR EACH ROW EXECUTE FUNCTION moddatetime(updated_at);"
        );
    }
}
