//! Schema catalog of the allowed tables
//!
//! Read once at startup and rendered into the draft prompt. Credential-like
//! columns are left out so the model never learns they exist. No sample data
//! is read: rows belong to tenants and must not leak into a shared prompt.

use duckdb::{Connection, Result as DuckResult};
use nlq_guard::FORBIDDEN_COLUMNS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCatalog {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub tables: Vec<TableCatalog>,
}

impl SchemaCatalog {
    /// Load column metadata for every table in `allowed_tables` that exists.
    pub fn load(conn: &Connection, allowed_tables: &[String]) -> DuckResult<Self> {
        let mut stmt = conn.prepare(
            "SELECT table_name, column_name, data_type, is_nullable
             FROM information_schema.columns
             WHERE table_schema = 'main'
             ORDER BY table_name, ordinal_position",
        )?;

        let rows: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<DuckResult<Vec<_>>>()?;

        let mut tables: Vec<TableCatalog> = Vec::new();
        for (table_name, column_name, data_type, is_nullable) in rows {
            let Some(allowed) = allowed_tables
                .iter()
                .find(|t| t.eq_ignore_ascii_case(&table_name))
            else {
                continue;
            };
            if FORBIDDEN_COLUMNS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&column_name))
            {
                continue;
            }

            let column = ColumnInfo {
                name: column_name,
                data_type,
                is_nullable: is_nullable == "YES",
            };
            match tables.last_mut() {
                Some(table) if table.name.eq_ignore_ascii_case(allowed) => table.columns.push(column),
                _ => tables.push(TableCatalog {
                    name: allowed.clone(),
                    columns: vec![column],
                }),
            }
        }

        tracing::debug!(tables = tables.len(), "Loaded schema catalog");
        Ok(Self { tables })
    }

    /// Format catalog as markdown for the draft prompt
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# Database Schema\n\n");

        for table in &self.tables {
            md.push_str(&format!("## Table: `{}`\n\n", table.name));
            md.push_str("| Column | Type | Nullable |\n");
            md.push_str("|--------|------|----------|\n");

            for col in &table.columns {
                let nullable = if col.is_nullable { "yes" } else { "" };
                md.push_str(&format!("| `{}` | {} | {} |\n", col.name, col.data_type, nullable));
            }

            md.push('\n');
        }

        md
    }
}
