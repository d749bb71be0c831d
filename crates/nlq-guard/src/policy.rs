//! Fixed deny-lists and the configurable table policy

use serde::{Deserialize, Serialize};

/// Keywords that never belong in a read-only statement.
///
/// Entries ending in `_` are prefixes (`sp_who`, `xp_cmdshell`); everything
/// else matches as a whole word. The tail of the list covers DuckDB's
/// extension loading, attachment and file-reading functions.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "CREATE", "ALTER", "TRUNCATE", "INTO",
    "EXEC", "EXECUTE", "SP_", "XP_", "GRANT", "REVOKE", "DENY",
    "BACKUP", "RESTORE", "SHUTDOWN", "KILL", "WAITFOR",
    "OPENROWSET", "OPENDATASOURCE", "OPENQUERY", "BULK",
    "CMDSHELL", "RECONFIGURE", "DBCC",
    "ATTACH", "DETACH", "COPY", "INSTALL", "LOAD", "PRAGMA", "EXPORT", "IMPORT", "CHECKPOINT",
    "READ_CSV", "READ_CSV_AUTO", "READ_PARQUET", "READ_JSON", "READ_JSON_AUTO",
    "READ_TEXT", "READ_BLOB", "GLOB",
];

/// Credential-like columns that may never be selected.
pub const FORBIDDEN_COLUMNS: &[&str] = &["PasswordHash", "Password", "Secret", "ApiKey", "Token"];

/// Tables the draft source is expected to use, and the fact table that
/// needs a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    pub allowed_tables: Vec<String>,

    #[serde(default)]
    pub high_volume_table: Option<String>,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            allowed_tables: [
                "Organisations",
                "Departments",
                "Managers",
                "ManagerDepartments",
                "OrganisationUsers",
                "AuditRecords",
                "Reports",
                "Users",
                "NlpQueryLogs",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            high_volume_table: Some("AuditRecords".to_string()),
        }
    }
}
