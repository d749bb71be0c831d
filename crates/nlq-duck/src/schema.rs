//! Reporting schema DDL
//!
//! Ids are stored as VARCHAR UUID text so they compare directly against bound
//! `@TenantId` / `@SubScopeId<n>` values. `AuditRecords.Date` is a `yyyyMMdd`
//! integer. The audit table is created separately by the audit log.

pub(crate) const NLP_QUERY_LOGS_DDL: &str = "
CREATE TABLE IF NOT EXISTS NlpQueryLogs (
    Id VARCHAR PRIMARY KEY,
    ManagerId VARCHAR NOT NULL,
    OrganisationId VARCHAR NOT NULL,
    NaturalLanguageQuery VARCHAR NOT NULL,
    GeneratedSql VARCHAR,
    Success BOOLEAN NOT NULL,
    ErrorMessage VARCHAR,
    ResultCount BIGINT NOT NULL,
    ExecutionTimeMs DOUBLE NOT NULL,
    CreatedAt VARCHAR NOT NULL
);
";

pub const REPORTING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS Organisations (
    Id VARCHAR PRIMARY KEY,
    Name VARCHAR NOT NULL,
    CreatedAt TIMESTAMP
);
CREATE TABLE IF NOT EXISTS Departments (
    Id VARCHAR PRIMARY KEY,
    Name VARCHAR NOT NULL,
    OrganisationId VARCHAR NOT NULL,
    ParentDepartmentId VARCHAR
);
CREATE TABLE IF NOT EXISTS Users (
    Id VARCHAR PRIMARY KEY,
    Email VARCHAR NOT NULL,
    PasswordHash VARCHAR NOT NULL,
    FirstName VARCHAR NOT NULL,
    LastName VARCHAR NOT NULL,
    IsActive BOOLEAN NOT NULL DEFAULT TRUE,
    LastLoginAt TIMESTAMP,
    ManagerId VARCHAR
);
CREATE TABLE IF NOT EXISTS Managers (
    Id VARCHAR PRIMARY KEY,
    OrganisationId VARCHAR NOT NULL,
    ManagesAllDepartments BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS ManagerDepartments (
    ManagerId VARCHAR NOT NULL,
    DepartmentId VARCHAR NOT NULL,
    PRIMARY KEY (ManagerId, DepartmentId)
);
CREATE TABLE IF NOT EXISTS OrganisationUsers (
    Id VARCHAR PRIMARY KEY,
    OrganisationId VARCHAR NOT NULL,
    DepartmentId VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS AuditRecords (
    Id VARCHAR PRIMARY KEY,
    UserId VARCHAR NOT NULL,
    "Date" INTEGER NOT NULL,
    Status VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS Reports (
    Id VARCHAR PRIMARY KEY,
    Name VARCHAR NOT NULL,
    Description VARCHAR,
    Query VARCHAR NOT NULL,
    Status VARCHAR NOT NULL DEFAULT 'Draft'
);
"#;
