//! Validator and rewriter used together, as the server does

use nlq_guard::{AccessRewriter, RateLimiter, Rewrite, RowCapStyle, SqlValidator};
use nlq_ir::{ParamValue, RequestContext};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HOSTILE: &[&str] = &[
    "DROP TABLE Users",
    "SELECT * FROM Users; DELETE FROM Users",
    "SELECT Email, PasswordHash FROM Users",
    "SELECT * FROM Users -- WHERE OrganisationId = @TenantId",
    "SELECT * FROM read_csv('/etc/passwd')",
    "SELECT * INTO Backup FROM Users",
    "WITH x AS (SELECT 1) UPDATE Users SET Email = ''",
    "EXEC sp_who",
    "ATTACH 'other.duckdb' AS other",
];

#[test]
fn test_no_hostile_draft_reaches_a_plan() {
    let validator = SqlValidator::default();
    for sql in HOSTILE {
        let rejection = validator
            .accept(sql)
            .expect_err(&format!("accepted: {}", sql));
        assert!(!rejection.is_valid);
        assert!(rejection.error_message.is_some(), "no reason for: {}", sql);
    }
}

#[test]
fn test_plan_binds_scope_over_model_values() {
    let tenant = Uuid::new_v4();
    let scope = Uuid::new_v4();
    let context = RequestContext::new(tenant)
        .with_identity(Uuid::new_v4())
        .with_sub_scopes([scope]);

    let validated = SqlValidator::default()
        .accept(
            "SELECT d.Name FROM Departments d \
             WHERE d.OrganisationId = @TenantId AND d.Id IN (@SubScopeId0)",
        )
        .unwrap();
    let model_parameters: BTreeMap<String, serde_json::Value> = [
        ("TenantId".to_string(), json!(Uuid::nil().to_string())),
        ("@subscopeid0".to_string(), json!("everything")),
        ("Month".to_string(), json!(3)),
    ]
    .into_iter()
    .collect();

    let Rewrite::Plan(plan) = AccessRewriter::new(RowCapStyle::Top, 1000).rewrite(
        validated,
        &model_parameters,
        &context,
    ) else {
        panic!("expected a plan");
    };

    assert!(plan.sql().starts_with("SELECT TOP 1000 d.Name"));
    assert_eq!(plan.parameters()["TenantId"], ParamValue::from(tenant));
    assert_eq!(plan.parameters()["SubScopeId0"], ParamValue::from(scope));
    assert_eq!(plan.parameters()["Month"], ParamValue::Int(3));
    assert_eq!(
        plan.warnings()
            .iter()
            .filter(|w| w.contains("reserved"))
            .count(),
        2
    );
}

#[test]
fn test_limiter_isolates_identities() {
    let limiter = RateLimiter::new(10, 100);
    let start = Instant::now();

    for i in 0..10 {
        assert!(limiter.admit_at("A", start + Duration::from_millis(i)).admitted);
    }
    let denied = limiter.admit_at("A", start + Duration::from_secs(1));
    assert!(!denied.admitted);
    assert_eq!(denied.retry_after, Some(Duration::from_secs(60)));

    let other = limiter.admit_at("B", start + Duration::from_secs(2));
    assert!(other.admitted);
    assert_eq!(other.remaining, 9);
}
