//! Conversions between DuckDB values and JSON / bind values

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::Row;
use nlq_ir::ParamValue;
use serde_json::json;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const MICROS_PER_SECOND: i64 = 1_000_000;

pub(crate) fn cell_to_json(row: &Row<'_>, idx: usize) -> duckdb::Result<serde_json::Value> {
    Ok(value_to_json(&Value::from(row.get_ref(idx)?)))
}

/// Scalars map onto JSON scalars; temporal values become ISO text; nested
/// values become arrays and objects.
pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::TinyInt(i) => json!(i),
        Value::SmallInt(i) => json!(i),
        Value::Int(i) => json!(i),
        Value::BigInt(i) => json!(i),
        Value::HugeInt(i) => match i64::try_from(*i) {
            Ok(small) => json!(small),
            Err(_) => serde_json::Value::String(i.to_string()),
        },
        Value::UHugeInt(i) => match u64::try_from(*i) {
            Ok(small) => json!(small),
            Err(_) => serde_json::Value::String(i.to_string()),
        },
        Value::UTinyInt(i) => json!(i),
        Value::USmallInt(i) => json!(i),
        Value::UInt(i) => json!(i),
        Value::UBigInt(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Double(f) => json!(f),
        Value::Decimal(d) => decimal_to_json(&d.to_string()),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
        Value::Geometry(b) => serde_json::Value::String(format!("<geometry {} bytes>", b.len())),
        Value::Date32(days) => date_to_json(*days),
        Value::Timestamp(unit, v) => timestamp_to_json(*unit, *v),
        Value::Time64(unit, v) => time_to_json(*unit, *v),
        Value::Interval { months, days, nanos } => {
            serde_json::Value::String(interval_text(*months, *days, *nanos))
        }
        Value::Enum(label) => serde_json::Value::String(label.clone()),
        Value::List(items) | Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Struct(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (key_text(k), value_to_json(v)))
                .collect(),
        ),
        Value::Union(inner) => value_to_json(inner),
        other => serde_json::Value::String(format!("{:?}", other)),
    }
}

fn key_text(key: &Value) -> String {
    match value_to_json(key) {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Exact decimal text becomes a JSON number when it fits an f64.
fn decimal_to_json(text: &str) -> serde_json::Value {
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => json!(f),
        _ => serde_json::Value::String(text.to_string()),
    }
}

fn to_micros(unit: TimeUnit, v: i64) -> Option<i64> {
    match unit {
        TimeUnit::Second => v.checked_mul(MICROS_PER_SECOND),
        TimeUnit::Millisecond => v.checked_mul(1_000),
        TimeUnit::Microsecond => Some(v),
        TimeUnit::Nanosecond => Some(v / 1_000),
    }
}

fn date_to_json(days: i32) -> serde_json::Value {
    NaiveDate::from_num_days_from_ce_opt(days.saturating_add(UNIX_EPOCH_DAYS_FROM_CE))
        .map(|d| serde_json::Value::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(serde_json::Value::Null)
}

fn timestamp_to_json(unit: TimeUnit, v: i64) -> serde_json::Value {
    to_micros(unit, v)
        .and_then(DateTime::from_timestamp_micros)
        .map(|ts| serde_json::Value::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .unwrap_or(serde_json::Value::Null)
}

/// Time of day as `HH:MM:SS[.f]`.
fn time_to_json(unit: TimeUnit, v: i64) -> serde_json::Value {
    to_micros(unit, v)
        .and_then(time_of_day)
        .map(|t| serde_json::Value::String(t.format("%H:%M:%S%.f").to_string()))
        .unwrap_or(serde_json::Value::Null)
}

fn time_of_day(micros: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(micros.div_euclid(MICROS_PER_SECOND)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(MICROS_PER_SECOND) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

/// DuckDB's own interval rendering: `1 year 2 months 3 days 04:05:06`.
fn interval_text(months: i32, days: i32, nanos: i64) -> String {
    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    for (amount, unit) in [(years, "year"), (months, "month"), (days, "day")] {
        if amount != 0 {
            let plural = if amount.abs() == 1 { "" } else { "s" };
            parts.push(format!("{} {}{}", amount, unit, plural));
        }
    }

    if nanos != 0 || parts.is_empty() {
        let sign = if nanos < 0 { "-" } else { "" };
        let micros = (nanos / 1_000).unsigned_abs();
        let secs = micros / MICROS_PER_SECOND as u64;
        let frac = micros % MICROS_PER_SECOND as u64;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3_600,
            (secs / 60) % 60,
            secs % 60
        );
        if frac != 0 {
            clock.push_str(format!(".{:06}", frac).trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

pub(crate) fn to_duck_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Null => Value::Null,
        ParamValue::Bool(b) => Value::Boolean(*b),
        ParamValue::Int(i) => Value::BigInt(*i),
        ParamValue::Float(f) => Value::Double(*f),
        ParamValue::Text(s) => Value::Text(s.clone()),
    }
}
