//! Named-to-positional parameter translation
//!
//! Drafts use `@Name` placeholders; DuckDB binds `?` markers by position.
//! Placeholders inside string literals and quoted identifiers are left alone.

use nlq_ir::{BoundStatement, ParamValue, StorageError};
use std::collections::{BTreeMap, HashMap};

/// Rewrite every `@Name` in `sql` to `?` and collect the matching values in order.
///
/// Lookup is case-insensitive. A placeholder with no value is a bind error.
pub fn bind_named(
    sql: &str,
    parameters: &BTreeMap<String, ParamValue>,
) -> Result<BoundStatement, StorageError> {
    let lookup: HashMap<String, &ParamValue> = parameters
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();

    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((idx, c)) = chars.next() {
        if let Some(open) = quote {
            out.push(c);
            // Doubled quotes close and reopen, which leaves the state unchanged
            if c == open {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '@' => {
                let start = idx + 1;
                let mut end = start;
                while let Some(&(j, next)) = chars.peek() {
                    let valid = if j == start {
                        next.is_ascii_alphabetic() || next == '_'
                    } else {
                        next.is_ascii_alphanumeric() || next == '_'
                    };
                    if !valid {
                        break;
                    }
                    end = j + next.len_utf8();
                    chars.next();
                }

                if end == start {
                    out.push(c);
                    continue;
                }

                let name = &sql[start..end];
                let value = lookup.get(&name.to_ascii_lowercase()).ok_or_else(|| {
                    StorageError::Bind(format!("No value bound for parameter @{}", name))
                })?;
                values.push((*value).clone());
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    Ok(BoundStatement { sql: out, values })
}
