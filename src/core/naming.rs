use super::{OrmError, Result, Value};

/// Strips a module path (`crate::model::Order` or `com.acme.Order`) down to the type name.
pub fn simple_type_name(type_name: &str) -> &str {
    type_name
        .rsplit(|c: char| c == ':' || c == '.')
        .next()
        .unwrap_or(type_name)
}

/// Derives a default table name from a type name.
///
/// The first letter is lower-cased, every following upper-case letter is
/// lower-cased and prefixed with `_`: `EntityClassName` becomes `entity_class_name`.
pub fn default_table_name(type_name: &str) -> String {
    let simple = simple_type_name(type_name);
    let mut table = String::with_capacity(simple.len() + 4);
    for (idx, ch) in simple.chars().enumerate() {
        if ch.is_uppercase() {
            if idx > 0 {
                table.push('_');
            }
            table.extend(ch.to_lowercase());
        } else {
            table.push(ch);
        }
    }
    table
}

/// Default name of a foreign-key column: `{field}_{referenced}`.
pub fn default_foreign_key_name(field: &str, referenced_column: &str) -> String {
    format!("{}_{}", field, referenced_column)
}

/// Default name of a join table: `{local_table}_{linked_table}`.
pub fn default_join_table_name(local_table: &str, linked_table: &str) -> String {
    format!("{}_{}", local_table, linked_table)
}

/// Row label of a column read at a given alias level.
pub fn column_label(column: &str, level: usize) -> String {
    format!("{}_{}", column, level)
}

/// Double-quotes an identifier, doubling any embedded `"`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes and comma-joins a list of identifiers.
pub fn quote_identifier_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escapes a string for inclusion in a SQL literal.
///
/// Replaces single quotes with double single quotes.
pub fn sql_escape_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Renders a stored column value as a SQL literal.
///
/// NaN and the infinities have no SQL literal and are rejected.
pub fn sql_literal(value: &Value) -> Result<String> {
    let literal = match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => {
            let text = f.to_string();
            if text.contains(['.', 'e', 'E']) {
                text
            } else {
                format!("{}.0", text)
            }
        }
        Value::Float(f) => {
            return Err(OrmError::Marshalling(format!(
                "Real value {} has no SQL literal",
                f
            )));
        }
        Value::Text(s) => format!("'{}'", sql_escape_string(s)),
        Value::Boolean(b) => i64::from(*b).to_string(),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            format!("X'{}'", hex)
        }
        Value::Timestamp(ts) => ts.timestamp_millis().to_string(),
        Value::Uuid(id) => format!("'{}'", id.hyphenated()),
    };
    Ok(literal)
}

/// Renders a row of values as a comma-separated literal list.
pub fn sql_literal_list<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<String> {
    let literals = values
        .into_iter()
        .map(sql_literal)
        .collect::<Result<Vec<_>>>()?;
    Ok(literals.join(", "))
}
