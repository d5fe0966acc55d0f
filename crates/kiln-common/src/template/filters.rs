//! Custom filters for launch-script templates

use minijinja::{Error, ErrorKind, Value};

/// Shell quote filter
///
/// Usage: `${value | quote}`. Wraps the value in single quotes; embedded
/// single quotes become `'\''`.
pub fn quote(value: Value) -> Result<String, Error> {
    if value.is_undefined() {
        return Err(Error::new(
            ErrorKind::UndefinedError,
            "cannot quote an undefined value",
        ));
    }
    let raw = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    Ok(format!("'{}'", raw.replace('\'', r"'\''")))
}
