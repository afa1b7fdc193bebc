//! Purpose: Ordered, typed TFS header metadata.
//! Exports: `Header`, `HeaderEntry`.
//! Role: Holds `@` lines in declaration order for lookup, update and re-serialization.
//! Invariants: Keys are unique; `set` on an existing key keeps its position.
//! Invariants: Each entry's value kind agrees with its type code when the code is known.
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{TypeCode, Value, format_float};

#[derive(Clone, Debug, PartialEq)]
pub struct HeaderEntry {
    pub key: String,
    pub type_code: TypeCode,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    entries: Vec<HeaderEntry>,
}

#[derive(Serialize)]
struct HeaderEntryJson<'a> {
    key: &'a str,
    #[serde(rename = "type")]
    type_code: &'a str,
    value: serde_json::Value,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&HeaderEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    pub fn get(&self, key: &str) -> Result<&Value, Error> {
        self.entry(key)
            .map(|entry| &entry.value)
            .ok_or_else(|| Error::key_not_found(key))
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        type_code: TypeCode,
    ) -> Result<(), Error> {
        let key = key.into();
        let value = value.into();
        if let Value::Text(text) = &value {
            validate_text(text).map_err(|err| err.with_key(key.clone()))?;
        }
        self.upsert(key, value, type_code)
    }

    /// `set` without the writability check on text, for values read from a file.
    pub(crate) fn upsert(
        &mut self,
        key: String,
        value: Value,
        type_code: TypeCode,
    ) -> Result<(), Error> {
        validate_key(&key)?;
        if let Some(kind) = type_code.kind() {
            if kind != value.kind() {
                return Err(Error::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "type code {type_code} expects {} but value is {}",
                        kind.label(),
                        value.kind().label()
                    ))
                    .with_key(key));
            }
        }

        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.type_code = type_code;
                entry.value = value;
            }
            None => self.entries.push(HeaderEntry {
                key,
                type_code,
                value,
            }),
        }
        Ok(())
    }

    /// `@ KEY TYPE VALUE` lines, keys and codes padded into aligned columns.
    pub fn serialize(&self) -> Vec<String> {
        let key_width = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
        let code_width = self
            .entries
            .iter()
            .map(|e| e.type_code.as_str().len())
            .max()
            .unwrap_or(0);
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "@ {:<key_width$} {:<code_width$} {}",
                    entry.key,
                    entry.type_code.as_str(),
                    format_header_value(&entry.value)
                )
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let entries = self
            .entries
            .iter()
            .map(|entry| HeaderEntryJson {
                key: &entry.key,
                type_code: entry.type_code.as_str(),
                value: entry.value.to_json(),
            })
            .collect::<Vec<_>>();
        serde_json::to_value(entries).unwrap_or(serde_json::Value::Null)
    }
}

fn format_header_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Text(v) => format!("\"{v}\""),
    }
}

fn validate_key(key: &str) -> Result<(), Error> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid header key `{key}`"))
            .with_hint("Header keys must be non-empty and contain no whitespace."));
    }
    Ok(())
}

/// Text values are always written double-quoted, so they cannot contain `"` or line breaks.
pub(crate) fn validate_text(text: &str) -> Result<(), Error> {
    if text.contains(['"', '\n', '\r']) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("text value cannot be written to TFS")
            .with_hint("TFS strings cannot contain double quotes or line breaks."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Header;
    use crate::core::error::ErrorKind;
    use crate::core::value::{TypeCode, Value};

    #[test]
    fn set_then_get_round_trips() {
        let mut header = Header::new();
        header.set("TITLE", "Run1", TypeCode::new("%s")).unwrap();
        assert_eq!(header.get("TITLE").unwrap(), &Value::Text("Run1".into()));

        header.set("TITLE", "Run2", TypeCode::new("%s")).unwrap();
        assert_eq!(header.len(), 1);
        assert_eq!(header.entries()[0].key, "TITLE");
        assert_eq!(header.get("TITLE").unwrap(), &Value::Text("Run2".into()));
    }

    #[test]
    fn upsert_keeps_position_and_appends_new_keys() {
        let mut header = Header::new();
        header.set("NAME", "TWISS", TypeCode::new("%s")).unwrap();
        header.set("Q1", 62.31, TypeCode::new("%le")).unwrap();
        header.set("ORIGIN", "5.05.02", TypeCode::new("%s")).unwrap();
        header.set("Q1", 62.28, TypeCode::new("%le")).unwrap();
        header.set("NPART", 3_i64, TypeCode::new("%d")).unwrap();

        let keys = header
            .entries()
            .iter()
            .map(|e| e.key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, ["NAME", "Q1", "ORIGIN", "NPART"]);
        assert_eq!(header.get("Q1").unwrap(), &Value::Float(62.28));
    }

    #[test]
    fn get_missing_key_is_key_not_found() {
        let header = Header::new();
        let err = header.get("GAMMA").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
        assert_eq!(err.key(), Some("GAMMA"));
    }

    #[test]
    fn set_rejects_value_that_contradicts_code() {
        let mut header = Header::new();
        let err = header.set("Q1", "high", TypeCode::new("%le")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(header.is_empty());

        let err = header
            .set("BAD KEY", 1_i64, TypeCode::new("%d"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = header
            .set("TITLE", "say \"hi\"", TypeCode::new("%s"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn serialize_aligns_keys_and_formats_by_kind() {
        let mut header = Header::new();
        header.set("TYPE", "TWISS", TypeCode::new("%s")).unwrap();
        header.set("LENGTH", 26658.8832, TypeCode::new("%le")).unwrap();
        header.set("N", 2_i64, TypeCode::new("%d")).unwrap();

        assert_eq!(
            header.serialize(),
            vec![
                "@ TYPE   %s  \"TWISS\"",
                "@ LENGTH %le 2.66588832e+04",
                "@ N      %d  2",
            ]
        );
    }
}
