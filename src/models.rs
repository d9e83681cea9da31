//! Record model shared by the fetch, snapshot and reconcile stages.
//!
//! Every record has the same fixed, ordered set of fields ([`FIELDS`]). The
//! order is also the column order of the persisted CSV snapshot. Values are
//! always text; an absent value is the empty string.

use serde_json::{Map, Value};

/// The fixed field set, in snapshot column order.
pub const FIELDS: [&str; 26] = [
    "case_id",
    "open_date",
    "close_date",
    "target_close_date",
    "case_topic",
    "service_name",
    "assigned_department",
    "assigned_team",
    "case_status",
    "closure_reason",
    "closure_comments",
    "on_time",
    "report_source",
    "full_address",
    "street_number",
    "street_name",
    "zip_code",
    "neighborhood",
    "public_works_district",
    "city_council_district",
    "fire_district",
    "police_district",
    "ward",
    "precinct",
    "longitude",
    "latitude",
];

/// Field that uniquely identifies a record across fetches.
pub const ID_FIELD: &str = "case_id";

/// Temporal field used for ordering and for the incremental watermark.
pub const TEMPORAL_FIELD: &str = "open_date";

const ID_INDEX: usize = 0;
const TEMPORAL_INDEX: usize = 1;

/// A raw record object as returned by the DataStore API.
pub type RawRecord = Map<String, Value>;

/// One normalized row: a text value for each entry in [`FIELDS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            values: vec![String::new(); FIELDS.len()],
        }
    }
}

impl Record {
    /// Normalize an API record object into the fixed field set.
    ///
    /// Unknown keys (such as CKAN's internal `_id`) are dropped and missing
    /// keys become empty strings. `null` maps to the empty string, strings
    /// are kept verbatim, and any other scalar keeps its JSON text form.
    pub fn from_json(obj: &RawRecord) -> Self {
        let values = FIELDS
            .iter()
            .map(|field| obj.get(*field).map(value_to_text).unwrap_or_default())
            .collect();
        Self { values }
    }

    /// Build a record from `(field, value)` pairs, ignoring unknown fields.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = Self::default();
        for (field, value) in pairs {
            record.set(field, value);
        }
        record
    }

    /// Value of `field`, or `None` if the field is not part of the record shape.
    pub fn get(&self, field: &str) -> Option<&str> {
        field_index(field).map(|i| self.values[i].as_str())
    }

    /// Set `field` to `value`. Returns `false` for unknown fields.
    pub fn set(&mut self, field: &str, value: &str) -> bool {
        match field_index(field) {
            Some(i) => {
                self.values[i] = value.to_string();
                true
            }
            None => false,
        }
    }

    /// The identity key, or `None` when the record has no usable key.
    pub fn case_id(&self) -> Option<&str> {
        let id = self.values[ID_INDEX].as_str();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// The temporal field; empty when absent.
    pub fn open_date(&self) -> &str {
        &self.values[TEMPORAL_INDEX]
    }

    /// Values in [`FIELDS`] order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Position of `field` in [`FIELDS`].
pub fn field_index(field: &str) -> Option<usize> {
    FIELDS.iter().position(|f| *f == field)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn from_json_fills_missing_and_drops_unknown() {
        let record = Record::from_json(&raw(json!({
            "_id": 17,
            "case_id": "101005000000",
            "open_date": "2024-01-01T08:00:00",
            "unexpected": "dropped",
        })));

        assert_eq!(record.values().len(), FIELDS.len());
        assert_eq!(record.case_id(), Some("101005000000"));
        assert_eq!(record.open_date(), "2024-01-01T08:00:00");
        assert_eq!(record.get("case_status"), Some(""));
        assert_eq!(record.get("unexpected"), None);
        assert_eq!(record.get("_id"), None);
    }

    #[test]
    fn from_json_renders_scalars_as_text() {
        let record = Record::from_json(&raw(json!({
            "case_id": "X1",
            "closure_comments": null,
            "latitude": 42.3601,
            "ward": 7,
            "on_time": true,
        })));

        assert_eq!(record.get("closure_comments"), Some(""));
        assert_eq!(record.get("latitude"), Some("42.3601"));
        assert_eq!(record.get("ward"), Some("7"));
        assert_eq!(record.get("on_time"), Some("true"));
    }

    #[test]
    fn empty_case_id_has_no_identity() {
        let record = Record::from_pairs([("case_id", ""), ("open_date", "2024-01-01")]);
        assert_eq!(record.case_id(), None);
        assert_eq!(Record::default().case_id(), None);
    }

    #[test]
    fn set_rejects_unknown_fields() {
        let mut record = Record::default();
        assert!(record.set("case_status", "Open"));
        assert!(!record.set("not_a_field", "x"));
        assert_eq!(record.get("case_status"), Some("Open"));
    }

    #[test]
    fn key_fields_sit_where_expected() {
        assert_eq!(field_index(ID_FIELD), Some(ID_INDEX));
        assert_eq!(field_index(TEMPORAL_FIELD), Some(TEMPORAL_INDEX));
    }
}
