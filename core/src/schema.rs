//! Snapshot encoding and the lenient decoder used at load time.
//!
//! Stored data may come from older builds or be partially corrupted. The
//! decoder never fails on content: it produces a fully typed, normalized
//! collection plus a [`LoadOutcome`] describing what it had to repair.
//!
//! Repairs applied:
//! - payload not JSON or not an array → empty collection
//! - non-object entries → skipped
//! - missing ids → regenerated
//! - unknown enum values → defaults
//! - unparsable timestamps → `now`
//! - `updatedAt` earlier than `createdAt` → raised to `createdAt`
//! - photos without a payload → dropped
//! - photo lists longer than the cap → truncated

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::model::{
    Case, CaseNote, CasePhoto, CaseStage, InsuranceStatus, PartsStatus, Priority, new_id,
    normalize_registration,
};

/// What the decoder found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored.
    Empty,
    /// Stored payload could not be used at all.
    Corrupt,
    /// Collection decoded; `repairs` counts substituted or dropped values.
    Loaded { repairs: usize },
}

#[derive(Debug, Clone)]
pub struct DecodedCollection {
    pub cases: Vec<Case>,
    pub outcome: LoadOutcome,
}

/// Serialize the collection for storage.
pub fn encode_cases(cases: &[Case]) -> Result<String, serde_json::Error> {
    serde_json::to_string(cases)
}

/// Decode a stored snapshot. Never fails.
pub fn decode_cases(
    payload: Option<&str>,
    now: DateTime<Utc>,
    max_photos: usize,
) -> DecodedCollection {
    let Some(payload) = payload else {
        return DecodedCollection {
            cases: Vec::new(),
            outcome: LoadOutcome::Empty,
        };
    };

    let entries = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(entries)) => entries,
        Ok(other) => {
            tracing::warn!(
                found = json_type(&other),
                "stored cases are not an array, starting empty"
            );
            return corrupt();
        }
        Err(e) => {
            tracing::warn!(error = %e, "stored cases are not valid JSON, starting empty");
            return corrupt();
        }
    };

    let mut decoder = Decoder {
        now,
        max_photos,
        repairs: 0,
    };
    let mut cases = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::Object(obj) => cases.push(decoder.case(&obj)),
            other => {
                decoder.repairs += 1;
                tracing::warn!(found = json_type(&other), "skipping non-object case entry");
            }
        }
    }

    if decoder.repairs > 0 {
        tracing::warn!(
            repairs = decoder.repairs,
            cases = cases.len(),
            "repaired stored cases"
        );
    }

    DecodedCollection {
        cases,
        outcome: LoadOutcome::Loaded {
            repairs: decoder.repairs,
        },
    }
}

/// Quick shape check: well-formed JSON whose root is an array.
pub fn is_case_array(payload: &str) -> bool {
    matches!(serde_json::from_str::<Value>(payload), Ok(Value::Array(_)))
}

fn corrupt() -> DecodedCollection {
    DecodedCollection {
        cases: Vec::new(),
        outcome: LoadOutcome::Corrupt,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct Decoder {
    now: DateTime<Utc>,
    max_photos: usize,
    repairs: usize,
}

impl Decoder {
    fn case(&mut self, obj: &Map<String, Value>) -> Case {
        let id = self.id(obj);
        let created_at = self.timestamp(obj, "createdAt");
        let mut updated_at = self.timestamp(obj, "updatedAt");
        if updated_at < created_at {
            self.repairs += 1;
            updated_at = created_at;
        }

        let notes = match obj.get("notes") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(note) => Some(self.note(note)),
                    _ => {
                        self.repairs += 1;
                        None
                    }
                })
                .collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                self.repairs += 1;
                Vec::new()
            }
        };

        let mut photos: Vec<CasePhoto> = match obj.get("photos") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(photo) => self.photo(photo),
                    _ => {
                        self.repairs += 1;
                        None
                    }
                })
                .collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                self.repairs += 1;
                Vec::new()
            }
        };
        if photos.len() > self.max_photos {
            tracing::warn!(
                case_id = %id,
                photos = photos.len(),
                cap = self.max_photos,
                "truncating photo list to cap"
            );
            self.repairs += 1;
            photos.truncate(self.max_photos);
        }

        Case {
            id,
            customer_name: text(obj, "customerName"),
            customer_phone: text(obj, "customerPhone"),
            vehicle_model: text(obj, "vehicleModel"),
            vehicle_color: text(obj, "vehicleColor"),
            registration_number: normalize_registration(&text(obj, "registrationNumber")),
            damage_description: text(obj, "damageDescription"),
            stage: self.enum_field(obj, "stage", CaseStage::parse),
            insurance_status: self.enum_field(obj, "insuranceStatus", InsuranceStatus::parse),
            parts_status: self.enum_field(obj, "partsStatus", PartsStatus::parse),
            priority: self.enum_field(obj, "priority", Priority::parse),
            notes,
            photos,
            created_at,
            updated_at,
        }
    }

    fn note(&mut self, obj: &Map<String, Value>) -> CaseNote {
        CaseNote {
            id: self.id(obj),
            text: text(obj, "text"),
            timestamp: self.timestamp(obj, "timestamp"),
        }
    }

    fn photo(&mut self, obj: &Map<String, Value>) -> Option<CasePhoto> {
        let data_url = obj
            .get("dataUrl")
            .or_else(|| obj.get("encodedImage"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let Some(data_url) = data_url else {
            self.repairs += 1;
            return None;
        };

        Some(CasePhoto {
            id: self.id(obj),
            data_url: data_url.to_string(),
            timestamp: self.timestamp(obj, "timestamp"),
            archived: obj
                .get("archived")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    fn id(&mut self, obj: &Map<String, Value>) -> String {
        match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                self.repairs += 1;
                new_id()
            }
        }
    }

    fn timestamp(&mut self, obj: &Map<String, Value>, key: &str) -> DateTime<Utc> {
        match obj.get(key).and_then(parse_timestamp) {
            Some(ts) => ts,
            None => {
                self.repairs += 1;
                self.now
            }
        }
    }

    fn enum_field<T: Default>(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> T {
        match obj.get(key).and_then(Value::as_str).and_then(parse) {
            Some(value) => value,
            None => {
                self.repairs += 1;
                T::default()
            }
        }
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Accepts RFC 3339, naive ISO-8601 (taken as UTC) and epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
