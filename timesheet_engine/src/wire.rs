//! Serde helpers for the ERP's JSON encodings.
//!
//! The ERP marks an unset many-to-one field with the boolean `false`
//! and a set one with a two element `[id, name]` array.  Dates arrive
//! as `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` strings, both in UTC, and
//! optional dates and strings use `false` for "absent" as well.  The
//! modules below are meant for `#[serde(with = "...")]` so the `false`
//! marker never leaks past deserialisation.

use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an ERP timestamp in either supported form.  Date-only values
/// resolve to midnight UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(|date| Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
        .map_err(|_| EngineError::InputDecode(format!("invalid ERP timestamp {raw:?}")))
}

/// Parse an ERP date.  A full timestamp is accepted and truncated to
/// its UTC calendar day.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    parse_timestamp(raw).map(|ts| ts.date_naive())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// `false` or `[id, name]`.
pub mod relation {
    use crate::models::Relation;
    use serde::de::{self, IgnoredAny, SeqAccess, Unexpected, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &Option<Relation>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_bool(false),
            Some(relation) => {
                let mut pair = serializer.serialize_tuple(2)?;
                pair.serialize_element(&relation.id)?;
                pair.serialize_element(&relation.name)?;
                pair.end()
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Relation>, D::Error> {
        deserializer.deserialize_any(RelationVisitor)
    }

    struct RelationVisitor;

    impl<'de> Visitor<'de> for RelationVisitor {
        type Value = Option<Relation>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("`false` or an `[id, name]` pair")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
            if value {
                Err(E::invalid_value(Unexpected::Bool(true), &self))
            } else {
                Ok(None)
            }
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let id: i64 = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(0, &self))?;
            let name: String = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(1, &self))?;
            if seq.next_element::<IgnoredAny>()?.is_some() {
                return Err(de::Error::invalid_length(3, &self));
            }
            Ok(Some(Relation { id, name }))
        }
    }
}

/// Required UTC timestamp.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

/// Required calendar date.
pub mod date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(de::Error::custom)
    }
}

/// `false`, `null` or a calendar date.
pub mod optional_date {
    use super::FalseOr;
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_bool(false),
            Some(date) => serializer.serialize_str(&super::format_date(date)),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        match FalseOr::deserialize(deserializer)?.into_option() {
            None => Ok(None),
            Some(raw) => super::parse_date(&raw).map(Some).map_err(de::Error::custom),
        }
    }
}

/// `false`, `null` or a string.  Empty strings stay as they are; the
/// consumers decide what blank means.
pub mod optional_string {
    use super::FalseOr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_bool(false),
            Some(text) => serializer.serialize_str(text),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(FalseOr::deserialize(deserializer)?.into_option())
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum FalseOr {
    Text(String),
    Flag(bool),
    Null(()),
}

impl FalseOr {
    fn into_option(self) -> Option<String> {
        match self {
            FalseOr::Text(text) => Some(text),
            FalseOr::Flag(_) | FalseOr::Null(()) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Relation;
    use chrono::Timelike;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Holder {
        #[serde(default, with = "relation")]
        rel: Option<Relation>,
    }

    #[test]
    fn false_is_empty_and_reencodes_as_false() {
        let holder: Holder = serde_json::from_value(json!({ "rel": false })).unwrap();
        assert!(holder.rel.is_none());
        assert_eq!(serde_json::to_value(&holder).unwrap(), json!({ "rel": false }));
    }

    #[test]
    fn pair_decodes_into_relation() {
        let holder: Holder = serde_json::from_value(json!({ "rel": [7, "Authorities"] })).unwrap();
        assert_eq!(
            holder.rel,
            Some(Relation {
                id: 7,
                name: "Authorities".into()
            })
        );
        assert_eq!(serde_json::to_value(&holder).unwrap(), json!({ "rel": [7, "Authorities"] }));
    }

    #[test]
    fn other_shapes_are_rejected() {
        for value in [json!(true), json!([1]), json!([1, "a", 2]), json!("x"), json!(3)] {
            let result: std::result::Result<Holder, _> = serde_json::from_value(json!({ "rel": value }));
            assert!(result.is_err(), "accepted {value}");
        }
    }

    #[test]
    fn timestamps_accept_both_forms() {
        let full = parse_timestamp("2021-02-03 09:15:30").unwrap();
        assert_eq!(full.hour(), 9);
        assert_eq!(full.minute(), 15);
        let day = parse_timestamp("2021-02-03").unwrap();
        assert_eq!(day.date_naive(), NaiveDate::from_ymd_opt(2021, 2, 3).unwrap());
        assert_eq!(day.hour(), 0);
        assert!(matches!(parse_timestamp("03.02.2021"), Err(EngineError::InputDecode(_))));
    }
}
