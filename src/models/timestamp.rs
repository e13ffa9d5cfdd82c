//! Stored timestamps: RFC 3339 in UTC with exactly three fractional digits,
//! so string order in MongoDB matches time order.

use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::Bson;
use serde::{Deserialize, Deserializer, Serializer};

pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// For hand-built `$set` documents.
pub fn to_bson(value: &DateTime<Utc>) -> Bson {
    Bson::String(format(value))
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(value))
}

/// Accepts any RFC 3339 offset and precision.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
