//! Shared serialization helpers for the agent JSON encoding
//!
//! The agent encodes protobuf `bytes` fields as base64 strings and
//! `DurationInfo` as an object holding nanoseconds.

/// Helper module for `Bytes` fields carried as base64 strings
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64 string
    pub fn serialize<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    /// Deserialize bytes from a base64 string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(de::Error::custom)
    }
}

/// Helper module for `Duration` fields carried as `{"nanoseconds": n}`
pub mod duration_info {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationInfo {
        nanoseconds: i64,
    }

    /// Serialize a Duration as a `DurationInfo` object
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanoseconds = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        DurationInfo { nanoseconds }.serialize(serializer)
    }

    /// Deserialize a Duration from a `DurationInfo` object; negative values clamp to zero
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let info = DurationInfo::deserialize(deserializer)?;
        Ok(Duration::from_nanos(info.nanoseconds.max(0) as u64))
    }
}
