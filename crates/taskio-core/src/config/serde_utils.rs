//! Serde helpers for configuration files

/// Helper module for Duration serialization as whole seconds
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "taskio_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        wait: Duration,
    }

    #[test]
    fn test_duration_secs_toml() {
        let parsed: Timeouts = toml::from_str("wait = 45").unwrap();
        assert_eq!(parsed.wait, Duration::from_secs(45));

        let text = toml::to_string(&parsed).unwrap();
        assert_eq!(text.trim(), "wait = 45");
    }

    #[test]
    fn test_duration_secs_rejects_negative() {
        assert!(toml::from_str::<Timeouts>("wait = -1").is_err());
    }
}
