//! Timeouts in configuration files are plain integers in milliseconds.
//!
//! Use with `#[serde(with = "kvlink_proto::duration_ms")]`. Sub-millisecond
//! precision is dropped; values too large for `u64` milliseconds saturate.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "super", rename = "connect_timeout_ms")]
        connect: Duration,
    }

    #[test]
    fn test_sub_second_value_survives_yaml() {
        let timeouts = Timeouts {
            connect: Duration::from_millis(500),
        };

        let yaml = serde_yaml::to_string(&timeouts).unwrap();
        assert!(yaml.contains("connect_timeout_ms: 500"));

        let parsed: Timeouts = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, timeouts);
    }

    #[test]
    fn test_whole_seconds_are_written_as_millis() {
        let parsed: Timeouts = serde_yaml::from_str("connect_timeout_ms: 30000").unwrap();
        assert_eq!(parsed.connect, Duration::from_secs(30));
    }

    #[test]
    fn test_negative_value_rejected() {
        let result: Result<Timeouts, _> = serde_yaml::from_str("connect_timeout_ms: -1");
        assert!(result.is_err());
    }
}
