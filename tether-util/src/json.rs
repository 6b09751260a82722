use std::time::Duration;

use serde::{Deserializer, Serializer};

pub fn deserialize_duration_from_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms: u64 = serde::Deserialize::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

pub fn serialize_duration_to_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Period {
        #[serde(
            deserialize_with = "deserialize_duration_from_ms",
            serialize_with = "serialize_duration_to_ms"
        )]
        every: Duration,
    }

    #[test]
    fn it_reads_durations_as_milliseconds() {
        let period: Period = serde_json::from_value(json!({ "every": 1500 })).unwrap();
        assert_eq!(period.every, Duration::from_millis(1500));
    }

    #[test]
    fn it_writes_durations_as_milliseconds() {
        let period = Period {
            every: Duration::from_secs(3),
        };
        assert_eq!(serde_json::to_value(period).unwrap(), json!({ "every": 3000 }));
    }

    #[test]
    fn it_rejects_negative_values() {
        assert!(serde_json::from_value::<Period>(json!({ "every": -1 })).is_err());
    }
}
