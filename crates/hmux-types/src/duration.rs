//! Serde helpers encoding durations as integer milliseconds.
//!
//! Use with `#[serde(with = "hmux_types::duration::millis")]` or
//! `#[serde(with = "hmux_types::duration::option_millis")]`.

pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// `None` and zero both mean "no duration".
pub mod option_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::millis::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timings {
        #[serde(with = "super::millis")]
        ttl: Duration,
        #[serde(default, with = "super::option_millis")]
        expiry: Option<Duration>,
    }

    #[test]
    fn encodes_as_milliseconds() {
        let t = Timings {
            ttl: Duration::from_secs(3),
            expiry: Some(Duration::from_millis(250)),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"ttl":3000,"expiry":250}"#);
        assert_eq!(serde_json::from_str::<Timings>(&json).unwrap(), t);
    }

    #[test]
    fn zero_or_missing_optional_is_none() {
        let t: Timings = serde_json::from_str(r#"{"ttl":16,"expiry":0}"#).unwrap();
        assert_eq!(t.expiry, None);
        let t: Timings = serde_json::from_str(r#"{"ttl":16}"#).unwrap();
        assert_eq!(t.expiry, None);
        assert_eq!(t.ttl, Duration::from_millis(16));
    }
}
