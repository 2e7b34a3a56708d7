//! Typed wrappers over the product APIs the resources call
//!
//! Each service borrows the shared [`ApsaraStackClient`] and resolves its
//! product client on every call, so the first call pays for endpoint
//! resolution and later calls hit the cache.

pub mod adb;
pub mod dds;
pub mod ess;
pub mod hbase;
pub mod kms;
pub mod vpc;

pub use adb::AdbService;
pub use dds::DdsService;
pub use ess::EssService;
pub use hbase::HbaseService;
pub use kms::KmsService;
pub use vpc::VpcService;

use serde::{Deserialize, Deserializer};

/// Accept a JSON string or number; some APIs return counters as strings
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Accept a JSON number or numeric string
pub(crate) fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or_default()),
        serde_json::Value::String(s) if s.is_empty() => Ok(0),
        serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        serde_json::Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "string_or_number")]
        period: String,
        #[serde(deserialize_with = "number_or_string")]
        port: i64,
    }

    #[test]
    fn lenient_scalars() {
        let s: Sample = serde_json::from_value(json!({ "period": 7, "port": "3717" })).unwrap();
        assert_eq!(s.period, "7");
        assert_eq!(s.port, 3717);

        let s: Sample = serde_json::from_value(json!({ "period": "7", "port": 3717 })).unwrap();
        assert_eq!(s.period, "7");
        assert_eq!(s.port, 3717);
    }
}
