//! Lenient number decoding.
//!
//! Exchanges send most numbers as JSON strings, some as numbers, and some
//! fields as empty strings. Anything that does not parse becomes `None`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Some(v as f64),
        Raw::Float(v) => Some(v),
        Raw::Str(s) => s.trim().parse::<f64>().ok(),
        Raw::Null => None,
    }
    .filter(|v| v.is_finite()))
}

pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Some(v),
        Raw::Float(v) if v.is_finite() => Some(v as i64),
        Raw::Float(_) => None,
        Raw::Str(s) => s.trim().parse::<i64>().ok(),
        Raw::Null => None,
    })
}
