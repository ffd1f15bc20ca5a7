//! Column decoders tolerant of how the database driver encodes values.
//!
//! Depending on the column and the driver, numbers arrive as JSON numbers,
//! floats (`1250.5`) or strings (`"12"`), and flags as booleans, `0`/`1` or
//! `"0"`/`"1"`. Values that cannot be read decode as `None`/`false` rather
//! than failing the whole row.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(to_i64(&value))
}

pub(crate) fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(to_i64(&value).and_then(|n| i32::try_from(n).ok()))
}

pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => to_i64(&Value::Number(n)).is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "O" | "oui"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "lenient_i64")]
        id: Option<i64>,
        #[serde(default, deserialize_with = "lenient_i32")]
        rank: Option<i32>,
    }

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numbers_from_any_encoding() {
        assert_eq!(row(json!({"id": 12})).id, Some(12));
        assert_eq!(row(json!({"id": "12"})).id, Some(12));
        assert_eq!(row(json!({"id": " 7 "})).id, Some(7));
        assert_eq!(row(json!({"id": 1250.5})).id, Some(1251));
        assert_eq!(row(json!({"id": "1250.4"})).id, Some(1250));
    }

    #[test]
    fn test_unreadable_numbers_are_none() {
        assert_eq!(row(json!({"id": null})).id, None);
        assert_eq!(row(json!({"id": ""})).id, None);
        assert_eq!(row(json!({"id": "abc"})).id, None);
        assert_eq!(row(json!({"id": [1]})).id, None);
        assert_eq!(row(json!({})).id, None);
        assert_eq!(row(json!({"rank": 5_000_000_000i64})).rank, None);
    }
}
