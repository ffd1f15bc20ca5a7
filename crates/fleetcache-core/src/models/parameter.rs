use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::lenient_i64;
use super::Record;

/// Application-wide setting from `/api/paramappli`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppParameter {
    #[serde(
        rename = "IDPARAM",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    #[serde(rename = "CLE", default)]
    pub key: String,
    #[serde(rename = "VALEUR", default)]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for AppParameter {
    const COLLECTION: &'static str = "paramappli";
    const ENDPOINT: &'static str = "/api/paramappli";

    fn server_id(&self) -> Option<i64> {
        self.id
    }
}

/// Look up a parameter value by key.
pub fn find_parameter<'a>(params: &'a [AppParameter], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|p| p.key.eq_ignore_ascii_case(key))
        .and_then(|p| p.value.as_deref())
}
