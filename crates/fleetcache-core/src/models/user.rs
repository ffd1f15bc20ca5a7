use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::lenient_i64;
use super::Record;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(
        rename = "IDUSER",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    /// Short login code, referenced by interventions and chat messages
    #[serde(rename = "CDUSER", default)]
    pub code: Option<String>,
    #[serde(rename = "NOM", default)]
    pub last_name: Option<String>,
    #[serde(rename = "PRENOM", default)]
    pub first_name: Option<String>,
    #[serde(rename = "ROLE", default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            self.code.clone().unwrap_or_default()
        } else {
            parts.join(" ")
        }
    }
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const ENDPOINT: &'static str = "/api/users";

    fn server_id(&self) -> Option<i64> {
        self.id
    }
}
