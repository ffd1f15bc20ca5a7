use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::lenient_i64;
use super::Record;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(
        rename = "IDCONTACT",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    #[serde(rename = "NOM", default)]
    pub last_name: Option<String>,
    #[serde(rename = "PRENOM", default)]
    pub first_name: Option<String>,
    #[serde(rename = "SOCIETE", default)]
    pub company: Option<String>,
    #[serde(rename = "EMAIL", default)]
    pub email: Option<String>,
    #[serde(rename = "TEL", default)]
    pub phone: Option<String>,
    /// Client or collaborator, individual or company
    #[serde(rename = "TYPE_CONTACT", default)]
    pub contact_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    /// Company name for company contacts, "First Last" otherwise
    pub fn display_name(&self) -> String {
        if let Some(company) = self.company.as_deref().filter(|c| !c.trim().is_empty()) {
            return company.to_string();
        }
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            "(unnamed)".to_string()
        } else {
            name
        }
    }
}

impl Record for Contact {
    const COLLECTION: &'static str = "contacts";
    const ENDPOINT: &'static str = "/api/contacts";

    fn server_id(&self) -> Option<i64> {
        self.id
    }
}
