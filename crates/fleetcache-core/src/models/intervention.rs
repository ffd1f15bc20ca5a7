use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::{lenient_bool, lenient_i32, lenient_i64};
use super::Record;

/// A maintenance work order against a vehicle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Intervention {
    #[serde(
        rename = "IDINTER",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    #[serde(rename = "ST_INTER", default)]
    pub status: Option<String>,
    #[serde(
        rename = "IDVEHICULE",
        default,
        deserialize_with = "lenient_i64"
    )]
    pub vehicule_id: Option<i64>,
    #[serde(
        rename = "IDCONTACT",
        default,
        deserialize_with = "lenient_i64"
    )]
    pub contact_id: Option<i64>,
    /// Technician code
    #[serde(rename = "CDUSER", default)]
    pub user_code: Option<String>,
    #[serde(rename = "DT_INTER", default)]
    pub date: Option<String>,
    #[serde(rename = "DESIGNATION", default)]
    pub designation: Option<String>,
    #[serde(rename = "COMMENTAIRE", default)]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Intervention {
    pub fn chat_path(id: i64) -> String {
        format!("{}/{}/chat", Self::ENDPOINT, id)
    }

    pub fn instructions_path(id: i64) -> String {
        format!("{}/{}/instructions", Self::ENDPOINT, id)
    }

    pub fn status_display(&self) -> &str {
        self.status.as_deref().filter(|s| !s.is_empty()).unwrap_or("-")
    }
}

impl Record for Intervention {
    const COLLECTION: &'static str = "interventions";
    const ENDPOINT: &'static str = "/api/interventions";

    fn server_id(&self) -> Option<i64> {
        self.id
    }
}

/// Message in an intervention's chat thread.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(
        rename = "IDMSG",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    #[serde(rename = "CDUSER", default)]
    pub user_code: Option<String>,
    #[serde(rename = "MESSAGE", default)]
    pub message: String,
    #[serde(rename = "DT_MSG", default)]
    pub sent_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Checklist step attached to an intervention.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(
        rename = "IDINSTR",
        default,
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    #[serde(rename = "LIBELLE", default)]
    pub label: String,
    #[serde(rename = "ORDRE", default, deserialize_with = "lenient_i32")]
    pub position: Option<i32>,
    #[serde(rename = "FAIT", default, deserialize_with = "lenient_bool")]
    pub done: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
