use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::lenient_i64;
use super::Record;

/// Fleet registry entry. `IDMACHINE` links it to the maintenance-side
/// machine record describing the same physical vehicle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vehicule {
    #[serde(
        rename = "IDVEHICULE",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_i64"
    )]
    pub id: Option<i64>,
    #[serde(rename = "IMMAT", default)]
    pub registration: Option<String>,
    #[serde(rename = "MARQUE", default)]
    pub make: Option<String>,
    #[serde(rename = "MODELE", default)]
    pub model: Option<String>,
    #[serde(
        rename = "IDMACHINE",
        default,
        deserialize_with = "lenient_i64"
    )]
    pub machine_id: Option<i64>,
    #[serde(
        rename = "KM",
        default,
        deserialize_with = "lenient_i64"
    )]
    pub mileage: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vehicule {
    pub fn label(&self) -> String {
        let reg = self.registration.as_deref().unwrap_or("?");
        match (self.make.as_deref(), self.model.as_deref()) {
            (Some(make), Some(model)) => format!("{} ({} {})", reg, make, model),
            (Some(make), None) => format!("{} ({})", reg, make),
            _ => reg.to_string(),
        }
    }
}

impl Record for Vehicule {
    const COLLECTION: &'static str = "vehicules";
    const ENDPOINT: &'static str = "/api/vehicules";

    fn server_id(&self) -> Option<i64> {
        self.id
    }
}
