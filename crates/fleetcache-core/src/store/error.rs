use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize {name}: {source}")]
    Serialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No pending record {id} in {collection}")]
    UnknownRecord { collection: String, id: String },
}

impl StoreError {
    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        StoreError::Io {
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn serde(name: &str, source: serde_json::Error) -> Self {
        StoreError::Serialization {
            name: name.to_string(),
            source,
        }
    }
}
