use crate::delivery::DeliveryError;
use crate::fetch::FetchError;

/// A detail or photos page that loaded but could not be read. Transient by
/// classification: the listing is retried on the next cycle and never written
/// to the skipped ledger.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page is missing {0}")]
    MissingField(&'static str),
    #[error("embedded listing data: {0}")]
    EmbeddedData(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("could not read config file {path}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is not valid")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown subscriber {0:?}")]
    UnknownSubscriber(String),
}
