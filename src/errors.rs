use thiserror::Error;

use crate::radio::TransportError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(
        "time lookup failed: {0}; check the TIMEZONE setting against \
         http://worldtimeapi.org/timezones"
    )]
    TimeLookup(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
