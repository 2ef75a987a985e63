use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("Invalid output key: {0:?}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;
