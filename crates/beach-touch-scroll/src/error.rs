use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrollError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("scroll driver closed")]
    DriverClosed,
}

pub type ScrollResult<T> = Result<T, ScrollError>;
