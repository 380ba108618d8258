#[derive(Debug)]
pub enum VigilError {
    ConfigError(String),
    StorageError(String),
    ServerError(String),
}

impl std::fmt::Display for VigilError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for VigilError {}

pub type VigilResult<T> = Result<T, VigilError>;
