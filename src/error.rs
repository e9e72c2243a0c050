use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive name '{0}' does not start with a <period><year> prefix")]
    InvalidArchiveName(String),

    #[error("No operator registry file linked from {0}")]
    RegistryUnavailable(String),

    #[error("Duplicate registry id in operator registry: {0}")]
    DuplicateRegistryId(String),

    #[error("Entry {entry} from {archive} was already extracted from another archive")]
    DuplicateEntry { archive: String, entry: String },
}

impl EtlError {
    pub fn download(url: impl Into<String>, message: impl ToString) -> Self {
        EtlError::Download {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
