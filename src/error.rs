use std::path::PathBuf;
use thiserror::Error;

/// Problems resolving a settings profile. Each required field has its own variant.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No settings profile named '{0}'")]
    ProfileNotFound(String),

    #[error("Setting 'auth_token' is required")]
    MissingAuthToken,

    #[error("Setting 'catalogue_url' is required")]
    MissingCatalogueUrl,

    #[error("Setting 'data_dir' is required")]
    MissingDataDir,

    #[error("Setting '{key}' must be {expected}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
    },

    #[error("Unable to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid asset URL: {0}")]
    InvalidUrl(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to read search cache: {0}")]
    Cache(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Pre-signed storage URLs that expire mid-run come back as HTTP 400.
    pub fn is_credential_expiry(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 400, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_400_is_credential_expiry() {
        let expired = SyncError::HttpStatus {
            url: "https://store.example.com/a.tif".to_string(),
            status: 400,
        };
        let failed = SyncError::HttpStatus {
            url: "https://store.example.com/a.tif".to_string(),
            status: 403,
        };
        assert!(expired.is_credential_expiry());
        assert!(!failed.is_credential_expiry());
        assert!(!SyncError::InvalidUrl("nope".to_string()).is_credential_expiry());
    }
}
