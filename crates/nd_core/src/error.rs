use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A page could not be reached or returned a non-success status.
    #[error("Fetch error for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Markup did not contain an element that was required.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The summary provider could not be set up. Per-article failures are
    /// reported through the summarizer's outcome instead.
    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(reason: impl ToString) -> Self {
        Self::Persistence(reason.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_message() {
        let err = Error::fetch("https://example.com", "HTTP status 503");
        assert_eq!(
            err.to_string(),
            "Fetch error for https://example.com: HTTP status 503"
        );
    }
}
