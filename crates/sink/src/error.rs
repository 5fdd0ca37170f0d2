use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Webhook sink is not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
