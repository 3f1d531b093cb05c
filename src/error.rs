use thiserror::Error;

#[derive(Error, Debug)]
pub enum StaleError {
    #[error("invalid staleness threshold: {0}")]
    InvalidThreshold(String),

    #[error("the content repository is unavailable: {0:#}")]
    RepositoryUnavailable(anyhow::Error),

    #[error("could not send the email: {0:#}")]
    MailTransportFailure(anyhow::Error),
}

impl StaleError {
    pub fn invalid_threshold(msg: impl Into<String>) -> Self {
        Self::InvalidThreshold(msg.into())
    }
}
