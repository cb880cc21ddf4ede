use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("ledger returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// GraphQL-level errors, in server order.
    #[error("ledger rejected request: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl LedgerError {
    pub fn first_message(&self) -> String {
        match self {
            Self::GraphQl(messages) => messages
                .first()
                .cloned()
                .unwrap_or_else(|| "unknown ledger error".to_string()),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
