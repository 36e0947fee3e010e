use thiserror::Error;

/// Errors from one round trip to the model service.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("No API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("Failed to reach the model service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;
