//! Recognition and analysis requests against the hosted model.
//!
//! Both are thin wrappers around one `generateContent` call: a prompt, an
//! optional inline image, and a response schema. Nothing here retries; callers
//! decide what a failure means.

mod error;
mod gemini;
pub mod prompt;
pub mod schema;

pub use error::{AdvisorError, AdvisorResult};
pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

use wr_state::{AnalysisResult, ImagePayload, MatchupState, RecognitionResult};

/// The model service as seen by the rest of the app
#[async_trait::async_trait]
pub trait CoachModel: Send + Sync {
    /// Read heroes and enemy items off a screenshot
    async fn recognize(&self, image: &ImagePayload) -> AdvisorResult<RecognitionResult>;

    /// Coaching advice for a matchup
    async fn analyze(&self, matchup: &MatchupState) -> AdvisorResult<AnalysisResult>;
}
