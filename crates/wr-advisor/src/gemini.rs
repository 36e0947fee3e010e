use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use wr_state::{AnalysisResult, ImagePayload, MatchupState, RecognitionResult};

use crate::error::{AdvisorError, AdvisorResult};
use crate::prompt::{analysis_prompt, RECOGNITION_PROMPT};
use crate::schema::{analysis_schema, recognition_schema};
use crate::CoachModel;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Connection settings for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Gemini `generateContent` client for both recognition and analysis
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Fails fast when no API key is configured
    pub fn new(config: GeminiConfig) -> AdvisorResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AdvisorError::MissingApiKey);
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// One round trip: send parts with a response schema, parse the model text as `T`
    async fn generate<T: DeserializeOwned>(
        &self,
        parts: Vec<Part<'_>>,
        schema: Value,
    ) -> AdvisorResult<T> {
        let request = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AdvisorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| AdvisorError::MalformedResponse(format!("response envelope: {}", e)))?;
        let text = parsed.text().ok_or_else(|| {
            let reason = parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            AdvisorError::MalformedResponse(format!("empty model output ({})", reason))
        })?;

        debug!("Model returned {} bytes of JSON", text.len());
        serde_json::from_str(text.trim())
            .map_err(|e| AdvisorError::MalformedResponse(format!("model JSON: {}", e)))
    }

    #[tracing::instrument(skip(self, image), fields(model = %self.config.model, width = image.width, height = image.height))]
    pub async fn recognize_screen(&self, image: &ImagePayload) -> AdvisorResult<RecognitionResult> {
        let parts = vec![
            Part::Text {
                text: RECOGNITION_PROMPT,
            },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            },
        ];
        self.generate(parts, recognition_schema()).await
    }

    #[tracing::instrument(skip(self, matchup), fields(model = %self.config.model, my_hero = %matchup.my_hero, enemy_hero = %matchup.enemy_hero))]
    pub async fn analyze_matchup(&self, matchup: &MatchupState) -> AdvisorResult<AnalysisResult> {
        let prompt = analysis_prompt(matchup);
        self.generate(vec![Part::Text { text: &prompt }], analysis_schema())
            .await
    }
}

#[async_trait::async_trait]
impl CoachModel for GeminiClient {
    async fn recognize(&self, image: &ImagePayload) -> AdvisorResult<RecognitionResult> {
        self.recognize_screen(image).await
    }

    async fn analyze(&self, matchup: &MatchupState) -> AdvisorResult<AnalysisResult> {
        self.analyze_matchup(matchup).await
    }
}
