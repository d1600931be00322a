//! Gemini chart analysis client.
//!
//! This module handles:
//! - Building the multimodal `generateContent` request (prompt + two charts)
//! - Calling the API with a single credential
//! - Extracting and validating the trade plan JSON from the model's text
//!
//! Retries, timeouts and credential rotation live in the analysis service;
//! this client makes exactly one call per `analyze`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{
    error::{AttemptError, ConfigError},
    models::analysis::{AnalyzeChartsRequest, RawTradePlan, TradePlan},
};

/// Fields the model must return for a plan to be usable.
const REQUIRED_FIELDS: [&str; 5] = [
    "entryPrice",
    "stopLoss",
    "takeProfit",
    "positionType",
    "winRate",
];

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

const ANALYSIS_PROMPT: &str = r#"You are a trading analysis AI. Analyze the two attached charts (15 minute and 1 hour timeframes) and return ONLY a JSON object.

Rules:
1. Keep a 1:2 risk to reward ratio.
2. The distance from entry to stop loss must not exceed 5% of the entry price.
3. The take profit distance from entry must be twice the stop loss distance.

Structure:
{
  "entryPrice": 50000.00,
  "stopLoss": 48750.00,
  "takeProfit": 52500.00,
  "positionType": "LONG",
  "winRate": 65,
  "riskRewardRatio": 2.0,
  "confirmationPoints": ["Support level at 50000", "Bullish RSI divergence"],
  "reasoning": "Price showing strong support with bullish momentum"
}

Base the analysis on support/resistance levels, trend direction on both timeframes, price action patterns, visible volume and technical indicators.

Respond with the JSON object only."#;

/// One analysis call with one credential.
#[async_trait]
pub trait ChartAnalyzer: Send + Sync {
    /// Returns the model's raw text answer.
    async fn analyze(
        &self,
        api_key: &str,
        request: &AnalyzeChartsRequest,
    ) -> Result<String, AttemptError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl GeminiClient {
    /// Client for `{base_url}/models/{model}:generateContent`.
    pub fn new(base_url: &Url, model: &str) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&format!(
            "{}/models/{}:generateContent",
            base_url.as_str().trim_end_matches('/'),
            model
        ))?;
        let http = reqwest::Client::builder().build()?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChartAnalyzer for GeminiClient {
    async fn analyze(
        &self,
        api_key: &str,
        request: &AnalyzeChartsRequest,
    ) -> Result<String, AttemptError> {
        let body = GenerateContentRequest::for_charts(request);

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::MalformedResponse(e.to_string()))?;

        let text = payload.text();
        if text.trim().is_empty() {
            return Err(AttemptError::MalformedResponse(
                "response contained no text".to_string(),
            ));
        }

        Ok(text.trim().to_string())
    }
}

/// Extract the trade plan from the model's answer.
///
/// The answer may wrap the object in prose or code fences; everything from
/// the first `{` to the last `}` is taken as the object.
pub fn parse_trade_plan(text: &str) -> Result<TradePlan, AttemptError> {
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => {
            return Err(AttemptError::MalformedResponse(
                "No JSON object found in response".to_string(),
            ));
        }
    };

    let value: Value = serde_json::from_str(json)
        .map_err(|e| AttemptError::MalformedResponse(e.to_string()))?;

    let object = value.as_object().ok_or_else(|| {
        AttemptError::MalformedResponse("analysis is not a JSON object".to_string())
    })?;
    if let Some(missing) = REQUIRED_FIELDS
        .into_iter()
        .find(|field| !object.contains_key(*field))
    {
        return Err(AttemptError::MissingField(missing));
    }

    let raw: RawTradePlan = serde_json::from_value(value)
        .map_err(|e| AttemptError::MalformedResponse(e.to_string()))?;

    Ok(raw.into())
}

/// Strip a `data:<mime>;base64,` prefix if present.
fn clean_base64(data: &str) -> &str {
    data.split_once(',').map_or(data, |(_, encoded)| encoded)
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn for_charts(request: &'a AnalyzeChartsRequest) -> Self {
        let image = |data: &'a str| Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg",
                data: clean_base64(data),
            },
        };

        Self {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: ANALYSIS_PROMPT,
                    },
                    image(&request.chart_15m),
                    image(&request.chart_1h),
                ],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}
