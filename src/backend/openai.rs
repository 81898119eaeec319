//! OpenAI-compatible reasoning service
//!
//! Asks a chat-completion endpoint (OpenAI, Ollama, vLLM, LM Studio, etc.)
//! to decide in the voice of one persona. The reply is free text that must
//! contain one JSON object; everything outside the outermost braces is
//! ignored.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReasoningSettings;
use crate::error::{Error, Result};
use crate::types::{ActionKind, Decision, ReasoningOutput};
use crate::version;

use super::{ObservationContext, PersonaContext, ReasoningService};

// ─────────────────────────────────────────────────────────────────
// OpenAI API types (request/response)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// The JSON object a persona is asked to reply with
#[derive(Debug, Deserialize)]
struct PersonaReply {
    action: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    payload: serde_json::Value,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    veto: bool,
}

// ─────────────────────────────────────────────────────────────────
// Reply parsing
// ─────────────────────────────────────────────────────────────────

/// Slice from the first `{` to the last `}`
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub(crate) fn parse_reply(text: &str) -> Result<ReasoningOutput> {
    let json = extract_json(text)
        .ok_or_else(|| Error::reasoning_failure("reply contains no JSON object"))?;
    let reply: PersonaReply = serde_json::from_str(json)
        .map_err(|e| Error::reasoning_failure(format!("malformed reply: {}", e)))?;
    let action: ActionKind = reply.action.parse().map_err(Error::reasoning_failure)?;

    let output = ReasoningOutput::new(
        Decision::new(action, reply.summary).with_payload(reply.payload),
        reply.confidence,
        reply.reasoning,
    );
    Ok(if reply.veto { output.with_veto() } else { output })
}

// ─────────────────────────────────────────────────────────────────
// Prompt
// ─────────────────────────────────────────────────────────────────

fn system_prompt(persona: &PersonaContext) -> String {
    let traits = persona
        .traits
        .iter()
        .map(|(name, score)| format!("{}={}", name, score))
        .collect::<Vec<_>>()
        .join(", ");
    let expertise = persona.expertise.iter().cloned().collect::<Vec<_>>().join(", ");

    format!(
        "You are {name}, the {role} persona of an autonomous DAO (authority {authority}/10).\n\
         Expertise: {expertise}\n\
         Focus areas: {focus}\n\
         Personality: {traits}\n\
         Communication style: {style}\n\n\
         Decide what the DAO should do about the observation you are given. \
         Reply with a single JSON object and nothing else:\n\
         {{\"action\": \"reward_transfer|proposal_submission|notification|no_action\", \
         \"summary\": \"...\", \"payload\": {{}}, \"confidence\": 0.0-1.0, \
         \"reasoning\": \"...\", \"veto\": false}}",
        name = persona.name,
        role = persona.role.display_name(),
        authority = persona.authority_level,
        expertise = expertise,
        focus = persona.focus_areas.join(", "),
        traits = traits,
        style = persona.communication_style,
    )
}

fn user_prompt(observation: &ObservationContext) -> Result<String> {
    let mut prompt = format!(
        "Cycle: {}\nImpact tier: {}\n",
        observation.cycle_id, observation.tier
    );
    if let Some(kind) = observation.session_kind {
        prompt.push_str(&format!(
            "This is a {} coordination session. Other personas decide independently.\n",
            kind
        ));
    }
    if !observation.recent_decisions.is_empty() {
        prompt.push_str("Your recent decisions (newest first):\n");
        for record in &observation.recent_decisions {
            prompt.push_str(&format!(
                "- {} [{}] {} -> {} ({}): {}\n",
                record.recorded_at.format("%Y-%m-%d %H:%M"),
                record.cycle_id,
                record.topic,
                record.decision.action,
                record.outcome_status,
                record.decision.summary
            ));
        }
    }
    prompt.push_str("Observation:\n");
    prompt.push_str(&serde_json::to_string_pretty(&observation.observation)?);
    Ok(prompt)
}

// ─────────────────────────────────────────────────────────────────
// OpenAI Reasoning Service
// ─────────────────────────────────────────────────────────────────

pub struct OpenAiReasoning {
    settings: ReasoningSettings,
    client: Client,
}

impl OpenAiReasoning {
    pub fn new(settings: ReasoningSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(version::build_info().user_agent())
            .build()
            .map_err(|e| Error::reasoning_failure(format!("failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %settings.base_url,
            model = %settings.model,
            "OpenAI-compatible reasoning service created"
        );

        Ok(Self { settings, client })
    }

    /// Build the authorization header value (if API key is set)
    fn auth_header(&self) -> Option<String> {
        if self.settings.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.settings.api_key))
        }
    }

    /// Chat completion with retry on 429, 5xx and connection errors
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request_body = ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: Some(self.settings.temperature),
        };

        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
                debug!(attempt, ?delay, "Retrying reasoning request");
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.post(&url).json(&request_body);
            if let Some(ref auth) = self.auth_header() {
                req = req.header("Authorization", auth);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed = response
                            .json::<ChatCompletionResponse>()
                            .await
                            .map_err(|e| {
                                Error::reasoning_failure(format!("failed to parse API response: {}", e))
                            })?;
                        let choice = parsed
                            .choices
                            .into_iter()
                            .next()
                            .ok_or_else(|| Error::reasoning_failure("no choices in API response"))?;
                        return Ok(choice.message.content.unwrap_or_default());
                    } else if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, "Retryable API error: {}", body);
                        last_error = Some(Error::reasoning_failure(format!(
                            "API error {}: {}",
                            status, body
                        )));
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::reasoning_failure(format!(
                            "API error {}: {}",
                            status, body
                        )));
                    }
                }
                Err(e) => {
                    if e.is_timeout() || e.is_connect() {
                        warn!(attempt, error = %e, "Retryable connection error");
                        last_error = Some(Error::reasoning_failure(format!("connection error: {}", e)));
                    } else {
                        return Err(Error::reasoning_failure(format!("request error: {}", e)));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::reasoning_failure("all retry attempts exhausted")))
    }
}

#[async_trait]
impl ReasoningService for OpenAiReasoning {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn reason(
        &self,
        persona: &PersonaContext,
        observation: &ObservationContext,
    ) -> Result<ReasoningOutput> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system_prompt(persona),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_prompt(observation)?,
            },
        ];

        let text = self.chat_completion(messages).await?;
        let output = parse_reply(&text)?;
        debug!(
            persona_id = %persona.persona_id,
            topic = %observation.observation.topic,
            action = %output.decision.action,
            confidence = output.confidence,
            "Persona reasoned"
        );
        Ok(output)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
