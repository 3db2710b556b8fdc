//! services/api/src/adapters/narrative_llm.rs
//!
//! This module contains the adapter for the story-writing LLM.
//! It implements the `NarrativeService` port from the `core` crate against any
//! OpenAI-compatible chat endpoint (Gemini exposes one).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;
use storybook_core::{
    domain::{Generation, PageDraft},
    ports::NarrativeService,
};
use tracing::{info, warn};

const SYSTEM_INSTRUCTIONS: &str = "You are a children's book author. You write warm, simple stories \
for young readers and describe every page so an illustrator can draw it. You answer with JSON only.";

const USER_INPUT_TEMPLATE: &str = r#"Write a short children's story about {theme}.
The story should be 3-5 pages long.
Return ONLY a valid JSON array where each object represents a page.
Format:
[
    {
        "page_number": 1,
        "text_content": "Story text for page 1...",
        "image_prompt": "A detailed description of the scene for an illustration..."
    },
    ...
]"#;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?").expect("code fence pattern is valid"));

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `NarrativeService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiNarrativeAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiNarrativeAdapter {
    /// Creates a new `OpenAiNarrativeAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn request_story(&self, theme: &str) -> Result<String, OpenAIError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(USER_INPUT_TEMPLATE.replace("{theme}", theme))
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()?;

        let response = self.client.chat().create(request).await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

//=========================================================================================
// Reply Parsing
//=========================================================================================

#[derive(Deserialize)]
struct RawPage {
    #[serde(default, deserialize_with = "lenient_page_number")]
    page_number: Option<i32>,
    #[serde(default)]
    text_content: String,
    #[serde(default)]
    image_prompt: String,
}

/// Accepts `2`, `2.0` and `"2"`. Anything else counts as missing.
fn lenient_page_number<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(number.and_then(|n| i32::try_from(n).ok()))
}

/// Removes markdown code fences the model likes to wrap its JSON in.
pub fn strip_code_fences(reply: &str) -> String {
    CODE_FENCE.replace_all(reply, "").trim().to_string()
}

/// Parses the model's reply into page drafts.
///
/// Pages without text are dropped. A missing or unreadable page number falls
/// back to the 1-based position among the pages that were kept.
pub fn parse_page_drafts(reply: &str) -> Result<Vec<PageDraft>, serde_json::Error> {
    let raw: Vec<RawPage> = serde_json::from_str(&strip_code_fences(reply))?;
    let mut drafts: Vec<PageDraft> = Vec::with_capacity(raw.len());
    for (index, page) in raw.into_iter().enumerate() {
        let text_content = page.text_content.trim().to_string();
        if text_content.is_empty() {
            warn!(position = index + 1, "Skipping page without text");
            continue;
        }
        let position = drafts.len() as i32 + 1;
        drafts.push(PageDraft {
            page_number: page.page_number.unwrap_or(position),
            text_content,
            image_prompt: page.image_prompt.trim().to_string(),
        });
    }
    Ok(drafts)
}

//=========================================================================================
// `NarrativeService` Trait Implementation
//=========================================================================================

#[async_trait]
impl NarrativeService for OpenAiNarrativeAdapter {
    async fn generate_pages(&self, theme: &str) -> Generation<Vec<PageDraft>> {
        let reply = match self.request_story(theme).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(theme, "Narrative model call failed: {}", e);
                return Generation::degraded(format!("narrative model call failed: {}", e));
            }
        };

        match parse_page_drafts(&reply) {
            Ok(drafts) => {
                info!(theme, pages = drafts.len(), "Narrative generated");
                Generation::Success(drafts)
            }
            Err(e) => {
                warn!(theme, "Narrative reply was not a page array: {}", e);
                Generation::degraded(format!("narrative reply could not be parsed: {}", e))
            }
        }
    }
}
