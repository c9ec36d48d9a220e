//! Gemini `generateContent` request payload.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{CallRequest, RelayError, Result};

/// Header carrying the server-held API key.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Builds the `generateContent` endpoint for `model`.
///
/// Example: `("https://generativelanguage.googleapis.com", "gemini-2.5-flash")`
/// → `"https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"`
pub fn generate_content_url(api_base: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        api_base.trim().trim_end_matches('/'),
        model.trim()
    )
}

/// Inbound payload accepted by the relay.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayPrompt {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub use_search: bool,
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl RelayPrompt {
    /// Parses and validates an inbound JSON body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let prompt: Self = serde_json::from_slice(body)
            .map_err(|err| RelayError::Decode(format!("invalid request JSON: {err}")))?;
        if prompt.prompt.trim().is_empty() {
            return Err(RelayError::InvalidRequest("prompt is required".to_owned()));
        }
        Ok(prompt)
    }

    /// Converts the prompt into the upstream wire payload.
    pub fn to_request(&self) -> GenerateContentRequest {
        let system_instruction = self
            .system_instruction
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| Content {
                role: None,
                parts: vec![Part::text(text)],
            });

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_owned()),
                parts: vec![Part::text(&self.prompt)],
            }],
            system_instruction,
            tools: self.use_search.then(|| vec![Tool::google_search()]),
        }
    }

    /// Builds the authenticated call for `url`.
    pub fn to_call(&self, url: &str, api_key: &str) -> Result<CallRequest> {
        CallRequest::json(url, &self.to_request())?.with_header(API_KEY_HEADER, api_key)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
pub struct Part {
    pub text: String,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: text.to_owned(),
        }
    }
}

/// Search-augmentation capability. Only `google_search` is supported.
#[derive(Debug, Serialize)]
pub struct Tool {
    pub google_search: GoogleSearch,
}

impl Tool {
    pub fn google_search() -> Self {
        Self {
            google_search: GoogleSearch {},
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GoogleSearch {}
