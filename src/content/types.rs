// src/content/types.rs
// Content Types and Lenient Field Decoders

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Next utterance the server wants presented while the conversation is running
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingPrompt {
    #[serde(deserialize_with = "lenient_text")]
    pub text: String,
    /// Base64 speech audio; empty when the server sent text only
    #[serde(deserialize_with = "lenient_text")]
    pub audio_base64: String,
}

impl PendingPrompt {
    pub fn has_audio(&self) -> bool {
        !self.audio_base64.trim().is_empty()
    }

    /// Decode the speech payload. Returns None when absent or not valid base64.
    pub fn decode_audio(&self) -> Option<Vec<u8>> {
        if !self.has_audio() {
            return None;
        }
        match BASE64_STANDARD.decode(self.audio_base64.trim()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Prompt audio is not valid base64: {}", e);
                None
            }
        }
    }
}

/// Suggested outing. The server fills these in piecemeal, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDetails {
    #[serde(deserialize_with = "lenient_opt_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_opt_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_opt_text")]
    pub address: Option<String>,
    #[serde(alias = "cost", deserialize_with = "lenient_opt_text")]
    pub estimated_cost: Option<String>,
    #[serde(deserialize_with = "lenient_opt_text")]
    pub justification: Option<String>,
    #[serde(deserialize_with = "lenient_opt_text")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_opt_text")]
    pub url_to_book_tickets: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storyboard {
    #[serde(deserialize_with = "lenient_list")]
    pub narration: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub images: Vec<String>,
}

/// One narration line paired with its image, if the storyboard had one at that index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryFrame {
    pub narration: String,
    pub image: Option<String>,
}

/// Server-relative media references attached to the story.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaRefs<'a> {
    pub images: &'a [String],
    pub audio: &'a [String],
    pub video: &'a [String],
}

/// Terminal content bundle. Decoding never fails on a missing field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalOutput {
    #[serde(deserialize_with = "lenient_event")]
    pub event: Option<EventDetails>,
    #[serde(deserialize_with = "lenient_storyboard")]
    pub storyboard: Storyboard,
    #[serde(deserialize_with = "lenient_text")]
    pub story: String,
    #[serde(alias = "images", alias = "image_paths", deserialize_with = "lenient_list")]
    pub story_image_paths: Vec<String>,
    #[serde(alias = "audio", deserialize_with = "lenient_list")]
    pub story_audio: Vec<String>,
    #[serde(alias = "video", deserialize_with = "lenient_list")]
    pub story_video: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub lesson: String,
    /// Diagnostic only, never drives rendering
    #[serde(deserialize_with = "lenient_text")]
    pub reasoning: String,
    #[serde(alias = "planForEvening", deserialize_with = "lenient_text")]
    pub plan_for_evening: String,
    #[serde(alias = "artProject", deserialize_with = "lenient_text")]
    pub art_project: String,
    #[serde(deserialize_with = "lenient_opt_text")]
    pub interactive_story_start: Option<String>,
}

impl FinalOutput {
    /// Zip the storyboard sequences. The longer side wins; missing entries become blanks.
    pub fn frames(&self) -> Vec<StoryFrame> {
        let narration = &self.storyboard.narration;
        let images = &self.storyboard.images;
        let len = narration.len().max(images.len());

        (0..len)
            .map(|i| StoryFrame {
                narration: narration.get(i).cloned().unwrap_or_default(),
                image: images.get(i).filter(|p| !p.trim().is_empty()).cloned(),
            })
            .collect()
    }

    pub fn media(&self) -> MediaRefs<'_> {
        MediaRefs {
            images: &self.story_image_paths,
            audio: &self.story_audio,
            video: &self.story_video,
        }
    }
}

/// Result of decoding one `/state` response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    NotReady,
    Prompt(PendingPrompt),
    Final(Box<FinalOutput>),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed JSON: {0}")]
    Malformed(String),

    #[error("Unexpected payload shape: {0}")]
    UnexpectedShape(String),
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(value).unwrap_or_default())
}

fn lenient_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(value))
}

/// Accepts a list, a single string, or null. Non-text items keep their slot as "".
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| value_to_text(item).unwrap_or_default())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

fn lenient_event<'de, D>(deserializer: D) -> Result<Option<EventDetails>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

fn lenient_storyboard<'de, D>(deserializer: D) -> Result<Storyboard, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(Storyboard::default());
    }
    Ok(serde_json::from_value(value).unwrap_or_default())
}
