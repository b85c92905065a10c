use super::types::{DecodeError, FinalOutput, PendingPrompt, ServerMessage};
use serde_json::{Map, Value};

const PROMPT_TAG: &str = "audio";
const OUTPUT_TAG: &str = "output";

/// Keys that only ever appear on the final bundle.
const FINAL_KEYS: &[&str] = &[
    "story",
    "storyboard",
    "event",
    "lesson",
    "plan_for_evening",
    "planForEvening",
    "story_image_paths",
    "story_audio",
    "story_video",
    "reasoning",
    "art_project",
    "artProject",
    "interactive_story_start",
];

/// Decode a `/state` body.
///
/// Accepts both the tagged envelopes (`{"type":"audio",...}`, `{"type":"output","text":{...}}`)
/// and the flat shapes older servers send. `null`, `{}` and an empty body all mean the server has
/// nothing yet. A body carrying final-output keys is treated as final even if prompt keys are also
/// present.
pub fn decode_state_body(body: &str) -> Result<ServerMessage, DecodeError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(ServerMessage::NotReady);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode_state_value(value)
}

fn decode_state_value(value: Value) -> Result<ServerMessage, DecodeError> {
    let object = match value {
        Value::Null => return Ok(ServerMessage::NotReady),
        Value::Object(object) => object,
        other => {
            return Err(DecodeError::UnexpectedShape(format!(
                "expected object, got {}",
                kind_of(&other)
            )))
        }
    };

    if object.is_empty() {
        return Ok(ServerMessage::NotReady);
    }

    match object.get("type").and_then(Value::as_str) {
        Some(OUTPUT_TAG) => return Ok(ServerMessage::Final(Box::new(final_from_envelope(object)))),
        Some(PROMPT_TAG) if !has_final_keys(&object) => {
            return Ok(ServerMessage::Prompt(prompt_from(object)))
        }
        _ => {}
    }

    if has_final_keys(&object) {
        return Ok(ServerMessage::Final(Box::new(final_from(Value::Object(object)))));
    }

    if object.contains_key("audio_base64") || object.get("text").is_some_and(Value::is_string) {
        return Ok(ServerMessage::Prompt(prompt_from(object)));
    }

    let keys = object.keys().cloned().collect::<Vec<_>>().join(", ");
    Err(DecodeError::UnexpectedShape(format!(
        "no known fields (saw: {})",
        keys
    )))
}

fn has_final_keys(object: &Map<String, Value>) -> bool {
    FINAL_KEYS.iter().any(|key| object.contains_key(*key))
}

fn prompt_from(object: Map<String, Value>) -> PendingPrompt {
    serde_json::from_value(Value::Object(object)).unwrap_or_default()
}

/// The tagged envelope nests the bundle under `text`; fall back to the envelope itself.
fn final_from_envelope(mut object: Map<String, Value>) -> FinalOutput {
    match object.remove("text") {
        Some(inner @ Value::Object(_)) => final_from(inner),
        _ => final_from(Value::Object(object)),
    }
}

fn final_from(value: Value) -> FinalOutput {
    match serde_json::from_value(value) {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Final output fell back to defaults: {}", e);
            FinalOutput::default()
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_null_bodies_are_not_ready() {
        assert_eq!(decode_state_body("").unwrap(), ServerMessage::NotReady);
        assert_eq!(decode_state_body("  null ").unwrap(), ServerMessage::NotReady);
        assert_eq!(decode_state_body("{}").unwrap(), ServerMessage::NotReady);
    }

    #[test]
    fn test_flat_prompt() {
        let msg = decode_state_body(r#"{"text":"Hello","audio_base64":"AAA="}"#).unwrap();
        let ServerMessage::Prompt(prompt) = msg else {
            panic!("expected prompt, got {:?}", msg);
        };
        assert_eq!(prompt.text, "Hello");
        assert_eq!(prompt.audio_base64, "AAA=");
        assert_eq!(prompt.decode_audio(), Some(vec![0, 0]));
    }

    #[test]
    fn test_tagged_prompt_envelope() {
        let body = r#"{"type":"audio","text":"Hi there","audio_base64":"","format":"mp3"}"#;
        let ServerMessage::Prompt(prompt) = decode_state_body(body).unwrap() else {
            panic!("expected prompt");
        };
        assert_eq!(prompt.text, "Hi there");
        assert!(!prompt.has_audio());
        assert_eq!(prompt.decode_audio(), None);
    }

    #[test]
    fn test_tagged_output_envelope_unwraps_text() {
        let body = r#"{
            "type": "output",
            "format": "text",
            "text": {
                "story": "Once upon a time",
                "storyboard": {"narration": ["a", "b"], "images": ["static/0.png"]},
                "story_image_paths": ["static/0.png"],
                "lesson": "Share toys",
                "reasoning": "because",
                "plan_for_evening": "Read together"
            }
        }"#;
        let ServerMessage::Final(output) = decode_state_body(body).unwrap() else {
            panic!("expected final output");
        };
        assert_eq!(output.story, "Once upon a time");
        assert_eq!(output.lesson, "Share toys");
        assert_eq!(output.plan_for_evening, "Read together");
        assert!(output.event.is_none());
        assert!(output.story_video.is_empty());
    }

    #[test]
    fn test_missing_event_and_video_default() {
        let body = r#"{"story":"test","story_audio":[],"lesson":"l"}"#;
        let ServerMessage::Final(output) = decode_state_body(body).unwrap() else {
            panic!("expected final output");
        };
        assert_eq!(output.event, None);
        assert!(output.story_video.is_empty());
        assert!(output.story_audio.is_empty());
        assert!(output.storyboard.narration.is_empty());
        assert_eq!(output.art_project, "");
    }

    #[test]
    fn test_partial_event_and_numeric_cost() {
        let body = r#"{
            "story": "s",
            "event": {"name": "Zoo night", "estimated_cost": 12.5, "url": null, "address": "1 Zoo Rd"}
        }"#;
        let ServerMessage::Final(output) = decode_state_body(body).unwrap() else {
            panic!("expected final output");
        };
        let event = output.event.expect("event should decode");
        assert_eq!(event.name.as_deref(), Some("Zoo night"));
        assert_eq!(event.estimated_cost.as_deref(), Some("12.5"));
        assert_eq!(event.url, None);
        assert_eq!(event.description, None);
    }

    #[test]
    fn test_renamed_and_single_value_media_fields() {
        let body = r#"{
            "story": "s",
            "images": ["a.png", "b.png"],
            "story_video": "clip.mp4",
            "planForEvening": "Bath then bed",
            "storyboard": null,
            "event": "not an object"
        }"#;
        let ServerMessage::Final(output) = decode_state_body(body).unwrap() else {
            panic!("expected final output");
        };
        assert_eq!(output.story_image_paths, vec!["a.png", "b.png"]);
        assert_eq!(output.story_video, vec!["clip.mp4"]);
        assert_eq!(output.plan_for_evening, "Bath then bed");
        assert_eq!(output.storyboard, Default::default());
        assert_eq!(output.event, None);
    }

    #[test]
    fn test_final_wins_over_prompt_keys() {
        let body = r#"{"type":"audio","text":"hi","audio_base64":"","story":"done"}"#;
        assert!(matches!(
            decode_state_body(body).unwrap(),
            ServerMessage::Final(_)
        ));
    }

    #[test]
    fn test_secondary_fields_alone_are_final() {
        let ServerMessage::Final(output) = decode_state_body(r#"{"artProject":"Paint"}"#).unwrap()
        else {
            panic!("expected final output");
        };
        assert_eq!(output.art_project, "Paint");

        for body in [
            r#"{"art_project":"Clay"}"#,
            r#"{"reasoning":"because"}"#,
            r#"{"interactive_story_start":"Once"}"#,
        ] {
            assert!(
                matches!(decode_state_body(body).unwrap(), ServerMessage::Final(_)),
                "{} should decode as final",
                body
            );
        }
    }

    #[test]
    fn test_frames_zip_uneven_sequences() {
        let body = r#"{"storyboard": {"narration": ["one", "two", "three"], "images": ["1.png", ""]}}"#;
        let ServerMessage::Final(output) = decode_state_body(body).unwrap() else {
            panic!("expected final output");
        };
        let frames = output.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].image.as_deref(), Some("1.png"));
        assert_eq!(frames[1].image, None);
        assert_eq!(frames[2].narration, "three");
    }

    #[test]
    fn test_malformed_and_unexpected_shapes_error() {
        assert!(matches!(
            decode_state_body("{not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_state_body("[1,2]"),
            Err(DecodeError::UnexpectedShape(_))
        ));
        assert!(matches!(
            decode_state_body(r#"{"status":"thinking"}"#),
            Err(DecodeError::UnexpectedShape(_))
        ));
    }
}
