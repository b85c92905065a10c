// src/content/mod.rs
// Content Model - decoded server payloads

mod assets;
mod decode;
mod types;

pub use assets::resolve_asset_url;
pub use decode::decode_state_body;
pub use types::{
    DecodeError, EventDetails, FinalOutput, MediaRefs, PendingPrompt, ServerMessage, StoryFrame,
    Storyboard,
};
