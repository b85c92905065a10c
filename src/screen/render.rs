use super::AppState;
use crate::content::{resolve_asset_url, EventDetails, FinalOutput, PendingPrompt};
use crate::playback::PlaybackState;
use reqwest::Url;
use serde::Serialize;
use std::fmt;

const MAP_EMBED_BASE: &str = "https://maps.google.com/maps";
const DEFAULT_MAP_QUERY: &str = "37.7749,-122.4194";
const MAP_ZOOM: &str = "14";

/// Read-only snapshot the renderer needs besides the state itself
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub prompt: Option<&'a PendingPrompt>,
    pub final_output: Option<&'a FinalOutput>,
    pub recording: bool,
    pub voice_enabled: bool,
    pub playback: PlaybackState,
    pub asset_root: &'a str,
    pub start_error: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CellOrder {
    MediaFirst,
    TextFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "camelCase")]
pub enum StoryMedia {
    Video(String),
    Image(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StoryCell {
    Media(StoryMedia),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub step: usize,
    pub total_frames: usize,
    pub cells: [StoryCell; 2],
    /// Narration clip for this step; the audio control is hidden when None
    pub audio_url: Option<String>,
    pub playback: PlaybackState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesView {
    pub name: String,
    pub description: String,
    pub address: String,
    pub estimated_cost: String,
    pub justification: String,
    pub url: String,
    pub booking_url: String,
    pub plan_for_evening: String,
    pub map_embed_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum ScreenView {
    Welcome {
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Prompt {
        /// No prompt has arrived yet; show the loading indicator
        loading: bool,
        text: Option<String>,
        recording: bool,
        voice_enabled: bool,
    },
    Story(StoryView),
    Activities(ActivitiesView),
    Lesson {
        text: String,
    },
    ArtProject {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Menu {
        hero_image: Option<String>,
    },
}

/// Even story length swaps the cells so the text comes first.
///
/// Length counts UTF-16 code units, matching how the browser measured it.
pub fn story_cell_order(story: &str) -> CellOrder {
    if story.encode_utf16().count() % 2 == 0 {
        CellOrder::TextFirst
    } else {
        CellOrder::MediaFirst
    }
}

/// Map embed for the event address, or the default coordinates when there is none.
pub fn map_embed_url(address: Option<&str>) -> String {
    let query = address
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_MAP_QUERY);
    match Url::parse_with_params(
        MAP_EMBED_BASE,
        &[("q", query), ("z", MAP_ZOOM), ("output", "embed")],
    ) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::warn!("Could not build map URL: {}", e);
            MAP_EMBED_BASE.to_string()
        }
    }
}

pub fn render(state: AppState, ctx: &RenderContext<'_>) -> ScreenView {
    match state {
        AppState::Welcome => ScreenView::Welcome {
            error: ctx.start_error.map(str::to_string),
        },
        AppState::Prompt => ScreenView::Prompt {
            loading: ctx.prompt.is_none(),
            text: ctx.prompt.map(|p| p.text.clone()),
            recording: ctx.recording,
            voice_enabled: ctx.voice_enabled,
        },
        AppState::Story { step } => ScreenView::Story(render_story(step, ctx)),
        AppState::Activities => ScreenView::Activities(render_activities(ctx)),
        AppState::Lesson => ScreenView::Lesson {
            text: ctx.final_output.map(|o| o.lesson.clone()).unwrap_or_default(),
        },
        AppState::ArtProject => ScreenView::ArtProject {
            text: ctx
                .final_output
                .map(|o| o.art_project.clone())
                .unwrap_or_default(),
        },
        AppState::Menu => ScreenView::Menu {
            hero_image: ctx.final_output.and_then(|o| {
                o.story_image_paths
                    .iter()
                    .chain(o.storyboard.images.iter())
                    .find_map(|p| resolve_asset_url(ctx.asset_root, p))
            }),
        },
    }
}

fn render_story(step: usize, ctx: &RenderContext<'_>) -> StoryView {
    let empty = FinalOutput::default();
    let output = ctx.final_output.unwrap_or(&empty);
    let frames = output.frames();
    let frame = frames.get(step);
    let media = output.media();
    let resolve = |path: Option<&String>| path.and_then(|p| resolve_asset_url(ctx.asset_root, p));

    let text = match frame {
        Some(frame) if !frame.narration.trim().is_empty() => frame.narration.clone(),
        _ => output.story.clone(),
    };

    let story_media = if let Some(url) = resolve(media.video.get(step)) {
        StoryMedia::Video(url)
    } else if let Some(url) = resolve(frame.and_then(|f| f.image.as_ref()))
        .or_else(|| resolve(media.images.get(step)))
        .or_else(|| resolve(media.images.first()))
    {
        StoryMedia::Image(url)
    } else {
        StoryMedia::Empty
    };

    let cells = match story_cell_order(&output.story) {
        CellOrder::MediaFirst => [StoryCell::Media(story_media), StoryCell::Text(text)],
        CellOrder::TextFirst => [StoryCell::Text(text), StoryCell::Media(story_media)],
    };

    StoryView {
        step,
        total_frames: frames.len(),
        cells,
        audio_url: resolve(media.audio.get(step)),
        playback: ctx.playback,
    }
}

fn render_activities(ctx: &RenderContext<'_>) -> ActivitiesView {
    let fallback = EventDetails::default();
    let event = ctx
        .final_output
        .and_then(|o| o.event.as_ref())
        .unwrap_or(&fallback);
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    ActivitiesView {
        name: text(&event.name),
        description: text(&event.description),
        address: text(&event.address),
        estimated_cost: text(&event.estimated_cost),
        justification: text(&event.justification),
        url: text(&event.url),
        booking_url: text(&event.url_to_book_tickets),
        plan_for_evening: ctx
            .final_output
            .map(|o| o.plan_for_evening.clone())
            .unwrap_or_default(),
        map_embed_url: map_embed_url(event.address.as_deref()),
    }
}

impl fmt::Display for ScreenView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenView::Welcome { error } => {
                writeln!(f, "[welcome] type `start` to begin")?;
                if let Some(error) = error {
                    writeln!(f, "could not start: {}", error)?;
                }
                Ok(())
            }
            ScreenView::Prompt {
                loading,
                text,
                recording,
                voice_enabled,
            } => {
                match (loading, text) {
                    (false, Some(text)) => writeln!(f, "[prompt] {}", text)?,
                    _ => writeln!(f, "[prompt] ...")?,
                }
                if !voice_enabled {
                    writeln!(f, "(voice input unavailable)")
                } else if *recording {
                    writeln!(f, "(recording, type `stop` to send)")
                } else {
                    writeln!(f, "(type `record` to answer)")
                }
            }
            ScreenView::Story(story) => {
                writeln!(f, "[story {}/{}]", story.step + 1, story.total_frames.max(1))?;
                for cell in &story.cells {
                    match cell {
                        StoryCell::Text(text) => writeln!(f, "  {}", text)?,
                        StoryCell::Media(StoryMedia::Video(url)) => writeln!(f, "  video: {}", url)?,
                        StoryCell::Media(StoryMedia::Image(url)) => writeln!(f, "  image: {}", url)?,
                        StoryCell::Media(StoryMedia::Empty) => writeln!(f, "  (no media)")?,
                    }
                }
                if let Some(url) = &story.audio_url {
                    writeln!(f, "  audio: {} ({:?})", url, story.playback)?;
                }
                Ok(())
            }
            ScreenView::Activities(view) => {
                writeln!(f, "[activities] {}", view.name)?;
                for (label, value) in [
                    ("description", &view.description),
                    ("address", &view.address),
                    ("cost", &view.estimated_cost),
                    ("why", &view.justification),
                    ("link", &view.url),
                    ("tickets", &view.booking_url),
                    ("plan", &view.plan_for_evening),
                ] {
                    if !value.is_empty() {
                        writeln!(f, "  {}: {}", label, value)?;
                    }
                }
                writeln!(f, "  map: {}", view.map_embed_url)
            }
            ScreenView::Lesson { text } => writeln!(f, "[lesson] {}", text),
            ScreenView::ArtProject { text } => writeln!(f, "[art project] {}", text),
            ScreenView::Menu { hero_image } => {
                if let Some(url) = hero_image {
                    writeln!(f, "[menu] {}", url)?;
                } else {
                    writeln!(f, "[menu]")?;
                }
                writeln!(f, "  story | activities | lesson | art | regenerate | complete")
            }
        }
    }
}
