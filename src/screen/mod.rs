pub mod render;

pub use render::{
    map_embed_url, render, story_cell_order, ActivitiesView, CellOrder, RenderContext,
    ScreenView, StoryCell, StoryMedia, StoryView,
};

use serde::Serialize;

/// Which screen is visible. Exactly one is active; the machine has no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AppState {
    #[default]
    Welcome,
    Prompt,
    Story { step: usize },
    Activities,
    Lesson,
    ArtProject,
    Menu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    /// Session established from the welcome screen
    Start,
    /// A final output arrived while prompting
    FinalReady,
    Story,
    Activities,
    Lesson,
    ArtProject,
    Next,
    /// Advance to the next storyboard frame, or back to the menu after the last one
    NextFrame,
    Regenerate,
    Complete,
}

impl AppState {
    /// The state `event` leads to, or None if this state does not accept it.
    pub fn transition(self, event: ScreenEvent, story_frames: usize) -> Option<AppState> {
        use AppState as S;
        use ScreenEvent as E;

        match (self, event) {
            (S::Welcome, E::Start) => Some(S::Prompt),
            (S::Prompt, E::FinalReady) => Some(S::Menu),
            (S::Menu, E::Story) => Some(S::Story { step: 0 }),
            (S::Menu, E::Activities) => Some(S::Activities),
            (S::Menu, E::Lesson) => Some(S::Lesson),
            (S::Menu, E::ArtProject) => Some(S::ArtProject),
            (S::Menu, E::Regenerate) => Some(S::Prompt),
            (S::Menu, E::Complete) => Some(S::Menu),
            (S::Story { step }, E::NextFrame) if step + 1 < story_frames => {
                Some(S::Story { step: step + 1 })
            }
            (S::Story { .. }, E::NextFrame) => Some(S::Menu),
            (S::Story { .. } | S::Activities | S::Lesson | S::ArtProject, E::Next) => {
                Some(S::Menu)
            }
            _ => None,
        }
    }

    pub fn is_prompt(self) -> bool {
        self == AppState::Prompt
    }
}
