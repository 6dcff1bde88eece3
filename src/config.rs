//! # Player Options
//!
//! Plain settings recognized when loading a player. Collaborator objects (renderer,
//! converter, output, shared clock) are passed to [`crate::PlayerBuilder`] instead.
//!
//! Options can be read from YAML:
//!
//! ```rust
//! use score_sync::PlayerOptions;
//!
//! let options = PlayerOptions::from_yaml(r#"
//! container: sheet
//! title: Etude No. 3
//! unroll: true
//! lookahead-ms: 40
//! "#)?;
//!
//! assert_eq!(options.container.as_deref(), Some("sheet"));
//! assert!(options.unroll);
//! assert!(!options.mute);
//! assert_eq!(options.resize_debounce_ms, 100.0);
//! # Ok::<(), score_sync::PlayerError>(())
//! ```

use serde::Deserialize;

use crate::error::PlayerError;
use crate::timemap::DEFAULT_EPSILON_MS;

pub const DEFAULT_LOOKAHEAD_MS: f64 = 25.0;
pub const DEFAULT_RESIZE_DEBOUNCE_MS: f64 = 100.0;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PlayerOptions {
    /// Where the renderer draws. Required.
    pub container: Option<String>,
    /// Overrides the title found in the document.
    pub title: Option<String>,
    /// Play repeats out linearly before rendering.
    pub unroll: bool,
    /// Start muted.
    pub mute: bool,
    /// How far ahead of the playhead output events are scheduled.
    pub lookahead_ms: f64,
    pub resize_debounce_ms: f64,
    /// Tolerance when comparing timemap timestamps.
    pub epsilon_ms: f64,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            container: None,
            title: None,
            unroll: false,
            mute: false,
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            resize_debounce_ms: DEFAULT_RESIZE_DEBOUNCE_MS,
            epsilon_ms: DEFAULT_EPSILON_MS,
        }
    }
}

impl PlayerOptions {
    pub fn from_yaml(content: &str) -> Result<Self, PlayerError> {
        serde_yaml::from_str(content).map_err(|e| PlayerError::Config(e.to_string()))
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_unroll(mut self, unroll: bool) -> Self {
        self.unroll = unroll;
        self
    }

    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    pub fn with_lookahead(mut self, lookahead_ms: f64) -> Self {
        self.lookahead_ms = lookahead_ms;
        self
    }
}
