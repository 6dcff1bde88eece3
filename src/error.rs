//! # Error Types
//!
//! This module defines the error type shared by every part of the player.
//!
//! ## Error Kinds
//! - `InitializationFailure` - loading could not complete (missing container, conversion failure)
//! - `EmptyTimemap` - the converter produced no measure boundaries
//! - `UninitializedAccess` - state was read from a player that is not (or no longer) loaded
//! - `Document` - the score document is not a readable MusicXML file
//! - `Unroll` - repeat unrolling failed; recovered locally by `load`
//! - `Config` - invalid YAML options
//!
//! ## Usage
//! ```rust
//! use score_sync::{PlayerError, TimemapIndex};
//!
//! match TimemapIndex::build(&[]) {
//!     Err(PlayerError::EmptyTimemap) => {}
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// Loading failed and no player was created.
    ///
    /// # Example
    /// ```
    /// # use score_sync::PlayerError;
    /// let err = PlayerError::InitializationFailure("no container given".to_string());
    /// assert_eq!(err.to_string(), "Initialization failed: no container given");
    /// ```
    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    /// The raw timemap had no entries.
    #[error("Timemap is empty: at least one measure boundary is required")]
    EmptyTimemap,

    /// State was read before loading completed or after teardown.
    ///
    /// # Example
    /// ```
    /// # use score_sync::PlayerError;
    /// let err = PlayerError::UninitializedAccess("position");
    /// assert_eq!(err.to_string(), "Cannot read position: player is not initialized");
    /// ```
    #[error("Cannot read {0}: player is not initialized")]
    UninitializedAccess(&'static str),

    /// The score document could not be read.
    #[error("Invalid document: {0}")]
    Document(String),

    /// Repeat unrolling failed.
    #[error("Unroll failed: {0}")]
    Unroll(String),

    /// Player options could not be parsed.
    #[error("Invalid options: {0}")]
    Config(String),
}

impl From<quick_xml::Error> for PlayerError {
    fn from(err: quick_xml::Error) -> Self {
        PlayerError::Document(err.to_string())
    }
}
