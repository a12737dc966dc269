//! Story files: status updates and lookup.

pub mod status;

pub use status::{find_story_file, StoryFileStatus, StoryStatusUpdater};
