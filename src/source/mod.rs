/// Tracking of already-folded artifacts and discovery of new ones
pub mod cursor;

/// Parsing of artifacts into log events
pub mod reader;

pub use cursor::FileCursor;
pub use reader::{parse_artifact, parse_payload};
