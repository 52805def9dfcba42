//! Document and field path validation
//!
//! Document paths are `collection/document` pairs (e.g. `sessions/battle-1`).
//! Field paths are dot-addressed keys inside a document
//! (e.g. `tokens.goblin-1.hp`):
//! - Segments separated by `.` (field paths) or `/` (document paths)
//! - Each segment: `[A-Za-z0-9_-]+`
//! - Max 255 characters total

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Collection holding one document per combat session
pub const SESSIONS: &str = "sessions";

/// Collection holding one document per party character
pub const CHARACTERS: &str = "characters";

/// Validation errors for document and field paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathValidationError {
    /// Path is empty
    Empty,
    /// Path is too long (> 255 chars)
    TooLong,
    /// Path contains an empty segment (e.g. `tokens..hp`)
    EmptySegment,
    /// Segment contains invalid characters
    InvalidSegment(String),
    /// Document path is not exactly `collection/document`
    NotADocument(String),
}

impl fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValidationError::Empty => write!(f, "path cannot be empty"),
            PathValidationError::TooLong => write!(f, "path must be 255 characters or less"),
            PathValidationError::EmptySegment => write!(f, "path cannot contain empty segments"),
            PathValidationError::InvalidSegment(seg) => write!(
                f,
                "segment '{}' contains invalid characters (allowed: letters, digits, '_', '-')",
                seg
            ),
            PathValidationError::NotADocument(path) => {
                write!(f, "'{}' is not a collection/document path", path)
            }
        }
    }
}

impl std::error::Error for PathValidationError {}

static SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("segment pattern is valid"));

fn validate_segments<'a>(
    path: &'a str,
    separator: char,
) -> Result<Vec<&'a str>, PathValidationError> {
    if path.is_empty() {
        return Err(PathValidationError::Empty);
    }
    if path.len() > 255 {
        return Err(PathValidationError::TooLong);
    }

    let segments: Vec<&str> = path.split(separator).collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(PathValidationError::EmptySegment);
        }
        if !SEGMENT_REGEX.is_match(segment) {
            return Err(PathValidationError::InvalidSegment(segment.to_string()));
        }
    }
    Ok(segments)
}

/// Validate a dot-addressed field path, returning its segments.
///
/// # Examples
/// ```
/// use combatd::store::validate_field_path;
///
/// assert!(validate_field_path("combatState.round").is_ok());
/// assert!(validate_field_path("tokens.goblin-1.hp").is_ok());
///
/// assert!(validate_field_path("tokens..hp").is_err());
/// assert!(validate_field_path("tokens.goblin 1").is_err());
/// ```
pub fn validate_field_path(path: &str) -> Result<Vec<&str>, PathValidationError> {
    validate_segments(path, '.')
}

/// Path of a single document in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    /// Parse and validate a `collection/document` path
    pub fn parse(path: &str) -> Result<Self, PathValidationError> {
        let segments = validate_segments(path, '/')?;
        if segments.len() != 2 {
            return Err(PathValidationError::NotADocument(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    /// Path of a session document
    pub fn session(session_id: &str) -> Result<Self, PathValidationError> {
        Self::parse(&format!("{}/{}", SESSIONS, session_id))
    }

    /// Path of a character resource record
    pub fn character(character_id: &str) -> Result<Self, PathValidationError> {
        Self::parse(&format!("{}/{}", CHARACTERS, character_id))
    }

    /// The collection segment
    pub fn collection(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// The document id segment
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocPath {
    type Error = PathValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.0
    }
}
