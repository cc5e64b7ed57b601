use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder text of a segment that has not been translated yet.
pub const SENTINEL_TEXT: &str = "TODO";

/// Prefix of every segment context; the rest is the image path relative to its unit root.
pub const CONTEXT_PREFIX: &str = "image=";

/// Index of a translation unit in project declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteUnitId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScreenshotId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RemoteUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScreenshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds the segment context for an image path relative to its unit root.
pub fn context_for(relative_path: &str) -> String {
    format!("{CONTEXT_PREFIX}{relative_path}")
}

/// Recovers the unit-relative image path from a segment or remote unit context.
pub fn parse_context(context: &str) -> Option<&str> {
    context
        .strip_prefix(CONTEXT_PREFIX)
        .filter(|rest| !rest.is_empty())
}

/// True when a segment text counts as translated.
pub fn is_translated(text: &str) -> bool {
    !text.is_empty() && text != SENTINEL_TEXT
}

/// Remote screenshot name for an image path relative to the image folder.
pub fn screenshot_name(image_path: &str) -> String {
    image_path.replace(['/', '\\'], "_")
}

/// Numeric id at the end of a REST resource URL such as `https://host/api/units/42/`.
pub fn id_from_url(url: &str) -> Option<u64> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_round_trips_relative_path() {
        let ctx = context_for("menu/title.png");
        assert_eq!(ctx, "image=menu/title.png");
        assert_eq!(parse_context(&ctx), Some("menu/title.png"));
        assert_eq!(parse_context("label=foo"), None);
        assert_eq!(parse_context("image="), None);
    }

    #[test]
    fn screenshot_names_flatten_separators() {
        assert_eq!(screenshot_name("screens/a.png"), "screens_a.png");
        assert_eq!(screenshot_name("a\\b\\c.png"), "a_b_c.png");
    }

    #[test]
    fn ids_are_taken_from_the_last_url_segment() {
        assert_eq!(id_from_url("https://hosted.weblate.org/api/units/42/"), Some(42));
        assert_eq!(id_from_url("https://host/api/screenshots/7"), Some(7));
        assert_eq!(id_from_url("https://host/api/screenshots/"), None);
    }

    #[test]
    fn sentinel_and_empty_text_are_untranslated() {
        assert!(!is_translated(""));
        assert!(!is_translated(SENTINEL_TEXT));
        assert!(is_translated("Hello"));
    }
}
