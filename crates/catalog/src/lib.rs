pub mod po;

use chrono::{DateTime, Utc};
use core_types::SENTINEL_TEXT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub use po::FormatError;

const HEADER_PROJECT: &str = "Project-Id-Version";
const HEADER_CONTACT: &str = "Report-Msgid-Bugs-To";
const HEADER_LANGUAGE: &str = "Language";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Location of a unit's catalog file: `<text folder>/<unit name>.po` (or `.pot`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPath(PathBuf);

impl CatalogPath {
    pub fn new<P: AsRef<Path>>(text_folder: P, unit_name: &str, templates: bool) -> Self {
        let extension = if templates { "pot" } else { "po" };
        Self(text_folder.as_ref().join(format!("{unit_name}.{extension}")))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

/// Ordered `Key: Value` metadata of the catalog header entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHeader {
    fields: Vec<(String, String)>,
}

impl CatalogHeader {
    pub fn new(project: &str, contact: &str, language: &str) -> Self {
        Self::with_creation_date(project, contact, language, Utc::now())
    }

    pub fn with_creation_date(
        project: &str,
        contact: &str,
        language: &str,
        created: DateTime<Utc>,
    ) -> Self {
        let mut header = Self::default();
        header.set(HEADER_PROJECT, project);
        header.set(HEADER_CONTACT, contact);
        header.set(
            "POT-Creation-Date",
            &created.format("%Y-%m-%d %H:%M%z").to_string(),
        );
        header.set(HEADER_LANGUAGE, language);
        header.set("MIME-Version", "1.0");
        header.set("Content-Type", "text/plain; charset=UTF-8");
        header.set("Content-Transfer-Encoding", "8bit");
        header
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value in place when the key exists, otherwise appends it.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.fields.push((key.to_string(), value.to_string())),
        }
    }

    pub fn project(&self) -> Option<&str> {
        self.get(HEADER_PROJECT)
    }

    pub fn contact(&self) -> Option<&str> {
        self.get(HEADER_CONTACT)
    }

    pub fn language(&self) -> Option<&str> {
        self.get(HEADER_LANGUAGE)
    }
}

/// One catalog entry. `source` holds the text typed for the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub context: String,
    pub source: String,
    /// `msgstr`; stays empty in templates.
    pub translation: String,
    /// Raw `#` lines preceding the entry.
    pub comments: Vec<String>,
}

impl Segment {
    pub fn untranslated(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: SENTINEL_TEXT.to_string(),
            translation: String::new(),
            comments: Vec::new(),
        }
    }

    pub fn is_translated(&self) -> bool {
        core_types::is_translated(&self.source)
    }
}

/// In-memory PO catalog. Entries keep insertion order; no deduplication happens here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub header: CatalogHeader,
    segments: Vec<Segment>,
}

impl Catalog {
    pub fn new(header: CatalogHeader) -> Self {
        Self {
            header,
            segments: Vec::new(),
        }
    }

    /// Read and decode a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = po::decode(&bytes).map_err(|source| CatalogError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    /// Load the catalog at `path` if the file exists, otherwise start an empty one.
    pub fn load_or_new(path: impl AsRef<Path>, header: CatalogHeader) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "catalog file missing, starting empty");
            Ok(Self::new(header))
        }
    }

    /// Rewrite the whole file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, po::encode(self)).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.len(), "saved catalog");
        Ok(())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn find(&self, context: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.context == context)
    }

    pub fn find_mut(&mut self, context: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.context == context)
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn header() -> CatalogHeader {
        let created = Utc.with_ymd_and_hms(2022, 5, 1, 12, 30, 0).unwrap();
        CatalogHeader::with_creation_date("Demo", "team@example.com", "es", created)
    }

    #[test]
    fn catalog_path_uses_template_extension() {
        let po = CatalogPath::new("/text", "ui", false);
        let pot = CatalogPath::new("/text", "ui", true);
        assert_eq!(po.as_path(), Path::new("/text/ui.po"));
        assert_eq!(pot.into_path(), PathBuf::from("/text/ui.pot"));
    }

    #[test]
    fn header_set_replaces_in_place() {
        let mut header = header();
        header.set(HEADER_LANGUAGE, "fr");
        assert_eq!(header.language(), Some("fr"));
        assert_eq!(header.fields()[3].0, HEADER_LANGUAGE);
        assert_eq!(header.get("POT-Creation-Date"), Some("2022-05-01 12:30+0000"));
    }

    #[test]
    fn save_then_load_keeps_header_and_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ui.po");

        let mut catalog = Catalog::new(header());
        catalog.push(Segment::untranslated("image=b.png"));
        let mut first = Segment::untranslated("image=a.png");
        first.source = "Hello\tworld".into();
        catalog.push(first);
        catalog.save(&path).expect("save");

        let loaded = Catalog::load(&path).expect("load");
        assert_eq!(loaded, catalog);
        assert_eq!(loaded.segments()[0].context, "image=b.png");
        assert!(!loaded.segments()[0].is_translated());
        assert!(loaded.find("image=a.png").unwrap().is_translated());
    }

    #[test]
    fn load_or_new_starts_empty_without_file() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load_or_new(dir.path().join("missing.po"), header()).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.header.project(), Some("Demo"));
    }

    #[test]
    fn load_reports_format_errors_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.po");
        fs::write(&path, "msgid \"x\nmsgstr \"\"\n").unwrap();

        let err = Catalog::load(&path).unwrap_err();
        match err {
            CatalogError::Format { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.line, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
