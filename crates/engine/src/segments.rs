use std::collections::HashMap;

use catalog::Segment;
use core_types::{context_for, UnitId, SENTINEL_TEXT};
use tracing::{debug, info, warn};

use crate::tree::{ProjectTree, TranslationUnit};
use crate::{EngineError, Result};

/// Per-image listing entry used by frontends to draw the image tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStatus {
    pub path: String,
    pub unit: UnitId,
    pub translated: bool,
}

/// Owns the open catalogs of a project and keeps one segment per image.
///
/// Every mutation rewrites the owning catalog file before returning.
pub struct SegmentManager {
    tree: ProjectTree,
    owners: HashMap<String, UnitId>,
}

impl SegmentManager {
    pub fn new(tree: ProjectTree) -> Self {
        let owners = tree
            .units
            .iter()
            .flat_map(|unit| unit.images.iter())
            .map(|leaf| (leaf.path.clone(), leaf.unit))
            .collect();
        Self { tree, owners }
    }

    pub fn tree(&self) -> &ProjectTree {
        &self.tree
    }

    pub fn units(&self) -> &[TranslationUnit] {
        &self.tree.units
    }

    pub fn find_owning_unit(&self, image: &str) -> Result<UnitId> {
        self.owners
            .get(image)
            .copied()
            .ok_or_else(|| EngineError::NotFound {
                image: image.to_string(),
            })
    }

    pub fn is_valid_image(&self, image: &str) -> bool {
        self.owners.contains_key(image)
    }

    /// Path of `image` below the root of `unit`.
    pub fn relative_path(&self, unit: UnitId, image: &str) -> Result<String> {
        self.unit(unit)?
            .relative_path(image)
            .map(str::to_string)
            .ok_or_else(|| EngineError::NotFound {
                image: image.to_string(),
            })
    }

    pub fn has_translation(&self, image: &str) -> bool {
        let Ok((unit, context)) = self.locate(image) else {
            return false;
        };
        self.tree.units[unit.0]
            .catalog
            .find(&context)
            .is_some_and(Segment::is_translated)
    }

    /// Segment for `image`, appended with the sentinel text and persisted if it does not exist yet.
    pub fn get_or_create_segment(&mut self, image: &str) -> Result<Segment> {
        let (unit, context) = self.locate(image)?;
        let unit = &mut self.tree.units[unit.0];
        if let Some(segment) = unit.catalog.find(&context) {
            return Ok(segment.clone());
        }

        let segment = Segment::untranslated(context);
        unit.catalog.push(segment.clone());
        if let Err(err) = unit.catalog.save(&unit.catalog_path) {
            unit.catalog.pop();
            return Err(err.into());
        }
        debug!(unit = %unit.name, context = %segment.context, "created segment");
        Ok(segment)
    }

    /// Set the text typed for `image`. Empty text puts the sentinel back.
    pub fn set_text(&mut self, image: &str, text: &str) -> Result<Segment> {
        self.get_or_create_segment(image)?;
        let (unit, context) = self.locate(image)?;
        let unit = &mut self.tree.units[unit.0];
        let new_text = if text.is_empty() { SENTINEL_TEXT } else { text };

        let Some(segment) = unit.catalog.find_mut(&context) else {
            return Err(EngineError::NotFound {
                image: image.to_string(),
            });
        };
        let previous = std::mem::replace(&mut segment.source, new_text.to_string());
        let updated = segment.clone();

        if let Err(err) = unit.catalog.save(&unit.catalog_path) {
            if let Some(segment) = unit.catalog.find_mut(&context) {
                segment.source = previous;
            }
            return Err(err.into());
        }
        debug!(unit = %unit.name, context = %context, "updated segment text");
        Ok(updated)
    }

    /// Every assigned image, ordered by unit and then by path.
    pub fn images(&self) -> Vec<ImageStatus> {
        self.tree
            .units
            .iter()
            .flat_map(|unit| {
                unit.images.iter().map(move |leaf| ImageStatus {
                    path: leaf.path.clone(),
                    unit: leaf.unit,
                    translated: unit
                        .relative_path(&leaf.path)
                        .and_then(|relative| unit.catalog.find(&context_for(relative)))
                        .is_some_and(Segment::is_translated),
                })
            })
            .collect()
    }

    /// The image listed after `current` in the same unit, if any.
    pub fn next_image(&self, current: &str) -> Result<Option<String>> {
        let unit = self.unit(self.find_owning_unit(current)?)?;
        let next = unit
            .images
            .iter()
            .skip_while(|leaf| leaf.path != current)
            .nth(1)
            .map(|leaf| leaf.path.clone());
        Ok(next)
    }

    /// Rewrite every catalog that has entries or already exists on disk.
    pub fn flush(&self) -> Result<()> {
        for unit in &self.tree.units {
            if unit.catalog.is_empty() && !unit.catalog_path.exists() {
                continue;
            }
            unit.catalog.save(&unit.catalog_path)?;
        }
        info!(units = self.tree.units.len(), "flushed catalogs");
        Ok(())
    }

    pub fn into_tree(self) -> ProjectTree {
        self.tree
    }

    fn unit(&self, id: UnitId) -> Result<&TranslationUnit> {
        self.tree
            .unit(id)
            .ok_or_else(|| EngineError::Configuration(format!("unknown unit {id}")))
    }

    fn locate(&self, image: &str) -> Result<(UnitId, String)> {
        let unit = self.find_owning_unit(image)?;
        match self.relative_path(unit, image) {
            Ok(relative) => Ok((unit, context_for(&relative))),
            Err(err) => {
                warn!(image, unit = %unit, "image lies outside its unit root");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_tree;
    use crate::test_support::ui_project;
    use catalog::Catalog;
    use std::fs;
    use tempfile::tempdir;

    fn manager(root: &std::path::Path, images: &[&str]) -> SegmentManager {
        let settings = ui_project(root, images);
        SegmentManager::new(build_tree(&settings).unwrap())
    }

    #[test]
    fn set_text_writes_exactly_one_entry() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/a.png", "screens/b.png"]);

        segments.set_text("screens/a.png", "Hello").unwrap();

        let on_disk = Catalog::load(dir.path().join("texts").join("ui.po")).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.segments()[0].context, "image=a.png");
        assert_eq!(on_disk.segments()[0].source, "Hello");
        assert!(segments.has_translation("screens/a.png"));
        assert!(!segments.has_translation("screens/b.png"));

        let text = fs::read_to_string(dir.path().join("texts").join("ui.po")).unwrap();
        assert!(text.contains("msgctxt \"image=a.png\"\nmsgid \"Hello\""));
    }

    #[test]
    fn get_or_create_is_idempotent_and_persists_immediately() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/sub/a.png"]);

        let first = segments.get_or_create_segment("screens/sub/a.png").unwrap();
        let second = segments.get_or_create_segment("screens/sub/a.png").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.context, "image=sub/a.png");
        assert_eq!(first.source, SENTINEL_TEXT);

        let on_disk = Catalog::load(dir.path().join("texts").join("ui.po")).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert!(!segments.has_translation("screens/sub/a.png"));
    }

    #[test]
    fn empty_text_reverts_to_sentinel_without_removing_the_entry() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/a.png"]);

        segments.set_text("screens/a.png", "hello").unwrap();
        assert!(segments.has_translation("screens/a.png"));
        let segment = segments.set_text("screens/a.png", "").unwrap();
        assert_eq!(segment.source, SENTINEL_TEXT);
        assert!(!segments.has_translation("screens/a.png"));

        let on_disk = Catalog::load(dir.path().join("texts").join("ui.po")).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.segments()[0].source, SENTINEL_TEXT);
    }

    #[test]
    fn repeated_edits_keep_a_single_segment() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/a.png"]);
        for text in ["H", "He", "Hel", "Hell", "Hello"] {
            segments.set_text("screens/a.png", text).unwrap();
        }
        let on_disk = Catalog::load(dir.path().join("texts").join("ui.po")).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.segments()[0].source, "Hello");
    }

    #[test]
    fn images_outside_every_unit_are_not_found() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/a.png", "other/x.png"]);

        assert_eq!(segments.find_owning_unit("screens/a.png").unwrap(), UnitId(0));
        assert!(matches!(
            segments.find_owning_unit("other/x.png"),
            Err(EngineError::NotFound { image }) if image == "other/x.png"
        ));
        assert!(matches!(
            segments.set_text("other/x.png", "x"),
            Err(EngineError::NotFound { .. })
        ));
        assert!(!segments.has_translation("other/x.png"));
        assert!(!segments.is_valid_image("other/x.png"));
        assert!(segments.is_valid_image("screens/a.png"));
    }

    #[test]
    fn existing_catalog_entries_are_reused() {
        let dir = tempdir().unwrap();
        let settings = ui_project(dir.path(), &["screens/a.png"]);
        fs::write(
            dir.path().join("texts").join("ui.po"),
            "msgid \"\"\nmsgstr \"\"\n\"Language: en\\n\"\n\n# keep me\nmsgctxt \"image=a.png\"\nmsgid \"Bonjour\"\nmsgstr \"\"\n",
        )
        .unwrap();
        let mut segments = SegmentManager::new(build_tree(&settings).unwrap());

        assert!(segments.has_translation("screens/a.png"));
        let segment = segments.get_or_create_segment("screens/a.png").unwrap();
        assert_eq!(segment.source, "Bonjour");
        assert_eq!(segment.comments, vec!["# keep me".to_string()]);
    }

    #[test]
    fn images_report_status_and_next_walks_the_unit() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/a.png", "screens/b.png", "screens/c.png"]);
        segments.set_text("screens/b.png", "Hi").unwrap();

        let listing = segments.images();
        let flags: Vec<_> = listing.iter().map(|s| (s.path.as_str(), s.translated)).collect();
        assert_eq!(
            flags,
            vec![
                ("screens/a.png", false),
                ("screens/b.png", true),
                ("screens/c.png", false)
            ]
        );

        assert_eq!(
            segments.next_image("screens/a.png").unwrap().as_deref(),
            Some("screens/b.png")
        );
        assert_eq!(segments.next_image("screens/c.png").unwrap(), None);
    }

    #[test]
    fn failed_save_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let mut segments = manager(dir.path(), &["screens/a.png"]);
        segments.set_text("screens/a.png", "Hello").unwrap();

        fs::remove_dir_all(dir.path().join("texts")).unwrap();
        assert!(matches!(
            segments.set_text("screens/a.png", "Changed"),
            Err(EngineError::Storage(_))
        ));
        let segment = segments.get_or_create_segment("screens/a.png").unwrap();
        assert_eq!(segment.source, "Hello");
    }

    #[test]
    fn flush_skips_untouched_units() {
        let dir = tempdir().unwrap();
        let segments = manager(dir.path(), &["screens/a.png"]);
        segments.flush().unwrap();
        assert!(!dir.path().join("texts").join("ui.po").exists());
    }
}
