use std::path::{Path, PathBuf};

use catalog::{Catalog, CatalogHeader, CatalogPath};
use core_types::UnitId;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use project_settings::ProjectSettings;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{EngineError, Result};

/// An image file assigned to a unit at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLeaf {
    /// `/`-separated path relative to the project image folder.
    pub path: String,
    pub unit: UnitId,
}

#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub id: UnitId,
    pub name: String,
    pub component: String,
    /// Literal directory prefix of the unit's pattern.
    pub root: String,
    pub catalog_path: PathBuf,
    pub catalog: Catalog,
    pub images: Vec<ImageLeaf>,
}

impl TranslationUnit {
    /// Image path with the unit root and its separator removed.
    pub fn relative_path<'a>(&self, image: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            return Some(image);
        }
        image
            .strip_prefix(self.root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }

    /// Inverse of [`TranslationUnit::relative_path`].
    pub fn image_path(&self, relative: &str) -> String {
        if self.root.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.root)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectTree {
    pub image_folder: PathBuf,
    pub text_folder: PathBuf,
    pub units: Vec<TranslationUnit>,
    /// Images no unit pattern matched.
    pub unassigned: Vec<String>,
}

impl ProjectTree {
    pub fn unit(&self, id: UnitId) -> Option<&TranslationUnit> {
        self.units.get(id.0)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut TranslationUnit> {
        self.units.get_mut(id.0)
    }
}

/// Discover images, group them by unit pattern and load or create each unit's catalog.
///
/// Any unreadable or malformed catalog aborts the whole build.
pub fn build_tree(settings: &ProjectSettings) -> Result<ProjectTree> {
    ensure_dir(&settings.image_folder, "imageFolder")?;
    ensure_dir(&settings.text_folder, "textFolder")?;

    let matcher = compile_patterns(settings)?;

    let mut units = Vec::with_capacity(settings.units.len());
    for (idx, unit) in settings.units.iter().enumerate() {
        let catalog_path = CatalogPath::new(
            &settings.text_folder,
            &unit.name,
            settings.generate_po_templates,
        )
        .into_path();
        let header = CatalogHeader::new(
            &settings.name,
            &settings.contact_address,
            &settings.language,
        );
        let catalog = Catalog::load_or_new(&catalog_path, header)?;

        units.push(TranslationUnit {
            id: UnitId(idx),
            name: unit.name.clone(),
            component: unit.component_slug().to_string(),
            root: unit.root(),
            catalog_path,
            catalog,
            images: Vec::new(),
        });
    }

    let mut unassigned = Vec::new();
    for image in discover_files(&settings.image_folder) {
        // First declared unit wins when patterns overlap.
        match matcher.matches(image.as_str()).first() {
            Some(&idx) => units[idx].images.push(ImageLeaf {
                path: image,
                unit: UnitId(idx),
            }),
            None => unassigned.push(image),
        }
    }

    for unit in &units {
        info!(
            unit = %unit.name,
            images = unit.images.len(),
            segments = unit.catalog.len(),
            "built translation unit"
        );
    }
    if !unassigned.is_empty() {
        warn!(count = unassigned.len(), "images outside every unit pattern");
    }

    Ok(ProjectTree {
        image_folder: settings.image_folder.clone(),
        text_folder: settings.text_folder.clone(),
        units,
        unassigned,
    })
}

fn ensure_dir(path: &Path, key: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "{key} {} does not exist or is not a directory",
            path.display()
        )))
    }
}

fn compile_patterns(settings: &ProjectSettings) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for unit in &settings.units {
        let glob = GlobBuilder::new(&unit.image_glob_pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| {
                EngineError::Configuration(format!(
                    "unit `{}` has an invalid image pattern: {err}",
                    unit.name
                ))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| EngineError::Configuration(format!("invalid image patterns: {err}")))
}

/// Files under `root`, as sorted `/`-separated relative paths.
fn discover_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry in image folder");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let parts: Option<Vec<&str>> = relative.iter().map(|part| part.to_str()).collect();
        match parts {
            Some(parts) => files.push(parts.join("/")),
            None => warn!(path = %entry.path().display(), "skipping image with a non UTF-8 name"),
        }
    }
    files
}
