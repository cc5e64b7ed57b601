use core_types::UnitId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Image extensions picked up by units declared through the legacy prefix mapping.
const LEGACY_IMAGE_EXTENSIONS: &str = "png,jpg,jpeg,bmp,gif,tif,tiff";

const GLOB_META: &[char] = &['*', '?', '[', '{'];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project file {} is not valid: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid project file {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// A named group of images sharing one catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSettings {
    pub name: String,
    pub image_glob_pattern: String,
    pub component_slug: Option<String>,
}

impl UnitSettings {
    /// Remote component holding this unit's strings.
    pub fn component_slug(&self) -> &str {
        self.component_slug.as_deref().unwrap_or(&self.name)
    }

    /// Literal directory prefix of the glob pattern. Contexts are relative to it.
    ///
    /// `screens/**/*.png` has root `screens`; `**/*.png` has an empty root.
    pub fn root(&self) -> String {
        let segments: Vec<&str> = self
            .image_glob_pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let Some((_, dirs)) = segments.split_last() else {
            return String::new();
        };
        dirs.iter()
            .take_while(|segment| !segment.contains(GLOB_META))
            .copied()
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub contact_address: String,
    pub language: String,
    pub weblate_url: String,
    pub weblate_project_slug: String,
    pub text_folder: PathBuf,
    pub image_folder: PathBuf,
    pub generate_po_templates: bool,
    pub units: Vec<UnitSettings>,
}

impl ProjectSettings {
    /// Read a project file. Relative folders resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let absolute = std::path::absolute(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = absolute.parent().unwrap_or(Path::new("/"));
        let settings = Self::from_yaml(&text, base, path)?;
        info!(
            project = %settings.name,
            units = settings.units.len(),
            image_folder = %settings.image_folder.display(),
            text_folder = %settings.text_folder.display(),
            "loaded project"
        );
        Ok(settings)
    }

    /// Parse project YAML; `origin` only labels errors.
    pub fn from_yaml(text: &str, base_dir: &Path, origin: &Path) -> Result<Self> {
        let file: ProjectFile = serde_yaml::from_str(text).map_err(|source| SettingsError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
        file.normalize(base_dir)
            .map_err(|message| SettingsError::Invalid {
                path: origin.to_path_buf(),
                message,
            })
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitSettings> {
        self.units.get(id.0)
    }

    pub fn component_slug_of(&self, id: UnitId) -> Option<&str> {
        self.unit(id).map(UnitSettings::component_slug)
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> {
        (0..self.units.len()).map(UnitId)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    contact_address: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    weblate_url: String,
    #[serde(default)]
    weblate_project_slug: String,
    text_folder: PathBuf,
    image_folder: PathBuf,
    #[serde(default)]
    generate_po_templates: bool,
    #[serde(default, alias = "components")]
    units: Option<Vec<UnitEntry>>,
    #[serde(default)]
    text_to_image_folder_mapping: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitEntry {
    #[serde(alias = "poName")]
    name: String,
    #[serde(alias = "pattern")]
    image_glob_pattern: String,
    #[serde(default)]
    weblate_component_slug: Option<String>,
}

impl ProjectFile {
    fn normalize(self, base_dir: &Path) -> std::result::Result<ProjectSettings, String> {
        let units = match (self.units, self.text_to_image_folder_mapping) {
            (Some(_), Some(_)) => {
                return Err(
                    "both `units` and `textToImageFolderMapping` are present; keep only one"
                        .to_string(),
                )
            }
            (None, None) => {
                return Err(
                    "no translation units: expected `units` or `textToImageFolderMapping`"
                        .to_string(),
                )
            }
            (Some(entries), None) => entries
                .into_iter()
                .map(|entry| UnitSettings {
                    name: entry.name,
                    image_glob_pattern: entry.image_glob_pattern,
                    component_slug: entry.weblate_component_slug,
                })
                .collect(),
            (None, Some(mapping)) => {
                debug!("migrating legacy textToImageFolderMapping");
                units_from_legacy_mapping(&mapping)?
            }
        };

        validate_units(&units)?;

        Ok(ProjectSettings {
            name: self.name,
            contact_address: self.contact_address,
            language: self.language,
            weblate_url: self.weblate_url,
            weblate_project_slug: self.weblate_project_slug,
            text_folder: resolve_folder(base_dir, &self.text_folder),
            image_folder: resolve_folder(base_dir, &self.image_folder),
            generate_po_templates: self.generate_po_templates,
            units,
        })
    }
}

fn units_from_legacy_mapping(
    mapping: &serde_yaml::Mapping,
) -> std::result::Result<Vec<UnitSettings>, String> {
    let mut units = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let (Some(prefix), Some(catalog)) = (key.as_str(), value.as_str()) else {
            return Err("textToImageFolderMapping entries must map strings to strings".to_string());
        };
        let prefix = prefix.trim_matches('/');
        let pattern = if prefix.is_empty() || prefix == "." {
            format!("**/*.{{{LEGACY_IMAGE_EXTENSIONS}}}")
        } else {
            format!("{prefix}/**/*.{{{LEGACY_IMAGE_EXTENSIONS}}}")
        };
        units.push(UnitSettings {
            name: catalog.to_string(),
            image_glob_pattern: pattern,
            component_slug: None,
        });
    }
    Ok(units)
}

fn validate_units(units: &[UnitSettings]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for unit in units {
        if unit.name.trim().is_empty() {
            return Err("unit with an empty name".to_string());
        }
        // Names become catalog file names inside textFolder.
        if unit.name.contains(['/', '\\']) || unit.name.starts_with('.') {
            return Err(format!(
                "unit name `{}` must be a plain file name without path separators",
                unit.name
            ));
        }
        if unit.image_glob_pattern.trim().is_empty() {
            return Err(format!("unit `{}` has an empty image pattern", unit.name));
        }
        if !seen.insert(unit.name.as_str()) {
            return Err(format!("unit `{}` is declared more than once", unit.name));
        }
    }
    Ok(())
}

fn resolve_folder(base_dir: &Path, folder: &Path) -> PathBuf {
    let joined = if folder.is_absolute() {
        folder.to_path_buf()
    } else {
        base_dir.join(folder)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const UNITS_PROJECT: &str = r#"
name: Demo Game
contactAddress: loc@example.com
language: es
weblateUrl: https://weblate.example.com/
weblateProjectSlug: demo
textFolder: ./texts
imageFolder: ../shared/images
generatePoTemplates: true
units:
  - name: ui
    imageGlobPattern: "screens/**/*.png"
  - poName: story
    pattern: "cutscenes/*.jpg"
    weblateComponentSlug: story-text
"#;

    #[test]
    fn load_resolves_folders_against_project_directory() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("project");
        fs::create_dir_all(&project_dir).unwrap();
        let file = project_dir.join("imapo.yml");
        fs::write(&file, UNITS_PROJECT).unwrap();

        let settings = ProjectSettings::load(&file).expect("load");
        assert_eq!(settings.text_folder, project_dir.join("texts"));
        assert_eq!(settings.image_folder, dir.path().join("shared").join("images"));
        assert!(settings.generate_po_templates);
        assert_eq!(settings.name, "Demo Game");
        assert_eq!(settings.contact_address, "loc@example.com");
    }

    #[test]
    fn units_keep_declaration_order_and_component_slugs() {
        let settings =
            ProjectSettings::from_yaml(UNITS_PROJECT, Path::new("/p"), Path::new("imapo.yml"))
                .expect("parse");
        assert_eq!(settings.units.len(), 2);
        assert_eq!(settings.units[0].name, "ui");
        assert_eq!(settings.component_slug_of(UnitId(0)), Some("ui"));
        assert_eq!(settings.component_slug_of(UnitId(1)), Some("story-text"));
        assert_eq!(settings.component_slug_of(UnitId(2)), None);
        assert_eq!(settings.unit_ids().count(), 2);
    }

    #[test]
    fn unit_roots_stop_at_first_glob_segment() {
        let unit = |pattern: &str| UnitSettings {
            name: "u".into(),
            image_glob_pattern: pattern.into(),
            component_slug: None,
        };
        assert_eq!(unit("screens/**/*.png").root(), "screens");
        assert_eq!(unit("a/b/*.png").root(), "a/b");
        assert_eq!(unit("a/*/c/*.png").root(), "a");
        assert_eq!(unit("**/*.png").root(), "");
        assert_eq!(unit("title.png").root(), "");
        assert_eq!(unit("menu/title.png").root(), "menu");
    }

    #[test]
    fn legacy_mapping_is_normalized_into_units() {
        let yaml = r#"
textFolder: texts
imageFolder: images
textToImageFolderMapping:
  menus/: ui
  cutscenes: story
"#;
        let settings =
            ProjectSettings::from_yaml(yaml, Path::new("/p"), Path::new("old.yml")).expect("parse");
        assert_eq!(settings.units.len(), 2);
        assert_eq!(settings.units[0].name, "ui");
        assert_eq!(settings.units[0].root(), "menus");
        assert!(settings.units[0]
            .image_glob_pattern
            .starts_with("menus/**/*.{png"));
        assert_eq!(settings.units[1].name, "story");
        assert_eq!(settings.text_folder, PathBuf::from("/p/texts"));
    }

    #[test]
    fn ambiguous_or_missing_schema_is_rejected() {
        let both = r#"
textFolder: t
imageFolder: i
units:
  - name: ui
    imageGlobPattern: "*.png"
textToImageFolderMapping:
  menus: ui
"#;
        let err = ProjectSettings::from_yaml(both, Path::new("/p"), Path::new("p.yml")).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));

        let neither = "textFolder: t\nimageFolder: i\n";
        let err =
            ProjectSettings::from_yaml(neither, Path::new("/p"), Path::new("p.yml")).unwrap_err();
        assert!(err.to_string().contains("no translation units"));
    }

    #[test]
    fn duplicate_unit_names_and_bad_yaml_are_rejected() {
        let dup = r#"
textFolder: t
imageFolder: i
units:
  - name: ui
    imageGlobPattern: "a/*.png"
  - name: ui
    imageGlobPattern: "b/*.png"
"#;
        let err = ProjectSettings::from_yaml(dup, Path::new("/p"), Path::new("p.yml")).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let err = ProjectSettings::from_yaml("units: [", Path::new("/p"), Path::new("p.yml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Yaml { .. }));
    }

    #[test]
    fn unit_names_that_leave_the_text_folder_are_rejected() {
        for name in ["../x", "sub/ui", "sub\\\\ui", "..", ".hidden"] {
            let yaml = format!(
                "textFolder: t\nimageFolder: i\nunits:\n  - name: \"{name}\"\n    imageGlobPattern: \"a/*.png\"\n"
            );
            let err = ProjectSettings::from_yaml(&yaml, Path::new("/p"), Path::new("p.yml"))
                .unwrap_err();
            assert!(
                matches!(&err, SettingsError::Invalid { message, .. } if message.contains("plain file name")),
                "{name}: {err}"
            );
        }
    }

    #[test]
    fn missing_project_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = ProjectSettings::load(dir.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
