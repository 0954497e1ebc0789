use crate::error::{Error, Result};
use crate::station::{FileDef, FileGroupDef};
use lofty::file::AudioFile as _;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A playable file of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    pub tag: Option<String>,
    pub path: PathBuf,
    /// Seconds meant to be heard; this is what the scheduler uses.
    pub audible_duration: f64,
    /// Declared raw duration of the file in seconds.
    pub duration: f64,
    /// Sub-clips that only play as children of this file.
    pub attaches: Vec<Arc<AudioFile>>,
}

impl AudioFile {
    /// Resolve a file definition against the directory its group lives in.
    pub fn from_def(def: &FileDef, root: &Path) -> Self {
        let attaches = def
            .attaches
            .as_ref()
            .map(|a| {
                a.files
                    .iter()
                    .map(|f| Arc::new(AudioFile::from_def(f, root)))
                    .collect()
            })
            .unwrap_or_default();

        AudioFile {
            tag: def.tag.clone(),
            path: root.join(&def.path),
            audible_duration: def.audible_duration.unwrap_or(def.duration),
            duration: def.duration,
            attaches,
        }
    }

    /// Tag when present, otherwise the file name.
    pub fn label(&self) -> String {
        match &self.tag {
            Some(tag) => tag.clone(),
            None => self
                .path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Station file groups merged over the shared groups of the parent series.
#[derive(Debug, Clone, Default)]
pub struct MediaCatalog {
    groups: HashMap<String, Vec<Arc<AudioFile>>>,
}

impl MediaCatalog {
    /// Build the catalog. Station groups replace common groups with the same
    /// tag as a whole; files are never merged across origins.
    pub fn load(
        station_groups: &[FileGroupDef],
        station_root: &Path,
        common: Option<(&[FileGroupDef], &Path)>,
    ) -> Result<Self> {
        let mut groups = HashMap::new();

        if let Some((common_groups, common_root)) = common {
            let root = resolve_root(common_root)?;
            for group in common_groups {
                groups.insert(group.tag.clone(), resolve_group(group, &root));
            }
        }

        let root = resolve_root(station_root)?;
        for group in station_groups {
            if groups
                .insert(group.tag.clone(), resolve_group(group, &root))
                .is_some()
            {
                tracing::debug!("Station group '{}' overrides common group", group.tag);
            }
        }

        Ok(MediaCatalog { groups })
    }

    /// Build a catalog from already resolved groups.
    pub fn from_groups(groups: HashMap<String, Vec<Arc<AudioFile>>>) -> Self {
        MediaCatalog { groups }
    }

    pub fn files(&self, group: &str) -> Result<&[Arc<AudioFile>]> {
        self.groups
            .get(group)
            .map(|files| files.as_slice())
            .ok_or_else(|| Error::FileGroupNotFound(group.to_string()))
    }

    /// Look up a tagged file inside a group.
    pub fn file(&self, group: &str, file_tag: &str) -> Result<Arc<AudioFile>> {
        self.files(group)?
            .iter()
            .find(|f| f.tag.as_deref() == Some(file_tag))
            .cloned()
            .ok_or_else(|| Error::MissingGroupOrFile {
                group: group.to_string(),
                file: file_tag.to_string(),
            })
    }

    pub fn group_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.groups.keys().map(|k| k.as_str()).collect();
        tags.sort_unstable();
        tags
    }

    /// Every file of the catalog, attachments included, in group tag order.
    pub fn all_files(&self) -> Vec<Arc<AudioFile>> {
        let mut out = Vec::new();
        for tag in self.group_tags() {
            for file in &self.groups[tag] {
                out.push(file.clone());
                out.extend(file.attaches.iter().cloned());
            }
        }
        out
    }
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize()
        .map_err(|e| Error::FileGroupNotFound(format!("{} ({})", root.display(), e)))
}

fn resolve_group(group: &FileGroupDef, root: &Path) -> Vec<Arc<AudioFile>> {
    group
        .files
        .iter()
        .map(|f| Arc::new(AudioFile::from_def(f, root)))
        .collect()
}

/// Read the real duration of a media file from its container.
pub fn probe_duration(path: &Path) -> Result<Duration> {
    let tagged_file = lofty::read_from_path(path).map_err(|e| {
        tracing::debug!("Failed to read '{}': {}", path.display(), e);
        Error::AssetNotFound(path.to_path_buf())
    })?;
    Ok(tagged_file.properties().duration())
}
