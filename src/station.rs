//! Declarative station documents, exactly as they are stored on disk.
//!
//! These types only mirror the JSON; resolution against the media catalog
//! happens in [`crate::rules`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDef {
    pub tag: String,
    #[serde(default)]
    pub info: serde_json::Value,
    #[serde(default)]
    pub file_groups: Vec<FileGroupDef>,
    pub playlist: PlaylistDef,
}

impl StationDef {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }
}

/// Shared file groups published by a station's parent series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonDef {
    #[serde(default)]
    pub file_groups: Vec<FileGroupDef>,
}

impl CommonDef {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileGroupDef {
    pub tag: String,
    #[serde(default)]
    pub files: Vec<FileDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub path: String,
    /// Raw file duration in seconds.
    pub duration: f64,
    /// Part of the file meant to be heard, when shorter than `duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audible_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attaches: Option<AttachesDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachesDef {
    #[serde(default)]
    pub files: Vec<FileDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDef {
    pub first_fragment: FragmentRef,
    pub fragments: Vec<FragmentDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRef {
    pub fragment_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentDef {
    pub tag: String,
    pub src: SourceDef,
    #[serde(default)]
    pub next_fragment: Vec<TransitionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixins: Option<MixinsDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Group,
    Attach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDef {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDef {
    pub fragment_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixinsDef {
    #[serde(default)]
    pub pos: Vec<PositionDef>,
    #[serde(default)]
    pub mix: Vec<MixDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDef {
    pub tag: String,
    pub relative_offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixDef {
    pub tag: String,
    pub src: SourceDef,
    pub condition: ConditionDef,
    #[serde(default)]
    pub pos_variant: Vec<PositionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRef {
    pub pos_tag: String,
}

/// Loosely typed condition node. Every field except `type` is optional in
/// the document; [`crate::condition::Condition::parse`] decides what is
/// well-formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Vec<ConditionDef>>,
}
