//! Live Update Message Protocol
//!
//! JSON messages exchanged over the WebSocket, tagged by a `type` field.
//!
//! # Server → viewer
//!
//! | `type`             | Fields                                    |
//! |--------------------|-------------------------------------------|
//! | `connected`        | `models`, `groups`, `port`, `buildDir`    |
//! | `build_start`      | `command`                                 |
//! | `build_complete`   | `success`, `error?`, `duration_ms`        |
//! | `validation`       | `warnings`, `valid_models`                |
//! | `render_start`     | `models`, `totalAngles`                   |
//! | `render_progress`  | `model`, `angle`, `current`, `total`      |
//! | `render_complete`  | `duration_ms`                             |
//! | `artifact_updated` | `model`, `angle`, `path`, `mtime`         |
//! | `export_ready`     | `model`, `scale`, `path`                  |
//! | `error`            | `message`, `context?`                     |
//!
//! # Viewer → server
//!
//! `request_rebuild{}`, `request_render{models?}`, `request_export{model, scale?}`.

use serde::{Deserialize, Serialize};

use crate::config::{Category, Model, ProjectConfig, ProjectGroup};
use crate::pipeline::ValidationResult;

/// Model summary sent in the `connected` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub stl: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}

impl From<&Model> for ModelInfo {
    fn from(model: &Model) -> Self {
        Self {
            name: model.name.clone(),
            category: model.category,
            stl: model.stl,
            variants: model.variants.iter().map(|v| v.name.clone()).collect(),
        }
    }
}

/// Event broadcast to every connected viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Connected {
        models: Vec<ModelInfo>,
        groups: Vec<ProjectGroup>,
        /// HTTP artifact server port
        port: u16,
        #[serde(rename = "buildDir")]
        build_dir: String,
    },

    BuildStart {
        command: String,
    },

    BuildComplete {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
    },

    Validation(ValidationResult),

    RenderStart {
        models: Vec<String>,
        #[serde(rename = "totalAngles")]
        total_angles: usize,
    },

    RenderProgress {
        model: String,
        angle: String,
        current: usize,
        total: usize,
    },

    RenderComplete {
        duration_ms: u64,
    },

    ArtifactUpdated {
        model: String,
        angle: String,
        /// Relative to the build dir, `/`-separated
        path: String,
        /// Milliseconds since the Unix epoch
        mtime: u64,
    },

    ExportReady {
        model: String,
        scale: u32,
        path: String,
    },

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}

impl Event {
    /// Create the connection-time `connected` message.
    pub fn connected(config: &ProjectConfig, port: u16) -> Self {
        Self::Connected {
            models: config.models.iter().map(ModelInfo::from).collect(),
            groups: config.groups.clone(),
            port,
            build_dir: config
                .root_relative(config.build_dir())
                .to_string_lossy()
                .replace('\\', "/"),
        }
    }

    /// Create an error message with a context tag (`build`, `render`, ...).
    pub fn error(message: impl Into<String>, context: &str) -> Self {
        Self::Error {
            message: message.into(),
            context: Some(context.to_string()),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

/// Request sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerRequest {
    RequestRebuild {},

    RequestRender {
        #[serde(default)]
        models: Option<Vec<String>>,
    },

    RequestExport {
        model: String,
        #[serde(default)]
        scale: Option<u32>,
    },
}

impl ViewerRequest {
    /// Parse from JSON string; unknown message types yield `None`.
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
