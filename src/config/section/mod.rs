//! Configuration section definitions.
//!
//! Each module corresponds to a section in `scadview.toml`:
//!
//! | Module    | TOML Section                    | Purpose                               |
//! |-----------|---------------------------------|---------------------------------------|
//! | `project` | `[project]`                     | Build directory, display name         |
//! | `build`   | `[build]`                       | External build and registry commands  |
//! | `render`  | `[render]`, `[cameras]`, `[camera_sets]` | Screenshot renderer settings |
//! | `export`  | `[export]`                      | On-demand 3D export settings          |
//! | `watch`   | `[watch]`                       | Watched directories, debounce         |
//! | `serve`   | `[serve]`                       | HTTP + WebSocket listeners            |
//! | `model`   | `[[models]]`, `[[groups]]`      | Declared models and UI groups         |

pub mod build;
mod export;
mod model;
mod project;
mod render;
mod serve;
mod watch;

pub use build::BuildSectionConfig;
pub use export::{DEFAULT_SCALE, ExportConfig};
pub use model::{Category, Model, ProjectGroup, validate_models};
pub use project::ProjectSectionConfig;
pub use render::{
    CAMERA_FIELDS, CameraSets, Cameras, RenderConfig, default_camera_sets, default_cameras,
    validate_cameras,
};
pub use serve::ServeConfig;
pub use watch::WatchConfig;
