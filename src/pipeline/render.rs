//! Render job planning and execution.
//!
//! Jobs are planned per model in config order: one per angle of the
//! model's camera set, then one per (variant, angle of the variant's set)
//! named `{variant}_{angle}`. They run one at a time in that order.

use std::path::PathBuf;

use anyhow::{Result, bail};

use super::camera;
use crate::artifact;
use crate::config::{Category, Model, ProjectConfig};
use crate::log;
use crate::utils::exec::Cmd;

/// One screenshot to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub model: String,
    pub category: Category,
    /// Job angle name (`{variant}_{camera}` for variants)
    pub angle: String,
    /// Source to render, the variant's when set
    pub source: PathBuf,
    /// Camera name looked up in `[cameras]` when it differs from `angle`
    pub camera_angle: Option<String>,
    /// Resolved camera string, distance override applied
    pub camera: String,
}

impl RenderJob {
    pub fn output_path(&self, config: &ProjectConfig) -> PathBuf {
        artifact::screenshot_path(config, self.category, &self.model, &self.angle)
    }
}

/// Angles for a set, warning when the set is unknown.
fn angles_for(config: &ProjectConfig, owner: &str, set: &str) -> Vec<String> {
    camera::resolve_angles(config, set).unwrap_or_else(|fallback| {
        log!("render"; "{}: unknown camera set `{}`, using `{}`", owner, set, camera::FALLBACK_ANGLE);
        fallback
    })
}

/// Plan all jobs for `models`, in order.
///
/// Angles without a camera are dropped with a warning.
pub fn plan_jobs(config: &ProjectConfig, models: &[&Model]) -> Vec<RenderJob> {
    let mut jobs = Vec::new();

    for model in models {
        let set = camera::resolve_set_name(config, &[model.camera_set.as_deref()]);
        for angle in angles_for(config, &model.name, set) {
            push_job(config, &mut jobs, model, model.source.clone(), None, angle);
        }

        for variant in &model.variants {
            let set = camera::resolve_set_name(
                config,
                &[variant.camera_set.as_deref(), model.camera_set.as_deref()],
            );
            let owner = format!("{}/{}", model.name, variant.name);
            for angle in angles_for(config, &owner, set) {
                push_job(
                    config,
                    &mut jobs,
                    model,
                    variant.source.clone(),
                    Some(&variant.name),
                    angle,
                );
            }
        }
    }

    jobs
}

fn push_job(
    config: &ProjectConfig,
    jobs: &mut Vec<RenderJob>,
    model: &Model,
    source: PathBuf,
    variant: Option<&str>,
    camera_angle: String,
) {
    let Some(camera) = camera::camera_for(config, &camera_angle, model.camera_distance) else {
        log!("render"; "{}: no camera named `{}`, skipping", model.name, camera_angle);
        return;
    };

    let (angle, camera_angle) = match variant {
        Some(v) => (format!("{v}_{camera_angle}"), Some(camera_angle)),
        None => (camera_angle, None),
    };

    jobs.push(RenderJob {
        model: model.name.clone(),
        category: model.category,
        angle,
        source,
        camera_angle,
        camera,
    });
}

/// Renderer invocation for a job.
pub fn render_command(config: &ProjectConfig, job: &RenderJob) -> Cmd {
    let render = &config.render;
    let [width, height] = render.image_size;

    let mut cmd = Cmd::from_slice(&render.command)
        .arg("-o")
        .arg(job.output_path(config))
        .arg(format!("--imgsize={width},{height}"))
        .arg(format!("--camera={}", job.camera))
        .arg(format!("--colorscheme={}", render.color_scheme))
        .args(["-D".to_string(), format!("$fn={}", render.facets)]);

    if render.autocenter {
        cmd = cmd.arg("--autocenter");
    }
    if render.viewall {
        cmd = cmd.arg("--viewall");
    }
    cmd.arg(&job.source).cwd(&config.root)
}

/// Render one job, returning the written image path.
pub async fn run_job(config: &ProjectConfig, job: &RenderJob) -> Result<PathBuf> {
    let output_path = job.output_path(config);
    tokio::fs::create_dir_all(config.screenshots_dir()).await?;

    let output = render_command(config, job).run().await?;
    if !output.success() {
        bail!(output.error_message());
    }
    if !output_path.exists() {
        bail!("renderer exited successfully but wrote no image");
    }
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    const SCENARIO: &str = r#"
[cameras]
iso = "0,0,0,55,0,25,140"
front = "0,0,0,0,0,0,140"

[camera_sets]
standard = ["iso", "front"]
closeup = ["iso"]

[[models]]
name = "bracket"
type = "component"
source = "build/bracket.scad"
"#;

    fn planned(config: &ProjectConfig) -> Vec<(String, String, String)> {
        let models: Vec<_> = config.models.iter().collect();
        plan_jobs(config, &models)
            .into_iter()
            .map(|j| (j.model, j.angle, j.camera))
            .collect()
    }

    #[test]
    fn test_two_angles_in_order() {
        let config = test_parse_config(SCENARIO);
        assert_eq!(
            planned(&config),
            vec![
                ("bracket".into(), "iso".into(), "0,0,0,55,0,25,140".into()),
                ("bracket".into(), "front".into(), "0,0,0,0,0,0,140".into()),
            ]
        );
    }

    #[test]
    fn test_distance_override() {
        let mut config = test_parse_config(SCENARIO);
        config.models[0].camera_distance = Some(200.0);
        let jobs = planned(&config);
        assert_eq!(jobs[0].2, "0,0,0,55,0,25,200");
        assert_eq!(jobs[1].2, "0,0,0,0,0,0,200");
    }

    #[test]
    fn test_variant_jobs() {
        let config = test_parse_config(&format!(
            "{SCENARIO}\n[[models.variants]]\nname = \"open\"\nsource = \"build/bracket_open.scad\"\ncamera_set = \"closeup\"\n"
        ));
        let models: Vec<_> = config.models.iter().collect();
        let jobs = plan_jobs(&config, &models);

        let angles: Vec<_> = jobs.iter().map(|j| j.angle.as_str()).collect();
        assert_eq!(angles, vec!["iso", "front", "open_iso"]);
        assert_eq!(jobs[2].camera_angle.as_deref(), Some("iso"));
        assert!(jobs[2].source.ends_with("bracket_open.scad"));
    }

    #[test]
    fn test_degraded_angles() {
        let config = test_parse_config(
            r#"
[cameras]
iso = "0,0,0,55,0,25,140"

[camera_sets]
standard = ["iso", "missing"]

[[models]]
name = "a"
type = "vitamin"
source = "a.scad"
camera_set = "nope"

[[models]]
name = "b"
type = "vitamin"
source = "b.scad"
"#,
        );
        let jobs = planned(&config);
        let names: Vec<_> = jobs.iter().map(|(m, a, _)| format!("{m}/{a}")).collect();
        // Unknown set → iso; missing camera → that job only is dropped
        assert_eq!(names, vec!["a/iso", "b/iso"]);
    }

    #[test]
    fn test_render_command_args() {
        let mut config = test_parse_config(SCENARIO);
        config.root = "/proj".into();
        config.project.build_dir = "/proj/build".into();
        config.render.viewall = false;
        let models: Vec<_> = config.models.iter().collect();
        let job = &plan_jobs(&config, &models)[0];

        assert_eq!(
            render_command(&config, job).display(),
            "openscad -o /proj/build/screenshots/component-bracket-iso.png --imgsize=800,600 \
             --camera=0,0,0,55,0,25,140 --colorscheme=Tomorrow -D $fn=64 --autocenter build/bracket.scad"
        );
    }

    #[tokio::test]
    async fn test_run_job_reports_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = test_parse_config(SCENARIO);
        config.root = dir.path().to_path_buf();
        config.project.build_dir = dir.path().join("build");
        let models: Vec<_> = config.models.iter().collect();
        let job = plan_jobs(&config, &models).remove(0);

        // Writes the image named after -o
        config.render.command = vec![
            "sh".into(),
            "-c".into(),
            r#"while [ "$1" != "-o" ]; do shift; done; echo png > "$2""#.into(),
            "sh".into(),
        ];
        let path = run_job(&config, &job).await.unwrap();
        assert!(path.exists());

        config.render.command = vec!["sh".into(), "-c".into(), "echo bad camera >&2; exit 1".into()];
        let err = run_job(&config, &job).await.unwrap_err();
        assert!(err.to_string().contains("bad camera"));

        config.render.command = vec!["true".into()];
        std::fs::remove_file(&path).unwrap();
        assert!(run_job(&config, &job).await.is_err());
    }
}
