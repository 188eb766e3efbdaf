use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::render::files::{temp_dir_usable, temp_video_path};
use crate::render::{boxed, BoxFuture, RenderOptions, VideoRenderer, WeatherData};

#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Program plus leading arguments, e.g. `["npx", "remotion", "render"]`.
    pub command: Vec<String>,
    pub entry_point: String,
    pub composition_id: String,
    pub temp_dir: PathBuf,
    pub default_fps: u32,
    pub default_width: u32,
    pub default_height: u32,
    pub default_quality: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".into(), "remotion".into(), "render".into()],
            entry_point: "src/index.tsx".into(),
            composition_id: "WeatherForecast".into(),
            temp_dir: PathBuf::from("temp"),
            default_fps: 30,
            default_width: 1080,
            default_height: 1920,
            default_quality: 80,
        }
    }
}

/// Renders by shelling out to the composition CLI.
///
/// The child is not killed when the scheduler gives up on it; it finishes (or fails)
/// on its own and its output file is collected by the temp-file cleanup.
#[derive(Clone, Debug)]
pub struct CommandRenderer {
    cfg: RenderConfig,
}

impl CommandRenderer {
    pub fn new(cfg: RenderConfig) -> Self {
        Self { cfg }
    }

    /// Full argument list (after the program) for one render.
    pub fn build_args(
        &self,
        data: &WeatherData,
        options: &RenderOptions,
        output: &Path,
    ) -> anyhow::Result<Vec<String>> {
        let props = serde_json::to_string(&data.to_props())?;

        let mut args: Vec<String> = self.cfg.command.iter().skip(1).cloned().collect();
        args.push(self.cfg.entry_point.clone());
        args.push(self.cfg.composition_id.clone());
        args.push(output.display().to_string());
        args.push(format!("--props={props}"));
        args.push("--codec=h264".to_string());
        args.push("--pixel-format=yuv420p".to_string());
        args.push("--image-format=jpeg".to_string());
        args.push(format!(
            "--jpeg-quality={}",
            options.quality.unwrap_or(self.cfg.default_quality)
        ));
        args.push(format!("--fps={}", options.fps.unwrap_or(self.cfg.default_fps)));
        args.push(format!(
            "--width={}",
            options.width.unwrap_or(self.cfg.default_width)
        ));
        args.push(format!(
            "--height={}",
            options.height.unwrap_or(self.cfg.default_height)
        ));
        Ok(args)
    }

    async fn run(&self, data: &WeatherData, options: &RenderOptions) -> anyhow::Result<PathBuf> {
        if !temp_dir_usable(&self.cfg.temp_dir).await {
            anyhow::bail!("not enough disk space to render: temp dir unavailable");
        }

        let program = self
            .cfg
            .command
            .first()
            .ok_or_else(|| anyhow::anyhow!("render command is empty"))?;
        let output = temp_video_path(&self.cfg.temp_dir);
        let args = self.build_args(data, options, &output)?;

        tracing::info!(
            city = data.city.as_deref().unwrap_or("-"),
            condition = %data.condition,
            output = %output.display(),
            "starting video render"
        );

        let out = Command::new(program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("could not start renderer `{program}`: {e}"))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            anyhow::bail!(
                "renderer exited with {:?}: {}",
                out.status.code(),
                if stderr.is_empty() { "no output" } else { &stderr }
            );
        }

        tracing::info!(output = %output.display(), "video render finished");
        Ok(output)
    }
}

impl VideoRenderer for CommandRenderer {
    fn render<'a>(
        &'a self,
        data: &'a WeatherData,
        options: &'a RenderOptions,
    ) -> BoxFuture<'a, anyhow::Result<PathBuf>> {
        boxed(self.run(data, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TemperatureUnit;

    fn data() -> WeatherData {
        WeatherData {
            city: Some("Madrid".into()),
            country: None,
            condition: "Soleado".into(),
            temperature_c: 20.0,
            temperature_range: None,
            temperature_unit: TemperatureUnit::C,
            feels_like: None,
            feels_like_temp: None,
            wind: None,
            wind_speed: None,
            wind_direction: None,
            wind_unit: None,
            precipitation: None,
            description: "Soleado en Madrid".into(),
            language: None,
        }
    }

    #[test]
    fn args_carry_props_and_overrides() {
        let renderer = CommandRenderer::new(RenderConfig::default());
        let options = RenderOptions {
            fps: Some(24),
            width: None,
            height: None,
            quality: Some(50),
        };
        let args = renderer
            .build_args(&data(), &options, Path::new("temp/out.mp4"))
            .unwrap();

        assert_eq!(&args[..4], ["remotion", "render", "src/index.tsx", "WeatherForecast"]);
        assert_eq!(args[4], "temp/out.mp4");
        assert!(args.iter().any(|a| a.starts_with("--props=") && a.contains("\"city\":\"Madrid\"")));
        assert!(args.contains(&"--fps=24".to_string()));
        assert!(args.contains(&"--jpeg-quality=50".to_string()));
        assert!(args.contains(&"--width=1080".to_string()));
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let dir = std::env::temp_dir();
        let renderer = CommandRenderer::new(RenderConfig {
            command: vec!["renderflow-no-such-binary".into()],
            temp_dir: dir,
            ..RenderConfig::default()
        });
        let err = renderer
            .render(&data(), &RenderOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not start renderer"));
    }
}
