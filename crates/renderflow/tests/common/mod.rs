#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use renderflow::api::ApiState;
use renderflow::jobs::{
    AdmissionConfig, AdmissionController, JobRegistry, Scheduler, SchedulerConfig,
};
use renderflow::render::files::temp_video_path;
use renderflow::render::{
    boxed, BoxFuture, KeywordParser, RenderOptions, VideoRenderer, WeatherData,
};

pub fn scheduler(max_concurrency: usize, timeout_ms: u64) -> Scheduler {
    Scheduler::new(
        JobRegistry::new(),
        SchedulerConfig {
            max_concurrency,
            render_timeout: Duration::from_millis(timeout_ms),
        },
    )
}

pub fn admission(max_concurrency: usize, timeout_ms: u64, max_queue_depth: usize) -> AdmissionController {
    AdmissionController::new(
        scheduler(max_concurrency, timeout_ms),
        AdmissionConfig { max_queue_depth },
    )
}

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("renderflow-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

pub const FAKE_MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42fake-video";

pub enum FakeBehavior {
    Write,
    Fail(&'static str),
    Sleep(Duration),
}

/// Stands in for the external renderer.
pub struct FakeRenderer {
    pub dir: PathBuf,
    pub behavior: FakeBehavior,
}

impl FakeRenderer {
    async fn run(&self) -> anyhow::Result<PathBuf> {
        match &self.behavior {
            FakeBehavior::Write => {
                let path = temp_video_path(&self.dir);
                tokio::fs::write(&path, FAKE_MP4).await?;
                Ok(path)
            }
            FakeBehavior::Fail(msg) => anyhow::bail!("{msg}"),
            FakeBehavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(self.dir.join("never.mp4"))
            }
        }
    }
}

impl VideoRenderer for FakeRenderer {
    fn render<'a>(
        &'a self,
        _data: &'a WeatherData,
        _options: &'a RenderOptions,
    ) -> BoxFuture<'a, anyhow::Result<PathBuf>> {
        boxed(self.run())
    }
}

pub fn api_state(admission: AdmissionController, behavior: FakeBehavior) -> ApiState {
    let dir = scratch_dir();
    ApiState::new(
        admission,
        Arc::new(KeywordParser::new().expect("parser")),
        Arc::new(FakeRenderer {
            dir: dir.clone(),
            behavior,
        }),
        dir,
    )
}
