//! Recording in-memory engine for unit tests

use crate::engine::{BuildOptions, ContainerEngine, RunOptions, RunResult};
use crate::error::{InvowkError, InvowkResult};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// A build as seen by the engine, captured before the context is removed
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    pub opts: BuildOptions,
    pub dockerfile: String,
    pub context_entries: Vec<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    pub images: Mutex<HashSet<String>>,
    pub exists_calls: Mutex<Vec<String>>,
    pub builds: Mutex<Vec<RecordedBuild>>,
    pub runs: Mutex<Vec<RunOptions>>,
    pub removed: Mutex<Vec<String>>,
    /// Make every existence check fail
    pub exists_error: bool,
    /// Errors returned by successive builds before builds start succeeding
    pub build_errors: Mutex<VecDeque<InvowkError>>,
    /// Results returned by successive runs; exit code 0 once exhausted
    pub run_results: Mutex<VecDeque<InvowkResult<RunResult>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, tag: &str) -> Self {
        self.images.lock().unwrap().insert(tag.to_string());
        self
    }

    pub fn failing_builds(self, errors: Vec<InvowkError>) -> Self {
        *self.build_errors.lock().unwrap() = errors.into();
        self
    }

    pub fn run_results(self, results: Vec<InvowkResult<RunResult>>) -> Self {
        *self.run_results.lock().unwrap() = results.into();
        self
    }

    pub fn build_count(&self) -> usize {
        self.builds.lock().unwrap().len()
    }

    pub fn exists_count(&self) -> usize {
        self.exists_calls.lock().unwrap().len()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn total_calls(&self) -> usize {
        self.build_count() + self.exists_count() + self.run_count() + self.removed.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn version(&self) -> InvowkResult<String> {
        Ok("fake 1.0".to_string())
    }

    async fn build_image(
        &self,
        opts: &BuildOptions,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> InvowkResult<()> {
        let dockerfile = std::fs::read_to_string(opts.dockerfile_path()).unwrap_or_default();
        let mut context_entries: Vec<String> = std::fs::read_dir(&opts.context_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        context_entries.sort();

        self.builds.lock().unwrap().push(RecordedBuild {
            opts: opts.clone(),
            dockerfile,
            context_entries,
        });

        if let Some(err) = self.build_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        on_output(format!("STEP 1/1: FROM for {}", opts.tag));
        self.images.lock().unwrap().insert(opts.tag.clone());
        Ok(())
    }

    async fn image_exists(&self, tag: &str) -> InvowkResult<bool> {
        self.exists_calls.lock().unwrap().push(tag.to_string());
        if self.exists_error {
            return Err(InvowkError::command_exec("fake image exists", "engine unreachable"));
        }
        Ok(self.images.lock().unwrap().contains(tag))
    }

    async fn run(&self, opts: &RunOptions) -> InvowkResult<RunResult> {
        self.runs.lock().unwrap().push(opts.clone());
        self.run_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RunResult::default()))
    }

    async fn image_remove(&self, tag: &str) -> InvowkResult<()> {
        self.removed.lock().unwrap().push(tag.to_string());
        self.images.lock().unwrap().remove(tag);
        Ok(())
    }

    async fn image_list_prefixed(&self, prefix: &str) -> InvowkResult<Vec<String>> {
        let mut images: Vec<String> = self
            .images
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.starts_with(prefix))
            .cloned()
            .collect();
        images.sort();
        Ok(images)
    }
}
