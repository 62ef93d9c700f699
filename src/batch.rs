//! Batch execution over many document pairs
//!
//! A thin sequential loop: one [`Comparator`] per task, one task at a
//! time, aggregated into a [`TestReport`]. Running strictly sequentially
//! is what bounds cache access to a single writer per cache directory;
//! the batch layer must not be parallelized without adding cache
//! locking.

use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::capability::CapabilityRegistry;
use crate::comparator::{Comparator, ComparisonOptions};
use crate::error::{Error, Result};
use crate::{DiffOptions, TestPoint};

/// Aggregate outcome of one document pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    /// Not executed yet; the initial status
    Unexecuted,
    /// The baseline file is not found
    ExpectedNotFound,
    /// The actual output is not found
    ActualNotFound,
    /// The files are being compared
    InProgress,
    /// Every page ratio stayed within the tolerance
    Matched,
    /// At least one page differed beyond the tolerance
    Mismatched,
}

/// One unit of batch work: a named expected/actual pair
#[derive(Debug, Clone)]
pub struct BatchTask {
    pub name: String,
    pub expected: PathBuf,
    pub actual: PathBuf,
}

impl BatchTask {
    pub fn new(name: impl Into<String>, expected: impl Into<PathBuf>, actual: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result of one batch task
#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    pub name: String,
    pub expected: PathBuf,
    pub actual: PathBuf,
    pub status: TestStatus,
    pub details: Vec<TestPoint>,
}

/// Aggregated result of a whole batch run
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub title: String,
    pub tolerance: f64,
    pub cases: Vec<TestCase>,
}

/// Progress of the batch loop: 1-based task counters plus the task name
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub current: usize,
    pub limit: usize,
    pub name: String,
}

/// Options for a batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Difference tolerance over each page's ratio. Default: 0.001.
    pub tolerance: f64,
    /// Cache directory for baseline images. Default: `cache`.
    pub cache_dir: Option<PathBuf>,
    /// Report title. Default: `Test Report`.
    pub title: Option<String>,
    /// Pass-through pixel-diff configuration.
    pub diff: DiffOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            cache_dir: None,
            title: None,
            diff: DiffOptions::default(),
        }
    }
}

/// Compares multiple document pairs sequentially and aggregates a report.
pub struct BatchComparator {
    registry: Arc<CapabilityRegistry>,
    report_dir: PathBuf,
    tolerance: f64,
    cache_dir: PathBuf,
    title: String,
    diff: DiffOptions,
    tasks: Vec<BatchTask>,
    on_progress: Option<Box<dyn FnMut(&BatchProgress) + Send>>,
}

impl BatchComparator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        report_dir: impl Into<PathBuf>,
        options: BatchOptions,
    ) -> Self {
        Self {
            registry,
            report_dir: report_dir.into(),
            tolerance: options.tolerance,
            cache_dir: options.cache_dir.unwrap_or_else(|| PathBuf::from("cache")),
            title: options.title.unwrap_or_else(|| "Test Report".into()),
            diff: options.diff,
            tasks: Vec::new(),
            on_progress: None,
        }
    }

    pub fn report_dir(&self) -> &PathBuf {
        &self.report_dir
    }

    /// Queue a new task.
    pub fn add_task(&mut self, task: BatchTask) {
        self.tasks.push(task);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Register a callback invoked once per task, before it runs.
    pub fn on_progress<F>(&mut self, cb: F)
    where
        F: FnMut(&BatchProgress) + Send + 'static,
    {
        self.on_progress = Some(Box::new(cb));
    }

    /// Compare every queued pair and aggregate the report.
    ///
    /// Errors with [`Error::NoTasks`] when nothing was queued. A missing
    /// file on either side resolves that case's status without running a
    /// comparison; capability failures abort the batch.
    pub async fn exec(&mut self) -> Result<TestReport> {
        let limit = self.tasks.len();
        if limit == 0 {
            return Err(Error::NoTasks);
        }

        let tasks = std::mem::take(&mut self.tasks);
        let mut cases = Vec::with_capacity(limit);

        for (current, task) in tasks.iter().enumerate() {
            if let Some(cb) = self.on_progress.as_mut() {
                cb(&BatchProgress {
                    current: current + 1,
                    limit,
                    name: task.name.clone(),
                });
            }
            debug!("batch task {}/{limit}: {}", current + 1, task.name);
            cases.push(self.run_task(task).await?);
        }

        self.tasks = tasks;
        Ok(TestReport {
            title: self.title.clone(),
            tolerance: self.tolerance,
            cases,
        })
    }

    async fn run_task(&mut self, task: &BatchTask) -> Result<TestCase> {
        let mut case = TestCase {
            name: task.name.clone(),
            expected: task.expected.clone(),
            actual: task.actual.clone(),
            status: TestStatus::Unexecuted,
            details: Vec::new(),
        };

        if !task.expected.exists() {
            case.status = TestStatus::ExpectedNotFound;
            return Ok(case);
        }
        if !task.actual.exists() {
            case.status = TestStatus::ActualNotFound;
            return Ok(case);
        }

        case.status = TestStatus::InProgress;
        let options = ComparisonOptions {
            cache_dir: Some(self.cache_dir.clone()),
            image_dir: Some(self.report_dir.join("image").join(&task.name)),
            diff: self.diff.clone(),
        };
        let mut comparator = Comparator::new(
            self.registry.clone(),
            &task.expected,
            &task.actual,
            options,
        );
        case.details = comparator.exec().await?;
        comparator.idle().await?;

        // NaN ratios fail the comparison, so a page-level error can
        // never masquerade as a match.
        let matched = case
            .details
            .iter()
            .all(|point| point.ratio <= self.tolerance);
        case.status = if matched {
            TestStatus::Matched
        } else {
            TestStatus::Mismatched
        };
        Ok(case)
    }
}
