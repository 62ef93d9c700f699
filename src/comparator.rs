//! Comparison of one expected/actual document pair
//!
//! One [`Comparator`] owns one comparison run: it opens the baseline
//! through the page cache, renders the actual document directly, diffs
//! the pages in index order, and writes a self-contained artifact set
//! under the run's image directory. Artifact writes are spawned
//! fire-and-forget onto the runtime and joined through
//! [`idle`](Comparator::idle); a caller that needs the files on disk
//! must call it before reading them back.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::debug;
use tokio::task::JoinSet;

use crate::cache::PageCache;
use crate::capability::{encode_png, CapabilityRegistry};
use crate::compare::compare_images;
use crate::error::{Error, Result};
use crate::{Action, DiffOptions, Progress, TestPoint};

/// Progress callback invoked at every phase transition, in page order.
pub type ProgressHandler = Box<dyn FnMut(Action, &Progress) + Send>;

/// Options for one comparison run
#[derive(Debug, Clone, Default)]
pub struct ComparisonOptions {
    /// Cache directory for images rendered from baselines.
    /// Default: `cache`.
    pub cache_dir: Option<PathBuf>,
    /// Directory for the run's artifact set. Default: a directory named
    /// after the actual file, next to it.
    pub image_dir: Option<PathBuf>,
    /// Pass-through configuration for the pixel-diff primitive.
    pub diff: DiffOptions,
}

/// A comparator between two paginated documents.
///
/// A missing document on either side is not an error: that side's page
/// count degrades to zero and every unmatched page reports a ratio of
/// `1.0`. A per-page diff failure is reported through the progress
/// callback and leaves that page's ratio as `NaN`; the run continues.
pub struct Comparator {
    registry: Arc<CapabilityRegistry>,
    expected: PathBuf,
    actual: PathBuf,
    cache_dir: PathBuf,
    image_dir: PathBuf,
    diff_options: DiffOptions,
    pending: JoinSet<Result<()>>,
    on_progress: Option<ProgressHandler>,
}

impl Comparator {
    /// Create a comparator for one baseline/output pair.
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        expected: impl Into<PathBuf>,
        actual: impl Into<PathBuf>,
        options: ComparisonOptions,
    ) -> Self {
        let expected = expected.into();
        let actual = actual.into();
        let cache_dir = options.cache_dir.unwrap_or_else(|| PathBuf::from("cache"));
        let image_dir = options
            .image_dir
            .unwrap_or_else(|| artifact_dir_for(&actual));
        Self {
            registry,
            expected,
            actual,
            cache_dir,
            image_dir,
            diff_options: options.diff,
            pending: JoinSet::new(),
            on_progress: None,
        }
    }

    pub fn expected(&self) -> &Path {
        &self.expected
    }

    pub fn actual(&self) -> &Path {
        &self.actual
    }

    /// Register a progress callback. Events arrive in page order.
    pub fn on_progress<F>(&mut self, cb: F)
    where
        F: FnMut(Action, &Progress) + Send + 'static,
    {
        self.on_progress = Some(Box::new(cb));
    }

    /// Wait until all pending artifact writes have reached the disk.
    ///
    /// Resolves immediately when nothing is pending. Surfaces the first
    /// write failure after draining the set.
    pub async fn idle(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.pending.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(err) => Err(Error::Task(err.to_string())),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run the comparison and return one [`TestPoint`] per page of the
    /// larger document.
    pub async fn exec(&mut self) -> Result<Vec<TestPoint>> {
        self.idle().await?;

        let expected_dir = self.image_dir.join("expected");
        let actual_dir = self.image_dir.join("actual");
        tokio::fs::create_dir_all(&expected_dir).await?;
        tokio::fs::create_dir_all(&actual_dir).await?;

        // Open the baseline through the cache and copy its pages into
        // the run's own artifact set.
        let mut baseline = None;
        let mut expected_num = 0;
        if self.expected.exists() {
            let doc = self.registry.open_document(&self.expected)?;
            let cache_dir = cache_dir_for(&self.cache_dir, &self.expected);
            let mut cache = PageCache::new(doc, cache_dir);
            expected_num = cache.open().await?;
            let was_valid = cache.is_valid();

            for i in 0..expected_num {
                if !was_valid {
                    self.emit(Action::Preparing, Progress::at(i + 1, expected_num));
                }
                self.emit(Action::Copying, Progress::at(i + 1, expected_num));
                let png = cache.get_png(i).await?;
                self.spawn_write(expected_dir.join(format!("{i}.png")), png);
            }

            if expected_num > 0 {
                cache.commit().await?;
            }
            baseline = Some(cache);
        } else {
            debug!("expected file {} not found", self.expected.display());
        }

        // The actual document changes every run, so it is never cached.
        let mut actual_doc = None;
        let mut actual_num = 0;
        if self.actual.exists() {
            let mut doc = self.registry.open_document(&self.actual)?;
            actual_num = doc.open()?;
            actual_doc = Some(doc);
        } else {
            debug!("actual file {} not found", self.actual.display());
        }

        let page_num = expected_num.max(actual_num);
        let mut points = Vec::with_capacity(page_num);

        for i in 0..page_num {
            let expected_path = expected_dir.join(format!("{i}.png"));
            let actual_path = actual_dir.join(format!("{i}.png"));
            let diff_path = self.image_dir.join(format!("{i}.png"));
            let progress = Progress::at(i + 1, page_num);

            self.emit(Action::Converting, progress.clone());
            let mut actual_image = None;
            if i < actual_num {
                if let Some(doc) = actual_doc.as_mut() {
                    let image = doc.render_page(i)?;
                    self.spawn_write(actual_path.clone(), encode_png(&image)?);
                    actual_image = Some(image);
                }
            }

            let name = actual_doc
                .as_ref()
                .and_then(|doc| doc.page_title(i))
                .unwrap_or_else(|| format!("Page {}", i + 1));

            self.emit(Action::Comparing, progress.clone());
            // A failure to fetch or diff one page is reported through
            // the callback and leaves its ratio as NaN; the run goes on.
            let mut page_error = None;
            let expected_image = match (&mut baseline, i < expected_num) {
                (Some(cache), true) => match cache.get_image(i).await {
                    Ok(page) => Some(page.image),
                    Err(err) => {
                        page_error = Some(err);
                        None
                    }
                },
                _ => None,
            };

            let mut ratio = f64::NAN;
            let mut diff_artifact = None;
            match (expected_image, actual_image) {
                _ if page_error.is_some() => {}
                (Some(expected), Some(actual)) => {
                    let outcome =
                        compare_images(&expected, &actual, &self.diff_options).and_then(|cmp| {
                            let png = if cmp.diff > 0 {
                                Some(encode_png(&cmp.image)?)
                            } else {
                                None
                            };
                            Ok((cmp.diff, cmp.dimension, png))
                        });
                    match outcome {
                        Ok((diff, dimension, png)) => {
                            ratio = diff as f64 / dimension as f64;
                            if let Some(bytes) = png {
                                self.spawn_write(diff_path.clone(), bytes);
                                diff_artifact = Some(diff_path);
                            }
                        }
                        Err(err) => page_error = Some(err),
                    }
                }
                // Page exists on one side only: maximal difference.
                _ => ratio = 1.0,
            }

            if let Some(err) = page_error {
                let mut failed = progress;
                failed.error = Some(err.to_string());
                self.emit(Action::Comparing, failed);
            }

            points.push(TestPoint {
                name,
                expected: expected_path,
                actual: actual_path,
                diff: diff_artifact,
                ratio,
            });
        }

        if let Some(mut cache) = baseline {
            cache.close()?;
        }
        if let Some(mut doc) = actual_doc {
            doc.close()?;
        }

        Ok(points)
    }

    fn emit(&mut self, action: Action, progress: Progress) {
        if let Some(cb) = self.on_progress.as_mut() {
            cb(action, &progress);
        }
    }

    fn spawn_write(&mut self, path: PathBuf, bytes: Vec<u8>) {
        self.pending.spawn(async move {
            tokio::fs::write(&path, bytes).await?;
            debug!("wrote {}", path.display());
            Ok(())
        });
    }
}

/// Compare two documents, wait for all artifacts to reach disk, and
/// return the per-page differences.
pub async fn compare(
    registry: Arc<CapabilityRegistry>,
    expected: impl Into<PathBuf>,
    actual: impl Into<PathBuf>,
    options: ComparisonOptions,
) -> Result<Vec<TestPoint>> {
    let mut comparator = Comparator::new(registry, expected, actual, options);
    let points = comparator.exec().await?;
    comparator.idle().await?;
    Ok(points)
}

/// Default artifact directory for a file: a sibling directory named
/// after the file's stem.
pub(crate) fn artifact_dir_for(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default();
    match path.parent() {
        Some(parent) => parent.join(stem),
        None => PathBuf::from(stem),
    }
}

/// Cache subdirectory for a source file: its artifact path re-rooted
/// under the cache directory, with root/prefix components stripped so
/// absolute sources nest instead of escaping.
fn cache_dir_for(cache_root: &Path, source: &Path) -> PathBuf {
    let mut dir = cache_root.to_path_buf();
    for component in artifact_dir_for(source).components() {
        if let Component::Normal(part) = component {
            dir.push(part);
        }
    }
    dir
}
