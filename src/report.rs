//! Report persistence
//!
//! Writers are plain trait objects registered under a format tag by the
//! host application at configuration time. The engine never looks a
//! writer up by module name at runtime; an unknown tag is an
//! [`Error::UnsupportedFormat`].

use std::collections::HashMap;
use std::path::Path;

use crate::batch::TestReport;
use crate::error::{Error, Result};

/// Serializes a [`TestReport`] into a directory.
pub trait ReportWriter: Send + Sync {
    fn write(&self, report: &TestReport, dir: &Path) -> Result<()>;
}

/// Writes `report.json`, pretty-printed.
#[derive(Debug, Default)]
pub struct JsonReportWriter;

impl ReportWriter for JsonReportWriter {
    fn write(&self, report: &TestReport, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(report)?;
        std::fs::write(dir.join("report.json"), json)?;
        Ok(())
    }
}

/// Format tag → writer table supplied by the host application.
pub struct ReportWriterRegistry {
    writers: HashMap<String, Box<dyn ReportWriter>>,
}

impl ReportWriterRegistry {
    /// A registry with the built-in `json` writer registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            writers: HashMap::new(),
        };
        registry.register("json", JsonReportWriter);
        registry
    }

    pub fn register<W: ReportWriter + 'static>(&mut self, tag: &str, writer: W) {
        self.writers
            .insert(tag.to_ascii_lowercase(), Box::new(writer));
    }

    pub fn write(&self, tag: &str, report: &TestReport, dir: &Path) -> Result<()> {
        match self.writers.get(&tag.to_ascii_lowercase()) {
            Some(writer) => writer.write(report, dir),
            None => Err(Error::UnsupportedFormat(tag.to_string())),
        }
    }
}

impl Default for ReportWriterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
