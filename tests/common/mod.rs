#![allow(dead_code)]

//! Shared test helpers: a scripted multi-page document format.
//!
//! A `.strip` file is a plain text script, one page per line:
//! `WIDTH HEIGHT R G B`. Each page renders as a solid color. The factory
//! shares an atomic render counter so tests can assert how often pages
//! were actually rendered.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use pagediff::error::{Error, Result};
use pagediff::{CapabilityRegistry, DocumentCapability};

pub struct StripDocument {
    path: PathBuf,
    pages: Vec<(u32, u32, [u8; 3])>,
    renders: Arc<AtomicUsize>,
}

impl StripDocument {
    pub fn new(path: &Path, renders: Arc<AtomicUsize>) -> Self {
        Self {
            path: path.to_path_buf(),
            pages: Vec::new(),
            renders,
        }
    }
}

impl DocumentCapability for StripDocument {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<usize> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Capability(format!("{}: {e}", self.path.display())))?;
        self.pages = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let fields: Vec<u32> = line
                    .split_whitespace()
                    .map(|f| f.parse().map_err(|_| Error::Capability(format!("bad page spec: {line}"))))
                    .collect::<Result<_>>()?;
                match fields[..] {
                    [w, h, r, g, b] => Ok((w, h, [r as u8, g as u8, b as u8])),
                    _ => Err(Error::Capability(format!("bad page spec: {line}"))),
                }
            })
            .collect::<Result<_>>()?;
        Ok(self.pages.len())
    }

    fn render_page(&mut self, index: usize) -> Result<RgbaImage> {
        let (w, h, [r, g, b]) = *self
            .pages
            .get(index)
            .ok_or_else(|| Error::Capability(format!("page {index} out of range")))?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(RgbaImage::from_pixel(w, h, Rgba([r, g, b, 255])))
    }

    fn page_title(&self, index: usize) -> Option<String> {
        Some(format!("Strip page {}", index + 1))
    }

    fn close(&mut self) -> Result<()> {
        self.pages.clear();
        Ok(())
    }
}

/// A registry with the `strip` format wired to a shared render counter.
/// Also installs the test logger so `RUST_LOG` works in test runs.
pub fn strip_registry(renders: Arc<AtomicUsize>) -> Arc<CapabilityRegistry> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut registry = CapabilityRegistry::with_defaults();
    registry.register("strip", move |path| {
        Box::new(StripDocument::new(path, renders.clone()))
    });
    Arc::new(registry)
}

/// Write a strip file with the given solid-color pages.
pub fn write_strip(path: &Path, pages: &[(u32, u32, [u8; 3])]) {
    let mut text = String::new();
    for (w, h, [r, g, b]) in pages {
        text.push_str(&format!("{w} {h} {r} {g} {b}\n"));
    }
    std::fs::write(path, text).expect("write strip file");
}
