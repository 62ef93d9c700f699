//! Document capabilities: the contract a document type must satisfy
//!
//! The comparison engine only needs four things from a document: open it
//! and learn its page count, render a page to a raster image, fingerprint
//! its raw bytes, and close it. Concrete parsers (PDF, PNG, ...) live
//! behind this trait; the engine never inspects file contents itself.
//!
//! Capabilities are selected through an explicit [`CapabilityRegistry`]
//! populated at startup. There is no runtime module lookup: a format tag
//! (the lowercase file extension) maps to a factory registered by the
//! host application.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use crate::error::{Error, Result};
use crate::hash::{self, Encoding};

/// Minimal contract for one paginated document.
///
/// Implementations are synchronous; the engine layers async orchestration
/// on top and keeps all disk I/O of its own on the runtime. `open` must be
/// called before `render_page`. `close` releases parser resources and is
/// a no-op by default.
pub trait DocumentCapability: Send {
    /// Path of the source file this capability reads.
    fn source_path(&self) -> &Path;

    /// Open the document and return its page count.
    fn open(&mut self) -> Result<usize>;

    /// Render page `index` (0-based) to an RGBA raster image.
    fn render_page(&mut self, index: usize) -> Result<RgbaImage>;

    /// Human-readable title of page `index`, if the format carries one.
    fn page_title(&self, _index: usize) -> Option<String> {
        None
    }

    /// Fingerprint of the raw source bytes.
    ///
    /// The default hashes the file at [`source_path`](Self::source_path);
    /// formats backed by something other than a single file override this.
    fn fingerprint(&self, encoding: Encoding) -> Result<String> {
        hash::hash_file(self.source_path(), encoding)
    }

    /// Release any resources held by the parser.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Factory producing a capability for one source file.
pub type CapabilityFactory = Box<dyn Fn(&Path) -> Box<dyn DocumentCapability> + Send + Sync>;

/// Registry mapping a format tag to a capability factory.
///
/// Resolution happens once per document at open time; registration
/// happens at startup. Tags are matched against the lowercase file
/// extension of the source path.
#[derive(Default)]
pub struct CapabilityRegistry {
    factories: HashMap<String, CapabilityFactory>,
}

impl CapabilityRegistry {
    /// An empty registry with no formats.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in formats registered (`png`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("png", |path| Box::new(PngDocument::new(path)));
        registry
    }

    /// Register a factory for a format tag. Later registrations replace
    /// earlier ones for the same tag.
    pub fn register<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&Path) -> Box<dyn DocumentCapability> + Send + Sync + 'static,
    {
        self.factories
            .insert(tag.to_ascii_lowercase(), Box::new(factory));
    }

    /// True if a factory is registered for the tag.
    pub fn supports(&self, tag: &str) -> bool {
        self.factories.contains_key(&tag.to_ascii_lowercase())
    }

    /// Create a capability for the file based on its extension.
    ///
    /// This only constructs the capability; it does not open the file.
    pub fn open_document(&self, path: &Path) -> Result<Box<dyn DocumentCapability>> {
        let tag = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match self.factories.get(&tag) {
            Some(factory) => Ok(factory(path)),
            None => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A plain PNG file treated as a one-page document.
pub struct PngDocument {
    path: PathBuf,
    image: Option<RgbaImage>,
}

impl PngDocument {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            image: None,
        }
    }
}

impl DocumentCapability for PngDocument {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<usize> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| Error::Capability(format!("{}: {e}", self.path.display())))?;
        self.image = Some(decode_png(&bytes)?);
        Ok(1)
    }

    fn render_page(&mut self, index: usize) -> Result<RgbaImage> {
        match (index, &self.image) {
            (0, Some(image)) => Ok(image.clone()),
            (0, None) => Err(Error::Capability(format!(
                "{} is not open",
                self.path.display()
            ))),
            (n, _) => Err(Error::Capability(format!(
                "page {n} out of range for a single-image document"
            ))),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.image = None;
        Ok(())
    }
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Decode PNG bytes into an RGBA image.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(image.into_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba(rgba))
    }

    #[test]
    fn png_round_trip() {
        let original = solid(4, 3, [10, 20, 30, 255]);
        let bytes = encode_png(&original).unwrap();
        let decoded = decode_png(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn registry_rejects_unknown_formats() {
        let registry = CapabilityRegistry::with_defaults();
        let err = registry
            .open_document(Path::new("report.xyz"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn registry_is_case_insensitive() {
        let registry = CapabilityRegistry::with_defaults();
        assert!(registry.supports("PNG"));
        assert!(registry.open_document(Path::new("page.PNG")).is_ok());
    }

    #[test]
    fn png_document_is_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, encode_png(&solid(2, 2, [0, 0, 0, 255])).unwrap()).unwrap();

        let mut doc = PngDocument::new(&path);
        assert_eq!(doc.open().unwrap(), 1);
        let page = doc.render_page(0).unwrap();
        assert_eq!(page.dimensions(), (2, 2));
        assert!(doc.render_page(1).is_err());
        doc.close().unwrap();
    }

    #[test]
    fn open_reports_missing_file_as_capability_error() {
        let mut doc = PngDocument::new(Path::new("/nonexistent/page.png"));
        assert!(matches!(doc.open(), Err(Error::Capability(_))));
    }
}
