//! Fingerprint-addressed page cache for baseline documents
//!
//! Rendering a baseline is the expensive half of a comparison, so
//! rendered pages are persisted under a cache directory together with a
//! small JSON sidecar recording the page count and the source
//! fingerprint. As long as the source bytes are unchanged, later runs
//! read page images straight from disk and never open the document
//! capability at all.
//!
//! One cache directory has at most one writer at a time. The engine
//! upholds this by running comparisons sequentially; callers driving
//! comparisons themselves carry the same obligation. Read-only hits on a
//! valid cache are freely shareable.

use std::path::PathBuf;

use image::RgbaImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::capability::{decode_png, encode_png, DocumentCapability};
use crate::error::{Error, Result};
use crate::hash::Encoding;

const META_FILE: &str = ".meta";

/// Sidecar record of a cache directory.
///
/// The cache is valid only when both fields are present and the
/// fingerprint matches the live source document. A missing or corrupt
/// sidecar means an empty cache, never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheMeta {
    #[serde(rename = "pageNum", skip_serializing_if = "Option::is_none")]
    page_num: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

/// One rendered page, as decoded pixels plus the PNG bytes on disk.
pub struct CachedPage {
    pub image: RgbaImage,
    pub png: Vec<u8>,
}

/// On-disk store of rendered baseline pages for one source document.
///
/// Page files live at `<cacheDir>/<index>.png` with 0-based indices,
/// next to the sidecar. The fingerprint of the source is computed at
/// most once per instance.
pub struct PageCache {
    doc: Box<dyn DocumentCapability>,
    cache_dir: PathBuf,
    meta: Option<CacheMeta>,
    live_fingerprint: Option<String>,
    opened: bool,
}

impl PageCache {
    pub fn new(doc: Box<dyn DocumentCapability>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            doc,
            cache_dir: cache_dir.into(),
            meta: None,
            live_fingerprint: None,
            opened: false,
        }
    }

    /// Open the cache and return the baseline's page count.
    ///
    /// A present, matching sidecar makes the cache valid without ever
    /// opening the capability. Anything else (no sidecar, corrupt
    /// sidecar, fingerprint mismatch) opens the document and leaves the
    /// cache invalid until [`commit`](Self::commit).
    pub async fn open(&mut self) -> Result<usize> {
        let sidecar = self.read_sidecar().await?;

        if let (Some(page_num), Some(recorded)) = (sidecar.page_num, &sidecar.fingerprint) {
            if page_num > 0 && *recorded == self.fingerprint()? {
                debug!(
                    "cache hit for {}: {page_num} page(s)",
                    self.doc.source_path().display()
                );
                self.meta = Some(sidecar);
                return Ok(page_num);
            }
            debug!(
                "cache for {} is stale, re-rendering",
                self.doc.source_path().display()
            );
        }

        let page_num = self.doc.open()?;
        self.opened = true;
        self.meta = Some(CacheMeta {
            page_num: Some(page_num),
            fingerprint: None,
        });
        Ok(page_num)
    }

    /// True once a fingerprint match has been established, either by
    /// [`open`](Self::open) or by a committed render pass.
    pub fn is_valid(&self) -> bool {
        self.meta
            .as_ref()
            .is_some_and(|meta| meta.fingerprint.is_some())
    }

    /// Fetch page `index`, serving from the cache when possible.
    ///
    /// A valid cache with the page file present is a pure disk read. A
    /// missing page file on an otherwise valid cache regenerates only
    /// that page; the rest of the cache stays intact.
    pub async fn get_image(&mut self, index: usize) -> Result<CachedPage> {
        if let Some(png) = self.read_cached(index).await? {
            let image = decode_png(&png)?;
            return Ok(CachedPage { image, png });
        }
        let (image, png) = self.render_to_cache(index).await?;
        Ok(CachedPage { image, png })
    }

    /// Fetch page `index` as raw PNG bytes, without decoding on a cache
    /// hit. Used when the bytes are only copied elsewhere.
    pub async fn get_png(&mut self, index: usize) -> Result<Vec<u8>> {
        if let Some(png) = self.read_cached(index).await? {
            return Ok(png);
        }
        let (_, png) = self.render_to_cache(index).await?;
        Ok(png)
    }

    /// Cache-hit path: the raw PNG bytes, or `None` when the page has to
    /// be rendered.
    async fn read_cached(&mut self, index: usize) -> Result<Option<Vec<u8>>> {
        if !self.is_valid() {
            return Ok(None);
        }
        let path = self.image_path(index);
        match tokio::fs::read(&path).await {
            Ok(png) => Ok(Some(png)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("cached page {index} missing at {}, re-rendering", path.display());
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn render_to_cache(&mut self, index: usize) -> Result<(RgbaImage, Vec<u8>)> {
        self.ensure_open()?;
        let image = self.doc.render_page(index)?;
        let png = encode_png(&image)?;
        tokio::fs::write(self.image_path(index), &png).await?;
        Ok((image, png))
    }

    /// Finalize a render pass by writing the sidecar.
    ///
    /// Errors with [`Error::NothingToCommit`] before any page count is
    /// known. A second commit with the fingerprint already recorded is a
    /// no-op with no disk write.
    pub async fn commit(&mut self) -> Result<()> {
        let page_num = self.meta.as_ref().and_then(|meta| meta.page_num);
        match page_num {
            None | Some(0) => return Err(Error::NothingToCommit),
            Some(_) => {}
        }
        if self.is_valid() {
            return Ok(());
        }

        self.close()?;
        let fingerprint = self.fingerprint()?;
        if let Some(meta) = self.meta.as_mut() {
            meta.fingerprint = Some(fingerprint);
            let json = serde_json::to_vec(meta)?;
            tokio::fs::write(self.cache_dir.join(META_FILE), json).await?;
        }
        Ok(())
    }

    /// Delete the entire cache directory tree.
    ///
    /// A no-op when the sidecar does not exist, so a directory this
    /// cache never owned is left alone. Safe to call repeatedly.
    pub async fn clear(&mut self) -> Result<()> {
        if !self.cache_dir.join(META_FILE).exists() {
            return Ok(());
        }
        tokio::fs::remove_dir_all(&self.cache_dir).await?;
        self.meta = None;
        Ok(())
    }

    /// Release the capability's resources if it was ever opened. A valid
    /// cache that served every page from disk has nothing to release.
    pub fn close(&mut self) -> Result<()> {
        if self.opened {
            self.doc.close()?;
            self.opened = false;
        }
        Ok(())
    }

    /// The fingerprint of the live source document, memoized.
    pub fn fingerprint(&mut self) -> Result<String> {
        if let Some(fp) = &self.live_fingerprint {
            return Ok(fp.clone());
        }
        let fp = self.doc.fingerprint(Encoding::Hex)?;
        self.live_fingerprint = Some(fp.clone());
        Ok(fp)
    }

    fn ensure_open(&mut self) -> Result<()> {
        if !self.opened {
            self.doc.open()?;
            self.opened = true;
        }
        Ok(())
    }

    fn image_path(&self, index: usize) -> PathBuf {
        self.cache_dir.join(format!("{index}.png"))
    }

    /// Read the sidecar, creating the cache directory when absent.
    /// Corrupt contents are logged and treated as an empty cache.
    async fn read_sidecar(&self) -> Result<CacheMeta> {
        let meta_file = self.cache_dir.join(META_FILE);
        if !meta_file.exists() {
            if !self.cache_dir.exists() {
                tokio::fs::create_dir_all(&self.cache_dir).await?;
            }
            return Ok(CacheMeta::default());
        }

        let bytes = tokio::fs::read(&meta_file).await?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Ok(meta),
            Err(err) => {
                warn!("ignoring corrupt cache sidecar {}: {err}", meta_file.display());
                Ok(CacheMeta::default())
            }
        }
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("source", &self.doc.source_path())
            .field("cache_dir", &self.cache_dir)
            .field("valid", &self.is_valid())
            .finish()
    }
}
