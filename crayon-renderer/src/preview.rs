//! Preview thumbnails for saved progress.
//!
//! A preview is a small PNG of the composed canvas, uploaded alongside each
//! save so galleries can show the child's work without replaying the log.

use std::collections::HashMap;
use std::time::Instant;

use crayon_core::{Color, PreviewImage};

use crate::error::{RenderError, RenderResult};
use crate::pixels::PixelBuffer;

/// Default longest edge of a preview thumbnail.
pub const DEFAULT_PREVIEW_EDGE: u32 = 256;

/// Thumbnail settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Longest edge of the thumbnail in pixels.
    pub max_edge: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_PREVIEW_EDGE,
        }
    }
}

impl PreviewConfig {
    /// Create a config from `CRAYON_PREVIEW_EDGE`, falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let max_edge = std::env::var("CRAYON_PREVIEW_EDGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|edge: &u32| *edge > 0)
            .unwrap_or(DEFAULT_PREVIEW_EDGE);
        Self { max_edge }
    }

    /// Thumbnail size for a `width` x `height` source, keeping aspect ratio.
    ///
    /// Sources already within the limit keep their size.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= self.max_edge {
            return (width, height);
        }
        let scale = f64::from(self.max_edge) / f64::from(longest);
        let w = (f64::from(width) * scale).round() as u32;
        let h = (f64::from(height) * scale).round() as u32;
        (w.max(1), h.max(1))
    }
}

/// Render a PNG thumbnail of a canvas snapshot.
///
/// Transparent areas are flattened onto white.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be resampled or encoded.
pub fn render_preview(snapshot: &PixelBuffer, config: &PreviewConfig) -> RenderResult<PreviewImage> {
    let (w, h) = config.fit(snapshot.width(), snapshot.height());
    let img = snapshot.clone().into_image()?;
    let thumb = image::imageops::thumbnail(&img, w, h);

    let mut thumb = PixelBuffer::from_image(thumb)?;
    thumb.flatten_onto(Color::WHITE);
    let bytes = thumb.encode_png()?;

    tracing::debug!(width = w, height = h, bytes = bytes.len(), "Rendered preview");
    Ok(PreviewImage::png(bytes, w, h))
}

/// Decode a preview back into pixels.
///
/// # Errors
///
/// Returns an error if the bytes are not a decodable image.
pub fn decode_preview(preview: &PreviewImage) -> RenderResult<PixelBuffer> {
    let buffer = PixelBuffer::decode(&preview.bytes)?;
    if buffer.width() != preview.width || buffer.height() != preview.height {
        return Err(RenderError::Decode(format!(
            "preview is {}x{}, expected {}x{}",
            buffer.width(),
            buffer.height(),
            preview.width,
            preview.height
        )));
    }
    Ok(buffer)
}

#[derive(Debug)]
struct CachedPreview {
    fingerprint: u64,
    preview: PreviewImage,
    last_accessed: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewCacheStats {
    /// Lookups that returned a preview.
    pub hits: u64,
    /// Lookups that found nothing or a stale entry.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

/// Previews keyed by image id, each tagged with the fill fingerprint it
/// was rendered from.
///
/// Owned by a session and cleared when the session ends. A lookup with a
/// different fingerprint is a miss.
#[derive(Debug)]
pub struct PreviewCache {
    entries: HashMap<String, CachedPreview>,
    max_entries: usize,
    stats: PreviewCacheStats,
}

impl Default for PreviewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewCache {
    /// Default entry limit.
    pub const DEFAULT_MAX_ENTRIES: usize = 32;

    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache holding at most `max_entries` previews.
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            stats: PreviewCacheStats::default(),
        }
    }

    /// Preview for `image_id`, if one was rendered from `fingerprint`.
    pub fn get(&mut self, image_id: &str, fingerprint: u64) -> Option<&PreviewImage> {
        match self.entries.get_mut(image_id) {
            Some(entry) if entry.fingerprint == fingerprint => {
                entry.last_accessed = Instant::now();
                self.stats.hits += 1;
                Some(&entry.preview)
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a preview, replacing any older one for the same image.
    pub fn insert(&mut self, image_id: impl Into<String>, fingerprint: u64, preview: PreviewImage) {
        let image_id = image_id.into();
        if !self.entries.contains_key(&image_id) {
            while self.entries.len() >= self.max_entries {
                self.evict_lru();
            }
        }
        self.entries.insert(
            image_id,
            CachedPreview {
                fingerprint,
                preview,
                last_accessed: Instant::now(),
            },
        );
    }

    /// Cached preview, or render and cache a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if `render` fails; nothing is cached then.
    pub fn get_or_render<F>(
        &mut self,
        image_id: &str,
        fingerprint: u64,
        render: F,
    ) -> RenderResult<PreviewImage>
    where
        F: FnOnce() -> RenderResult<PreviewImage>,
    {
        if let Some(preview) = self.get(image_id, fingerprint) {
            return Ok(preview.clone());
        }
        let preview = render()?;
        self.insert(image_id, fingerprint, preview.clone());
        Ok(preview)
    }

    /// Drop the preview for one image.
    pub fn invalidate(&mut self, image_id: &str) -> Option<PreviewImage> {
        self.entries.remove(image_id).map(|e| e.preview)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached previews.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit and miss counters.
    #[must_use]
    pub const fn stats(&self) -> &PreviewCacheStats {
        &self.stats
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_keeps_aspect() {
        let config = PreviewConfig { max_edge: 256 };
        assert_eq!(config.fit(1024, 512), (256, 128));
        assert_eq!(config.fit(300, 1200), (64, 256));
        assert_eq!(config.fit(100, 50), (100, 50));
        assert_eq!(config.fit(5000, 1), (256, 1));
    }

    #[test]
    fn test_render_preview_png() {
        let snapshot = PixelBuffer::filled(512, 256, Color::rgb(255, 0, 0)).expect("alloc");
        let preview = render_preview(&snapshot, &PreviewConfig::default()).expect("render");

        assert_eq!((preview.width, preview.height), (256, 128));
        assert_eq!(preview.content_type, "image/png");

        let decoded = decode_preview(&preview).expect("decode");
        assert_eq!(decoded.get(100, 60), Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn test_preview_flattens_transparency() {
        let snapshot = PixelBuffer::transparent(10, 10).expect("alloc");
        let preview = render_preview(&snapshot, &PreviewConfig::default()).expect("render");
        let decoded = decode_preview(&preview).expect("decode");
        assert_eq!(decoded.count_color(Color::WHITE), 100);
    }

    #[test]
    fn test_cache_fingerprint_mismatch_is_miss() {
        let mut cache = PreviewCache::new();
        cache.insert("dino", 7, PreviewImage::png(vec![1], 1, 1));

        assert!(cache.get("dino", 7).is_some());
        assert!(cache.get("dino", 8).is_none());
        assert!(cache.get("cat", 7).is_none());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_cache_evicts_least_recent() {
        let mut cache = PreviewCache::with_capacity(2);
        cache.insert("a", 1, PreviewImage::png(vec![1], 1, 1));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("b", 1, PreviewImage::png(vec![2], 1, 1));
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(cache.get("a", 1).is_some());
        cache.insert("c", 1, PreviewImage::png(vec![3], 1, 1));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b", 1).is_none());
        assert!(cache.get("a", 1).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_or_render_only_renders_once() {
        let mut cache = PreviewCache::new();
        let mut renders = 0;
        for _ in 0..3 {
            cache
                .get_or_render("dino", 1, || {
                    renders += 1;
                    Ok(PreviewImage::png(vec![9], 1, 1))
                })
                .expect("render");
        }
        assert_eq!(renders, 1);

        cache.invalidate("dino");
        assert!(cache.is_empty());
    }
}
