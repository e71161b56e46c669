//! Profile image storage on the local filesystem.
//!
//! Uploads are checked against the extension allow-list and size limit,
//! decoded, flattened onto white, shrunk to fit the configured square and
//! letterboxed, then written under a unique `user_{id}_{hex}.{ext}` name.

use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::config::ImageConfig;
use crate::error::{RelgraphError, Result};

const STORED_PREFIX: &str = "user_";
const TEMP_SUFFIX: &str = ".tmp";

/// Writes, resolves and removes stored profile images.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    config: ImageConfig,
}

impl ImageStore {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Lowercased extension of `filename` when it is on the allow-list.
    pub fn allowed_extension(&self, filename: &str) -> Option<String> {
        let (_, ext) = filename.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        self.config
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            .then_some(ext)
    }

    /// Check name and size of an upload; returns its extension.
    pub fn validate(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        if filename.trim().is_empty() {
            return Err(RelgraphError::Validation("no file selected".to_string()));
        }
        let ext = self.allowed_extension(filename).ok_or_else(|| {
            RelgraphError::ImageProcessing(format!(
                "file type not allowed (accepted: {})",
                self.config.allowed_extensions.join(", ")
            ))
        })?;
        if bytes.len() > self.config.max_file_size {
            return Err(RelgraphError::ImageProcessing(format!(
                "file too large, maximum {}MB",
                self.config.max_file_size / (1024 * 1024)
            )));
        }
        if bytes.is_empty() {
            return Err(RelgraphError::ImageProcessing("file is empty".to_string()));
        }
        Ok(ext)
    }

    /// Decode `bytes` and normalize them to a white-backed square of the configured size.
    pub fn process(&self, bytes: &[u8]) -> Result<RgbImage> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| RelgraphError::ImageProcessing(format!("failed to decode image: {}", e)))?;
        let size = self.config.size;

        let mut flat = flatten_onto_white(&decoded);

        // shrink only, like a thumbnail
        if flat.width() > size || flat.height() > size {
            flat = DynamicImage::ImageRgb8(flat)
                .resize(size, size, FilterType::Lanczos3)
                .to_rgb8();
        }

        if flat.width() == size && flat.height() == size {
            return Ok(flat);
        }
        let mut canvas = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
        let x = (size - flat.width()) / 2;
        let y = (size - flat.height()) / 2;
        imageops::overlay(&mut canvas, &flat, x as i64, y as i64);
        Ok(canvas)
    }

    /// Encode a processed image in the format its extension names.
    pub fn encode(&self, image: &RgbImage, ext: &str) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        let dynamic = DynamicImage::ImageRgb8(image.clone());
        let encoded = match ext {
            "jpg" | "jpeg" => {
                let encoder = JpegEncoder::new_with_quality(&mut out, self.config.jpeg_quality);
                dynamic.write_with_encoder(encoder)
            }
            "png" => dynamic.write_to(&mut out, ImageFormat::Png),
            "gif" => DynamicImage::ImageRgba8(dynamic.to_rgba8()).write_to(&mut out, ImageFormat::Gif),
            "webp" => dynamic.write_to(&mut out, ImageFormat::WebP),
            other => {
                return Err(RelgraphError::ImageProcessing(format!("cannot encode .{} images", other)))
            }
        };
        encoded.map_err(|e| RelgraphError::ImageProcessing(format!("failed to encode image: {}", e)))?;
        Ok(out.into_inner())
    }

    /// Validate, process and store an upload for `persona_id`.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// a reader never sees a partial image. Returns the reference to record
    /// in `imagen_url`.
    pub fn save(&self, persona_id: i64, filename: &str, bytes: &[u8]) -> Result<String> {
        let ext = self.validate(filename, bytes)?;
        let processed = self.process(bytes)?;
        let encoded = self.encode(&processed, &ext)?;

        fs::create_dir_all(&self.config.folder)?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("{}{}_{}.{}", STORED_PREFIX, persona_id, &suffix[..8], ext);
        let final_path = self.config.folder.join(&file_name);
        let temp_path = self.config.folder.join(format!(".{}{}", file_name, TEMP_SUFFIX));

        if let Err(e) = fs::write(&temp_path, &encoded) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        log::info!("Stored image {} ({} bytes) for person {}", file_name, encoded.len(), persona_id);
        Ok(self.reference_for(&file_name))
    }

    /// `{url_prefix}/{file_name}`
    pub fn reference_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.config.url_prefix.trim_end_matches('/'), file_name)
    }

    /// Filesystem path a reference points to. `None` for references outside
    /// the image folder or that would escape it.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let prefix = self.config.url_prefix.trim_end_matches('/');
        let name = reference
            .trim_start_matches('/')
            .strip_prefix(prefix.trim_start_matches('/'))?
            .strip_prefix('/')?;
        if name.is_empty() || name.contains(&['/', '\\'][..]) || name.starts_with('.') {
            return None;
        }
        Some(self.config.folder.join(name))
    }

    /// Best-effort removal of a stored image. A missing file counts as removed;
    /// failures are logged and reported as `false`.
    pub fn delete(&self, reference: &str) -> bool {
        if reference.trim().is_empty() {
            return true;
        }
        let Some(path) = self.resolve(reference) else {
            log::warn!("Refusing to delete image outside {}: {}", self.config.url_prefix, reference);
            return false;
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Deleted image {}", path.display());
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                log::warn!("Failed to delete image {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Remove stored images that no person references, plus leftover temp files.
    /// Returns the number of files removed.
    pub fn sweep_orphans(&self, referenced: &HashSet<String>) -> Result<usize> {
        let entries = match fs::read_dir(&self.config.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let leftover_temp = name.starts_with('.') && name.ends_with(TEMP_SUFFIX);
            let orphan = name.starts_with(STORED_PREFIX) && !referenced.contains(&self.reference_for(&name));
            if !(leftover_temp || orphan) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    log::info!("Swept unreferenced image {}", name);
                    removed += 1;
                }
                Err(e) => log::warn!("Failed to sweep {}: {}", name, e),
            }
        }
        Ok(removed)
    }
}

/// Composite any transparency over a white background.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
