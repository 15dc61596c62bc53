use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::job::JobInput;
use crate::models::label::GroundTruth;

/// Image extensions recognized during batch discovery.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Write-once staging areas for submitted inputs.
///
/// Single uploads and extracted batch archives live in separate directories
/// so a failed extraction can never collide with unrelated uploads. Staged
/// files are written exactly once at submission time and only read
/// afterwards.
#[derive(Clone)]
pub struct Staging {
    uploads_dir: PathBuf,
    batches_dir: PathBuf,
    max_batch_size: usize,
}

impl Staging {
    pub fn new(data_dir: &Path, max_batch_size: usize) -> io::Result<Self> {
        let uploads_dir = data_dir.join("uploads");
        let batches_dir = data_dir.join("batches");
        fs::create_dir_all(&uploads_dir)?;
        fs::create_dir_all(&batches_dir)?;

        Ok(Self {
            uploads_dir,
            batches_dir,
            max_batch_size,
        })
    }

    /// Stage a single uploaded image, sniffing the format from the bytes.
    /// The upload keeps its basename under a per-upload directory so result
    /// payloads can reference the name the client sent.
    pub fn stage_single(&self, bytes: &[u8], original_name: &str) -> Result<PathBuf, SubmissionError> {
        image::guess_format(bytes).map_err(|_| SubmissionError::UnsupportedImage {
            name: original_name.to_string(),
        })?;

        // Only the basename is kept; anything path-like in the client's
        // filename must not escape the staging area.
        let basename = Path::new(original_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let dir = self.uploads_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;
        let path = dir.join(basename);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Extract a batch archive into its own staging directory and produce the
    /// ordered `(image, ground_truth?)` inputs for job creation.
    pub fn stage_batch(&self, archive: &[u8]) -> Result<Vec<JobInput>, SubmissionError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive))
            .map_err(|e| SubmissionError::InvalidArchive(e.to_string()))?;

        // Sidecar JSON files ride along with the images.
        if zip.len() > self.max_batch_size * 2 {
            return Err(SubmissionError::TooManyEntries {
                max: self.max_batch_size * 2,
            });
        }

        let dest = self.batches_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dest)?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| SubmissionError::InvalidArchive(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            // enclosed_name rejects paths escaping the extraction root.
            let Some(relative) = entry.enclosed_name() else {
                continue;
            };
            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }

        let inputs = discover_inputs(&dest)?;
        if inputs.is_empty() {
            return Err(SubmissionError::NoImages);
        }
        if inputs.len() > self.max_batch_size {
            return Err(SubmissionError::TooManyImages {
                found: inputs.len(),
                max: self.max_batch_size,
            });
        }

        Ok(inputs)
    }
}

/// Recursively discover images under an extracted archive directory, sorted
/// for deterministic processing order, each paired with its ground truth.
pub fn discover_inputs(dir: &Path) -> Result<Vec<JobInput>, SubmissionError> {
    let mut images = Vec::new();
    collect_images(dir, &mut images)?;
    images.sort();

    Ok(images
        .into_iter()
        .map(|image_path| {
            let ground_truth = load_ground_truth(&image_path);
            JobInput {
                image_path,
                ground_truth,
            }
        })
        .collect())
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if has_image_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Ground truth is paired by basename: `label1.jpg` -> `label1.json`. A
/// missing or unreadable sidecar degrades the item to structural-only
/// verification rather than failing the submission.
fn load_ground_truth(image_path: &Path) -> Option<GroundTruth> {
    let sidecar = image_path.with_extension("json");
    let raw = fs::read_to_string(&sidecar).ok()?;
    match parse_ground_truth(&raw) {
        Some(gt) => Some(gt),
        None => {
            tracing::warn!(path = %sidecar.display(), "Ignoring unparseable ground truth file");
            None
        }
    }
}

/// Parse a ground truth document, accepting both a flat object and one
/// wrapped under a `ground_truth` key.
pub fn parse_ground_truth(raw: &str) -> Option<GroundTruth> {
    let mut value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if let Some(nested) = value.get_mut("ground_truth") {
        value = nested.take();
    }
    serde_json::from_value(value).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("invalid or corrupt archive: {0}")]
    InvalidArchive(String),

    #[error("archive contains too many entries (max: {max})")]
    TooManyEntries { max: usize },

    #[error("no image files found in archive")]
    NoImages,

    #[error("too many images in batch: {found} (max: {max})")]
    TooManyImages { found: usize, max: usize },

    #[error("unsupported or unrecognized image format: {name}")]
    UnsupportedImage { name: String },

    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend(std::iter::repeat(0u8).take(64));
        bytes
    }

    #[test]
    fn pairs_ground_truth_by_basename() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"brand_name": "Stone Creek", "abv": 13.5}"#,
        )
        .unwrap();
        fs::write(dir.path().join("b.jpg"), jpeg_bytes()).unwrap();

        let inputs = discover_inputs(dir.path()).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(
            inputs[0].ground_truth.as_ref().unwrap().brand_name.as_deref(),
            Some("Stone Creek")
        );
        assert!(inputs[1].ground_truth.is_none());
    }

    #[test]
    fn accepts_nested_ground_truth_key() {
        let gt = parse_ground_truth(r#"{"ground_truth": {"brand_name": "Acme Ale"}}"#).unwrap();
        assert_eq!(gt.brand_name.as_deref(), Some("Acme Ale"));
    }

    #[test]
    fn discovery_is_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/z.png"), jpeg_bytes()).unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();

        let inputs = discover_inputs(dir.path()).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|i| i.image_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "z.png"]);
    }

    #[test]
    fn stage_single_rejects_non_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(dir.path(), 10).unwrap();
        let err = staging.stage_single(b"definitely not an image", "note.txt");
        assert!(matches!(err, Err(SubmissionError::UnsupportedImage { .. })));
    }

    #[test]
    fn stage_single_keeps_basename_only() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(dir.path(), 10).unwrap();

        let path = staging
            .stage_single(&jpeg_bytes(), "../../etc/label.jpg")
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "label.jpg");
        assert!(path.starts_with(dir.path().join("uploads")));
        assert!(path.exists());
    }
}
