pub mod fireworks;
pub mod huggingface;
pub mod mock;
pub mod replicate;

pub use fireworks::FireworksGenerator;
pub use huggingface::HuggingFaceGenerator;
pub use mock::MockGenerator;
pub use replicate::ReplicateGenerator;

use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix under which the REST surface serves files from the images directory.
pub const IMAGE_ROUTE_PREFIX: &str = "/api/images";

pub(crate) fn random_seed() -> u64 {
    rand::thread_rng().gen_range(1..=999_999)
}

/// Writes generated bytes into `dir` and returns the URL they are served under.
pub(crate) async fn store_image(
    dir: &Path,
    filename: &str,
    bytes: &[u8],
) -> std::io::Result<String> {
    tokio::fs::create_dir_all(dir).await?;
    let path: PathBuf = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(format!("{IMAGE_ROUTE_PREFIX}/{filename}"))
}

/// File names are scoped by job so concurrent jobs never collide.
pub(crate) fn image_filename(prefix: &str, job_id: &str, index: u32, seed: u64, ext: &str) -> String {
    format!("{prefix}_{job_id}_{index}_{seed}.{ext}")
}

/// Deletes every file [`image_filename`] produced for `job_id`. A missing
/// directory means nothing was stored.
pub(crate) async fn remove_job_images(dir: &Path, job_id: &str) -> usize {
    let marker = format!("_{job_id}_");
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("Could not scan {} for job {}: {}", dir.display(), job_id, e);
            return 0;
        }
    };
    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Could not scan {} for job {}: {}", dir.display(), job_id, e);
                break;
            }
        };
        if !entry.file_name().to_string_lossy().contains(&marker) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove {}: {}", entry.path().display(), e),
        }
    }
    if removed > 0 {
        debug!("Removed {} image files for job {}", removed, job_id);
    }
    removed
}

pub(crate) fn truncate_body(body: String) -> String {
    const LIMIT: usize = 500;
    if body.chars().count() <= LIMIT {
        body
    } else {
        let cut: String = body.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}
