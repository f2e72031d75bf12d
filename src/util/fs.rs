use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomically replaces `dst` with `content` using write-to-temp-then-rename.
///
/// The temporary file lives next to the destination so the final rename stays
/// on one filesystem. Readers of `dst` observe either the old content or the
/// complete new content, never a partial write.
///
/// On any failure the temporary file is removed and `dst` is left untouched.
pub fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(dst);

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // Fails if the name is taken (prevents symlink races)
        .open(&temp_path)?;

    let written = temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if dst.exists() {
        if let Err(e) = std::fs::remove_file(dst) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    std::fs::rename(&temp_path, dst).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}

/// SEC-009: Randomized temp filename so concurrent writers and symlink
/// planting cannot collide with our temporary file.
fn temp_path_for(dst: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let suffix = format!("tmp.{:x}.{:016x}", std::process::id(), nanos ^ rand::random::<u128>());
    let name = match dst.file_name() {
        Some(name) => format!(".{}.{}", name.to_string_lossy(), suffix),
        None => format!(".{}", suffix),
    };
    dst.with_file_name(name)
}
