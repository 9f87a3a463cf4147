use anyhow::Context;
use std::path::{Path, PathBuf};

/// Reduces a client-supplied file name to its final path component. Returns `None` for
/// names that cannot be stored safely.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return None;
    }
    Some(name.to_string())
}

/// Writes an uploaded file into `data_dir`, replacing any file with the same name.
pub async fn save_upload(data_dir: &Path, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let name = sanitize_file_name(file_name)
        .with_context(|| format!("invalid upload file name: {file_name:?}"))?;

    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let path = data_dir.join(&name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write upload {}", path.display()))?;

    tracing::info!(path = %path.display(), size = bytes.len(), "stored upload");
    Ok(path)
}
