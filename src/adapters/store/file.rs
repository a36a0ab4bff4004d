//! JSON and JSON-lines file helpers shared by the stores

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub(crate) enum FileError {
    Io(io::Error),
    Serde(serde_json::Error),
}

impl From<io::Error> for FileError {
    fn from(e: io::Error) -> Self {
        FileError::Io(e)
    }
}

impl From<serde_json::Error> for FileError {
    fn from(e: serde_json::Error) -> Self {
        FileError::Serde(e)
    }
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Whole-file JSON array; a missing or empty file reads as empty
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FileError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Replace the file via temp file + rename
pub(crate) async fn write_json<T: Serialize>(path: &Path, items: &[T]) -> Result<(), FileError> {
    ensure_parent(path).await?;
    let json = serde_json::to_vec_pretty(items)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub(crate) async fn append_line<T: Serialize>(path: &Path, item: &T) -> Result<(), FileError> {
    ensure_parent(path).await?;
    let mut line = serde_json::to_vec(item)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

/// Every parseable line, in file order. A torn trailing line is skipped.
pub(crate) async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FileError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(item) => out.push(item),
            Err(e) => tracing::warn!("Skipping unreadable line {} in {}: {}", n + 1, path.display(), e),
        }
    }
    Ok(out)
}
