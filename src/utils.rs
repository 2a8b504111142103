use crate::error::Res;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Write a file.
pub(crate) async fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Res<()> {
    let path = path.as_ref();
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Unable to write to {}", path.display()))
}

/// Read a file to a `String`.
pub(crate) async fn read(path: &Path) -> Res<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at {}", path.display()))
}

/// Deserialize a JSON file into type `T`.
pub(crate) async fn deserialize<T>(path: &Path) -> Res<T>
where
    T: DeserializeOwned,
{
    let content = read(path).await?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON file at {}", path.display()))
}

/// Create a directory and its parents if they do not exist.
pub(crate) async fn make_dir(path: &Path) -> Res<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Unable to create directory {}", path.display()))
}

/// Resolve `path` to an absolute path. The path must exist.
pub(crate) async fn canonicalize(path: &Path) -> Res<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("Unable to resolve path {}", path.display()))
}

/// Read the non-blank lines of a file, trimmed.
pub(crate) async fn read_lines(path: &Path) -> Res<Vec<String>> {
    Ok(lines(&read(path).await?))
}

/// Split text into trimmed, non-blank lines.
pub(crate) fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_lines_skips_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fragments.txt");
        write(&path, "0.008\n\n  5000 \r\n(Jane K.)\n").await.unwrap();
        let lines = read_lines(&path).await.unwrap();
        assert_eq!(lines, vec!["0.008", "5000", "(Jane K.)"]);
    }

    #[tokio::test]
    async fn test_make_dir_and_canonicalize() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        make_dir(&nested).await.unwrap();
        let resolved = canonicalize(&nested).await.unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.is_dir());
    }
}
