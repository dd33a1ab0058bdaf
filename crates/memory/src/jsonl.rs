//! JSON-lines persistence shared by the file-backed stores.
//!
//! Files are read whole at open. New records are appended as one line;
//! updates and removals rewrite the file. Unparseable lines are skipped with
//! a warning rather than failing the load.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Load records from a JSONL file. A missing file is an empty store.
pub fn load<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted record");
                None
            }
        })
        .collect()
}

/// Serialize records, one per line.
pub fn encode<'a, T: Serialize + 'a>(
    records: impl IntoIterator<Item = &'a T>,
) -> Result<String, serde_json::Error> {
    let mut content = String::new();
    for record in records {
        content.push_str(&serde_json::to_string(record)?);
        content.push('\n');
    }
    Ok(content)
}

/// Replace the file's content, creating parent directories as needed.
pub async fn write(path: &Path, content: String) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Append one record as a line, creating the file and its parent
/// directories as needed.
pub async fn append<T: Serialize>(path: &Path, record: &T) -> std::io::Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Rec {
        n: u32,
    }

    #[tokio::test]
    async fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recs.jsonl");
        let recs = vec![Rec { n: 1 }, Rec { n: 2 }];

        write(&path, encode(&recs).unwrap()).await.unwrap();
        let loaded: Vec<Rec> = load(&path);
        assert_eq!(loaded, recs);
    }

    #[tokio::test]
    async fn append_adds_one_line_each() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recs.jsonl");

        append(&path, &Rec { n: 1 }).await.unwrap();
        append(&path, &Rec { n: 2 }).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"n\":1}\n{\"n\":2}\n");
        assert_eq!(load::<Rec>(&path), vec![Rec { n: 1 }, Rec { n: 2 }]);
    }

    #[test]
    fn corrupted_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recs.jsonl");
        std::fs::write(&path, "{\"n\":1}\nnot json\n\n{\"n\":3}\n").unwrap();

        let loaded: Vec<Rec> = load(&path);
        assert_eq!(loaded, vec![Rec { n: 1 }, Rec { n: 3 }]);
    }

    #[test]
    fn missing_file_is_empty() {
        let loaded: Vec<Rec> = load(Path::new("/nonexistent/recs.jsonl"));
        assert!(loaded.is_empty());
    }
}
