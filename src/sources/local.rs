use async_trait::async_trait;
use std::path::PathBuf;

use super::TableSource;

/// Reads tables from files under a root directory.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TableSource for LocalSource {
    async fn read(&self, location: &str) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.root.join(location)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[tokio::test]
    async fn test_reads_relative_to_root() {
        let dir = env::temp_dir().join("bus_performance_local_source");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("t.csv"), b"a\n1\n").unwrap();

        let source = LocalSource::new(&dir);
        assert_eq!(source.read("t.csv").await.unwrap(), b"a\n1\n");
        assert!(source.read("missing.csv").await.is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
