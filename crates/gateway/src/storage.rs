//! Local filesystem attachment storage

use achievo_common::errors::Result;
use achievo_common::store::{FileMetadata, FileStorage};
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

/// Writes attachments under one directory, served back at `public_base_url`
pub struct LocalFileStorage {
    directory: PathBuf,
    public_base_url: String,
}

impl LocalFileStorage {
    pub fn new(directory: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            directory: directory.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Keep only the final path component and a conservative character set
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<String> {
        // Unique prefix so two uploads with the same name never collide
        let stored_name = format!(
            "{}_{}",
            Uuid::new_v4().simple(),
            sanitize_file_name(&metadata.file_name)
        );

        tokio::fs::create_dir_all(&self.directory).await?;
        tokio::fs::write(self.directory.join(&stored_name), bytes).await?;

        tracing::debug!(
            file = %stored_name,
            mime = %metadata.mime_type,
            bytes = bytes.len(),
            "Stored attachment"
        );

        Ok(format!("{}/{}", self.public_base_url, stored_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("certificate.pdf"), "certificate.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\my award.png"), "my_award.png");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[tokio::test]
    async fn test_store_writes_file_and_returns_url() {
        let dir = std::env::temp_dir().join(format!("achievo-upload-{}", Uuid::new_v4()));
        let storage = LocalFileStorage::new(&dir, "/uploads/");

        let url = storage
            .store(
                b"%PDF-1.4",
                &FileMetadata {
                    file_name: "award.pdf".into(),
                    mime_type: "application/pdf".into(),
                },
            )
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with("_award.pdf"));

        let stored = url.trim_start_matches("/uploads/");
        let bytes = tokio::fs::read(dir.join(stored)).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
