//! Screenshot and metadata files on disk

use super::CaptureError;
use crate::model::{CaptureMetadata, Viewport};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Writes `{service}-{timestamp}.png` images, which accumulate, and one
/// `{service}-metadata.json` per service, which is overwritten each time.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), CaptureError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CaptureError::Artifact {
                path: self.dir.clone(),
                source,
            })
    }

    pub fn image_path(&self, service: &str, timestamp: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.png", safe_file_stem(service), timestamp))
    }

    pub fn metadata_path(&self, service: &str) -> PathBuf {
        self.dir
            .join(format!("{}-metadata.json", safe_file_stem(service)))
    }

    pub async fn save(
        &self,
        service: &str,
        url: &str,
        image: &[u8],
        viewport: Viewport,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureMetadata, CaptureError> {
        let timestamp = file_timestamp(captured_at);
        let filepath = self.write_image(service, &timestamp, image).await?;

        let metadata = CaptureMetadata {
            service: service.to_string(),
            url: url.to_string(),
            timestamp,
            filepath,
            viewport,
        };

        let metadata_path = self.metadata_path(service);
        let json = serde_json::to_vec_pretty(&metadata)?;
        fs::write(&metadata_path, json)
            .await
            .map_err(|source| CaptureError::Artifact {
                path: metadata_path.clone(),
                source,
            })?;

        debug!(service, path = %metadata.filepath.display(), "Saved capture artifact");
        Ok(metadata)
    }

    pub async fn load_metadata(&self, service: &str) -> Result<CaptureMetadata, CaptureError> {
        let path = self.metadata_path(service);
        let bytes = fs::read(&path)
            .await
            .map_err(|source| CaptureError::Artifact { path, source })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Never replaces an existing image: two captures of one service landing
    /// on the same millisecond get a numeric suffix.
    async fn write_image(
        &self,
        service: &str,
        timestamp: &str,
        image: &[u8],
    ) -> Result<PathBuf, CaptureError> {
        let mut path = self.image_path(service, timestamp);
        let mut suffix = 0u32;

        loop {
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(file) => {
                    write_or_discard(&path, file, image).await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    suffix += 1;
                    path = self.image_path(service, &format!("{}-{}", timestamp, suffix));
                }
                Err(source) => return Err(CaptureError::Artifact { path, source }),
            }
        }
    }
}

/// ISO-8601 with millisecond precision, `:` and `.` replaced by `-`
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-")
}

fn safe_file_stem(name: &str) -> String {
    name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// Writes `image` through `file`, removing the file at `path` if the write
/// does not complete.
async fn write_or_discard<W>(path: &Path, mut file: W, image: &[u8]) -> Result<(), CaptureError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(image).await?;
        file.flush().await
    }
    .await;
    drop(file);

    let Err(source) = written else {
        return Ok(());
    };

    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial image");
    }
    Err(CaptureError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::milliseconds(123)
    }

    #[test]
    fn test_file_timestamp() {
        assert_eq!(file_timestamp(at()), "2024-05-06T07-08-09-123Z");
    }

    #[test]
    fn test_paths() {
        let store = ArtifactStore::new("/shots");
        assert_eq!(
            store.image_path("web", "2024-05-06T07-08-09-123Z"),
            PathBuf::from("/shots/web-2024-05-06T07-08-09-123Z.png")
        );
        assert_eq!(
            store.metadata_path("web"),
            PathBuf::from("/shots/web-metadata.json")
        );
        assert_eq!(
            store.metadata_path("a/b:c"),
            PathBuf::from("/shots/a_b_c-metadata.json")
        );
    }

    #[tokio::test]
    async fn test_save_writes_image_and_metadata() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("screenshots"));
        store.ensure_dir().await.unwrap();

        let metadata = store
            .save("web", "http://localhost:8080", b"png-bytes", Viewport::default(), at())
            .await
            .unwrap();

        assert_eq!(metadata.timestamp, "2024-05-06T07-08-09-123Z");
        assert_eq!(std::fs::read(&metadata.filepath).unwrap(), b"png-bytes");

        let loaded = store.load_metadata("web").await.unwrap();
        assert_eq!(loaded, metadata);
    }

    #[tokio::test]
    async fn test_images_accumulate_and_metadata_is_overwritten() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        let first = store
            .save("web", "http://localhost:80", b"one", Viewport::default(), at())
            .await
            .unwrap();
        let second = store
            .save("web", "http://web:80", b"two", Viewport::default(), at())
            .await
            .unwrap();
        let later = store
            .save(
                "web",
                "http://web:80",
                b"three",
                Viewport::default(),
                at() + chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        assert_ne!(first.filepath, second.filepath);
        assert_eq!(std::fs::read(&first.filepath).unwrap(), b"one");
        assert_eq!(std::fs::read(&second.filepath).unwrap(), b"two");
        assert_eq!(std::fs::read(&later.filepath).unwrap(), b"three");

        let pngs = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
            .count();
        assert_eq!(pngs, 3);

        assert_eq!(store.load_metadata("web").await.unwrap(), later);
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::new(ErrorKind::Other, "disk full")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_image() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("web-2024-05-06T07-08-09-123Z.png");
        std::fs::write(&path, b"").unwrap();

        let err = write_or_discard(&path, BrokenPipe, b"png-bytes").await.unwrap_err();

        assert!(matches!(err, CaptureError::Artifact { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_successful_write_is_kept() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("web.png");
        let file = fs::File::create(&path).await.unwrap();

        write_or_discard(&path, file, b"png-bytes").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }
}
