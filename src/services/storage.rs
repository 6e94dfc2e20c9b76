use crate::config::StorageConfig;
use crate::error::Error;
use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Flat directory of uploaded audio clips
#[derive(Debug, Clone)]
pub struct AudioStorage {
    root: PathBuf,
}

impl AudioStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.audio_dir.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an upload as `{uuid}_{basename}` and return the stored name
    pub async fn save(&self, original_filename: &str, data: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Io(format!("Failed to create audio directory: {}", e)))?;

        let stored_name = format!("{}_{}", Uuid::new_v4(), basename(original_filename));
        let path = self.root.join(&stored_name);

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Io(format!("Failed to write audio file {}: {}", path.display(), e)))?;

        info!("Stored audio file {} ({} bytes)", stored_name, data.len());

        Ok(stored_name)
    }

    /// Map a stored name to its path under the root. Anything that is not a
    /// single plain file name is refused.
    pub fn resolve(&self, stored_name: &str) -> Result<PathBuf, Error> {
        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None)
                if !stored_name.contains('/') && !stored_name.contains('\\') =>
            {
                Ok(self.root.join(name))
            }
            _ => Err(Error::NotFound(format!(
                "Audio file not available: {}",
                stored_name
            ))),
        }
    }

    /// Read a stored clip back
    pub async fn read(&self, stored_name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(stored_name)?;

        let data = tokio::fs::read(&path).await.map_err(|e| {
            debug!("Failed to read audio file {}: {}", path.display(), e);
            Error::NotFound(format!("Audio file not available: {}", stored_name))
        })?;

        Ok(data)
    }
}

/// Last path segment of a client supplied file name
fn basename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "..")
        .unwrap_or("audio")
}

/// Lowercased extension without the dot
pub fn extension_of(filename: &str) -> Option<String> {
    let name = basename(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &tempfile::TempDir) -> AudioStorage {
        AudioStorage::new(&StorageConfig {
            audio_dir: dir.path().join("audio"),
            ..StorageConfig::default()
        })
    }

    #[tokio::test]
    async fn save_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        let name = storage.save("../../clip.wav", b"RIFF").await.unwrap();
        assert!(name.ends_with("_clip.wav"));
        assert!(!name.contains('/'));
        assert_eq!(storage.read(&name).await.unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn traversal_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        for name in ["../secret", "/etc/passwd", "a/b.wav", "..", "a\\b.wav", ""] {
            let err = storage.read(name).await.unwrap_err();
            assert!(
                matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))),
                "{} was not refused",
                name
            );
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = storage(&dir).read("nope.wav").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
    }

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(extension_of("Clip.WAV").as_deref(), Some("wav"));
        assert_eq!(extension_of("dir/clip.tar.ogg").as_deref(), Some("ogg"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".wav"), None);
    }
}
