//! Filesystem Adapters
//!
//! Implement the `VolumeFilesystem` port on the real filesystem and in
//! memory.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::VolumeFilesystem;
use crate::error::{Error, Result};

/// Directory operations on the local filesystem.
///
/// Permission bits are applied explicitly to every directory a call creates,
/// parents included, so the process umask never narrows them and never has
/// to be changed. Directories that already existed keep their mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VolumeFilesystem for LocalFilesystem {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let mut missing = Vec::new();
        for dir in path.ancestors() {
            if dir.as_os_str().is_empty() {
                break;
            }
            let exists = tokio::fs::try_exists(dir)
                .await
                .map_err(|e| Error::io(dir, e))?;
            if exists {
                break;
            }
            missing.push(dir);
        }

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode);

        builder
            .create(path)
            .await
            .map_err(|e| Error::io(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for dir in missing.iter().rev() {
                tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(mode))
                    .await
                    .map_err(|e| Error::io(dir, e))?;
            }
        }
        #[cfg(not(unix))]
        let _ = (mode, missing);

        debug!(path = %path.display(), mode = %format!("{:o}", mode), "Directory ready");
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Directory already absent");
                Ok(())
            }
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

/// In-memory directory tree for testing.
#[derive(Debug, Default)]
pub struct InMemoryFilesystem {
    dirs: RwLock<BTreeMap<PathBuf, u32>>,
    read_only: RwLock<bool>,
}

impl InMemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mutation fail with `PermissionDenied`.
    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.write() = read_only;
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.read().contains_key(path)
    }

    pub fn mode_of(&self, path: &Path) -> Option<u32> {
        self.dirs.read().get(path).copied()
    }

    /// Number of directories, parents included.
    pub fn len(&self) -> usize {
        self.dirs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.read().is_empty()
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if *self.read_only.read() {
            return Err(Error::io(path, ErrorKind::PermissionDenied.into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VolumeFilesystem for InMemoryFilesystem {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        self.check_writable(path)?;
        let mut dirs = self.dirs.write();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() || ancestor.parent().is_none() {
                continue;
            }
            dirs.entry(ancestor.to_path_buf()).or_insert(mode);
        }
        dirs.entry(path.to_path_buf()).or_insert(mode);
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        self.dirs.write().retain(|dir, _| !dir.starts_with(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_create_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let dir = tmp.path().join("data/fast/pvc-1");

        fs.create_dir_all(&dir, 0o777).await.unwrap();
        assert!(dir.is_dir());

        // existing directory is fine
        fs.create_dir_all(&dir, 0o777).await.unwrap();

        std::fs::write(dir.join("payload"), b"data").unwrap();
        fs.remove_dir_all(&dir).await.unwrap();
        assert!(!dir.exists());
        assert!(tmp.path().join("data/fast").is_dir());

        // missing directory is fine
        fs.remove_dir_all(&dir).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_mode_ignores_umask() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("pvc-mode");

        LocalFilesystem::new().create_dir_all(&dir, 0o777).await.unwrap();

        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_mode_applies_to_created_parents_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o700)).unwrap();
        let dir = tmp.path().join("data/fast/pvc-1");

        LocalFilesystem::new().create_dir_all(&dir, 0o777).await.unwrap();

        let mode_of = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode_of(&tmp.path().join("data")), 0o777);
        assert_eq!(mode_of(&tmp.path().join("data/fast")), 0o777);
        assert_eq!(mode_of(&dir), 0o777);
        assert_eq!(mode_of(tmp.path()), 0o700);
    }

    #[tokio::test]
    async fn test_local_create_error_carries_path() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        let target = file.join("pvc-1");
        let err = LocalFilesystem::new()
            .create_dir_all(&target, 0o777)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { ref path, .. } if *path == target));
    }

    #[tokio::test]
    async fn test_in_memory_tree() {
        let fs = InMemoryFilesystem::new();
        fs.create_dir_all(Path::new("/mnt/data/pvc-1"), 0o777).await.unwrap();
        fs.create_dir_all(Path::new("/mnt/data/pvc-2"), 0o700).await.unwrap();

        assert!(fs.contains(Path::new("/mnt")));
        assert!(fs.contains(Path::new("/mnt/data")));
        assert_eq!(fs.mode_of(Path::new("/mnt/data")), Some(0o777));
        assert_eq!(fs.mode_of(Path::new("/mnt/data/pvc-2")), Some(0o700));

        fs.remove_dir_all(Path::new("/mnt/data/pvc-1")).await.unwrap();
        assert!(!fs.contains(Path::new("/mnt/data/pvc-1")));
        assert!(fs.contains(Path::new("/mnt/data/pvc-2")));

        fs.set_read_only(true);
        assert!(fs.remove_dir_all(Path::new("/mnt/data/pvc-2")).await.is_err());
    }
}
