//! Host path composition
//!
//! Host paths are slash-separated strings relative to whatever root the
//! consuming node mounts. Local paths are host paths re-rooted under the
//! configured root. `..` is resolved lexically and may not climb above the
//! start of either.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Join a node storage path and a volume name into a cleaned host path.
///
/// `("/data//fast/", "pvc-1")` gives `"/data/fast/pvc-1"`.
pub fn host_path(node_storage_path: &str, volume_name: &str) -> Result<String> {
    if volume_name.is_empty()
        || volume_name == "."
        || volume_name == ".."
        || volume_name.contains('/')
    {
        return Err(Error::Configuration(format!(
            "volume name `{}` is not a single path component",
            volume_name
        )));
    }

    let mut parts = clean_components(node_storage_path).ok_or_else(|| {
        Error::Configuration(format!(
            "node storage path `{}` climbs above its base",
            node_storage_path
        ))
    })?;
    if parts.is_empty() {
        return Err(Error::Configuration(format!(
            "node storage path `{}` does not name a directory below the root",
            node_storage_path
        )));
    }
    parts.push(volume_name);

    let joined = parts.join("/");
    if node_storage_path.starts_with('/') {
        Ok(format!("/{}", joined))
    } else {
        Ok(joined)
    }
}

/// Re-root a host path under `root`. An absolute host path is taken relative
/// to `root`, never as a replacement for it.
pub fn local_path(root: &Path, host_path: &str) -> Option<PathBuf> {
    let parts = clean_components(host_path)?;
    if parts.is_empty() {
        return None;
    }
    let mut path = root.to_path_buf();
    path.extend(parts);
    Some(path)
}

/// Local directory of `volume_name` from the host path recorded on its
/// PersistentVolume. The host path must end in the volume's own directory
/// below at least one parent, so a malformed record never reaches a shared
/// storage directory.
pub fn volume_local_path(root: &Path, host_path: &str, volume_name: &str) -> Option<PathBuf> {
    let parts = clean_components(host_path)?;
    if parts.len() < 2 || parts.last() != Some(&volume_name) {
        return None;
    }
    let mut path = root.to_path_buf();
    path.extend(parts);
    Some(path)
}

/// Non-empty, non-`.` components with `..` resolved lexically; `None` if a
/// `..` climbs above the start.
fn clean_components(path: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_host_path_join() {
        assert_eq!(host_path("/data/fast", "pvc-123").unwrap(), "/data/fast/pvc-123");
        assert_eq!(host_path("/data//fast/", "pvc-1").unwrap(), "/data/fast/pvc-1");
        assert_eq!(host_path("data/./fast", "pvc-1").unwrap(), "data/fast/pvc-1");
    }

    #[test]
    fn test_host_path_resolves_parent_components() {
        assert_eq!(host_path("/data/../srv", "pvc-1").unwrap(), "/srv/pvc-1");
        assert_eq!(host_path("/data/fast/./..//slow", "pvc-1").unwrap(), "/data/slow/pvc-1");
    }

    #[test]
    fn test_host_path_rejects_traversal() {
        assert_matches!(host_path("/data", ".."), Err(Error::Configuration(_)));
        assert_matches!(host_path("/data", "a/b"), Err(Error::Configuration(_)));
        assert_matches!(host_path("/data", ""), Err(Error::Configuration(_)));
        assert_matches!(
            host_path("/data/../../etc", "pvc"),
            Err(Error::Configuration(msg)) => assert!(msg.contains("climbs above"))
        );
    }

    #[test]
    fn test_host_path_requires_node_directory() {
        assert_matches!(host_path("/", "pvc-1"), Err(Error::Configuration(_)));
        assert_matches!(host_path("/data/..", "pvc-1"), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_local_path_reroots_absolute_host_path() {
        let local = local_path(Path::new("/mnt"), "/data/fast/pvc-123").unwrap();
        assert_eq!(local, PathBuf::from("/mnt/data/fast/pvc-123"));

        let local = local_path(Path::new("/"), "/data/fast/pvc-123").unwrap();
        assert_eq!(local, PathBuf::from("/data/fast/pvc-123"));
    }

    #[test]
    fn test_local_path_rejects_escape_and_root() {
        assert_eq!(local_path(Path::new("/mnt"), "/data/../../etc"), None);
        assert_eq!(local_path(Path::new("/mnt"), "/"), None);
        assert_eq!(local_path(Path::new("/mnt"), ""), None);
    }

    #[test]
    fn test_volume_local_path_matches_volume_directory() {
        let root = Path::new("/mnt");
        assert_eq!(
            volume_local_path(root, "/data/fast/pvc-1", "pvc-1"),
            Some(PathBuf::from("/mnt/data/fast/pvc-1"))
        );
        assert_eq!(
            volume_local_path(root, "/data/x/../fast/pvc-1/", "pvc-1"),
            Some(PathBuf::from("/mnt/data/fast/pvc-1"))
        );
    }

    #[test]
    fn test_volume_local_path_rejects_shared_directories() {
        let root = Path::new("/mnt");
        assert_eq!(volume_local_path(root, "/data", "pvc-1"), None);
        assert_eq!(volume_local_path(root, "/pvc-1", "pvc-1"), None);
        assert_eq!(volume_local_path(root, "/data/fast", "pvc-1"), None);
        assert_eq!(volume_local_path(root, "/data/fast/pvc-other", "pvc-1"), None);
        assert_eq!(volume_local_path(root, "/data/fast/pvc-1/..", "pvc-1"), None);
        assert_eq!(volume_local_path(root, "/../data/pvc-1", "pvc-1"), None);
    }

    proptest! {
        #[test]
        fn prop_local_path_stays_under_root_and_node_path(
            segments in proptest::collection::vec("[a-z0-9]{1,8}", 1..4),
            volume in "pvc-[a-f0-9]{1,12}",
        ) {
            let node_path = format!("/{}", segments.join("/"));
            let host = host_path(&node_path, &volume).unwrap();
            let root = Path::new("/mnt/host");
            let local = local_path(root, &host).unwrap();

            prop_assert!(local.starts_with(root));
            prop_assert!(local.starts_with(root.join(node_path.trim_start_matches('/'))));
            prop_assert!(local.ends_with(&volume));
            prop_assert_eq!(volume_local_path(root, &host, &volume), Some(local));
        }
    }
}
