//! Discovery of the modules a consuming project depends on.
//!
//! The application's build emits small marker documents listing the native
//! modules it imports. Both marker kinds share one shape, a map from an
//! arbitrary key to a list of module names:
//!
//! ```json
//! { "entry": ["plugins/net/http", "component/web"] }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::fs::{Filesystem, file_name_of};
use crate::types::PackError;

/// Marker listing the UI components used by the application.
pub const COMPONENT_COLLECTION: &str = "component_collection.json";

/// Marker listing the API modules used by the application.
pub const MODULE_COLLECTION: &str = "module_collection.json";

/// Directory names never descended into below the scan root.
const SKIPPED_DIRS: &[&str] = &["build"];

/// Result of scanning a project tree for collection markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionScan {
    /// Every module name found, sorted and deduplicated.
    pub modules: BTreeSet<String>,
    /// Number of `component_collection.json` files read.
    pub component_files: usize,
    /// Number of `module_collection.json` files read.
    pub module_files: usize,
}

impl CollectionScan {
    /// Folds another scan into this one.
    pub fn merge(&mut self, other: CollectionScan) {
        self.modules.extend(other.modules);
        self.component_files += other.component_files;
        self.module_files += other.module_files;
    }
}

/// Walks `root` and merges the module names of every collection marker.
///
/// A missing root yields an empty scan. A marker that does not parse is a
/// configuration error naming the file.
pub fn scan_collections(root: &Path, fs: &dyn Filesystem) -> Result<CollectionScan, PackError> {
    let mut scan = CollectionScan::default();
    if !fs.is_dir(root) {
        tracing::debug!("collection root {} does not exist", root.display());
        return Ok(scan);
    }

    let mut visited = HashSet::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        if !visited.insert(fs.canonicalize(&dir)) {
            continue;
        }
        for entry in fs.read_dir(&dir)? {
            let name = file_name_of(&entry);
            if fs.is_dir(&entry) {
                if !SKIPPED_DIRS.contains(&name.as_str()) {
                    pending.push(entry);
                }
                continue;
            }
            match name.as_str() {
                COMPONENT_COLLECTION => scan.component_files += 1,
                MODULE_COLLECTION => scan.module_files += 1,
                _ => continue,
            }
            let names = read_marker(&entry, fs)?;
            tracing::debug!("{} lists {} module(s)", entry.display(), names.len());
            scan.modules.extend(names);
        }
    }

    tracing::info!(
        "found {} component and {} module collection file(s), {} module(s) requested",
        scan.component_files,
        scan.module_files,
        scan.modules.len()
    );
    Ok(scan)
}

fn read_marker(path: &Path, fs: &dyn Filesystem) -> Result<Vec<String>, PackError> {
    let text = fs.read_to_string(path)?;
    let groups: BTreeMap<String, Vec<String>> = serde_json::from_str(&text).map_err(|e| {
        PackError::Config(format!(
            "collection marker {} is not a map of module lists: {}",
            path.display(),
            e
        ))
    })?;
    Ok(groups.into_values().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn test_scan_merges_both_marker_kinds() {
        let fs = MemoryFs::new();
        fs.add_file(
            "/app/entry/component_collection.json",
            r#"{"entry": ["component/web", "component/video"]}"#,
        );
        fs.add_file(
            "/app/feature/deep/module_collection.json",
            r#"{"feature": ["plugins/net/http"], "other": ["component/web"]}"#,
        );
        fs.add_file("/app/entry/readme.txt", "not a marker");

        let scan = scan_collections(Path::new("/app"), &fs).unwrap();

        assert_eq!(scan.component_files, 1);
        assert_eq!(scan.module_files, 1);
        let names: Vec<&str> = scan.modules.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["component/video", "component/web", "plugins/net/http"]);
    }

    #[test]
    fn test_scan_skips_build_directories() {
        let fs = MemoryFs::new();
        fs.add_file("/app/entry/build/module_collection.json", r#"{"k": ["stale/module"]}"#);
        fs.add_file("/app/entry/module_collection.json", r#"{"k": ["plugins/net/http"]}"#);

        let scan = scan_collections(Path::new("/app"), &fs).unwrap();

        assert_eq!(scan.module_files, 1);
        assert!(!scan.modules.contains("stale/module"));
    }

    #[test]
    fn test_scan_root_named_build_is_walked() {
        let fs = MemoryFs::new();
        fs.add_file("/app/build/cache/module_collection.json", r#"{"k": ["plugins/net/http"]}"#);

        let scan = scan_collections(Path::new("/app/build"), &fs).unwrap();

        assert!(scan.modules.contains("plugins/net/http"));
    }

    #[test]
    fn test_malformed_marker_names_file() {
        let fs = MemoryFs::new();
        fs.add_file("/app/component_collection.json", r#"["flat", "list"]"#);

        let err = scan_collections(Path::new("/app"), &fs).unwrap_err();

        assert!(matches!(err, PackError::Config(_)));
        assert!(err.to_string().contains("/app/component_collection.json"));
    }

    #[test]
    fn test_scan_follows_symlink_once() {
        let fs = MemoryFs::new();
        fs.add_file("/app/entry/module_collection.json", r#"{"k": ["plugins/net/http"]}"#);
        fs.add_symlink("/app/entry/again", "/app");

        let scan = scan_collections(Path::new("/app"), &fs).unwrap();

        assert_eq!(scan.module_files, 1);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let fs = MemoryFs::new();
        let scan = scan_collections(Path::new("/nowhere"), &fs).unwrap();
        assert_eq!(scan, CollectionScan::default());
    }
}
