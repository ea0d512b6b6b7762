//! Detection and removal of artifacts left over from earlier runs.

use std::path::PathBuf;

use crate::fs::Filesystem;
use crate::placement::PlacementRecord;
use crate::types::PackError;

/// What happened to a stale artifact.
#[derive(Debug)]
pub enum StaleOutcome {
    /// Reported only; pruning was off.
    Reported,
    /// Deleted from disk.
    Removed,
    /// Deletion was attempted and failed.
    RemoveFailed(PackError),
}

/// An artifact the catalog could place but this run did not.
#[derive(Debug)]
pub struct StaleArtifact {
    /// Path inside the consuming project.
    pub path: PathBuf,
    /// Outcome.
    pub outcome: StaleOutcome,
}

impl StaleArtifact {
    /// Whether the artifact is gone from disk.
    pub fn removed(&self) -> bool {
        matches!(self.outcome, StaleOutcome::Removed)
    }
}

/// Reports, and with `prune` deletes, every `known - used` name that is on disk.
///
/// Names outside the known set are never looked at, so files the user put
/// into a destination directory by hand survive pruning. A known name that
/// is not on disk is not reported. Failed deletions are recorded without
/// stopping the others.
pub fn reconcile(record: &PlacementRecord, prune: bool, fs: &dyn Filesystem) -> Vec<StaleArtifact> {
    let mut stale = Vec::new();
    for (dir, known) in record.known() {
        let used = record.used_in(dir);
        for name in known {
            if used.is_some_and(|u| u.contains(name)) {
                continue;
            }
            let path = dir.join(name);
            if !fs.exists(&path) {
                continue;
            }
            let outcome = if prune {
                let removed = if fs.is_dir(&path) {
                    fs.remove_dir_all(&path)
                } else {
                    fs.remove_file(&path)
                };
                match removed {
                    Ok(()) => {
                        tracing::info!("removed unused {}", path.display());
                        StaleOutcome::Removed
                    }
                    Err(e) => {
                        tracing::warn!("could not remove {}: {}", path.display(), e);
                        StaleOutcome::RemoveFailed(e)
                    }
                }
            } else {
                tracing::warn!("{} is no longer used", path.display());
                StaleOutcome::Reported
            };
            stale.push(StaleArtifact { path, outcome });
        }
    }
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use std::path::Path;

    const LIBS: &str = "/app/android/app/libs/arm64-v8a";

    fn record() -> PlacementRecord {
        let dir = Path::new(LIBS);
        let mut record = PlacementRecord::default();
        for name in ["libarkui.so", "libhttp.so", "libweb.so", "libvideo.so"] {
            record.mark_known(dir, name);
        }
        record.mark_used(dir, "libarkui.so");
        record
    }

    fn project() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.add_file(format!("{LIBS}/libarkui.so"), "used");
        fs.add_file(format!("{LIBS}/libhttp.so"), "stale");
        fs.add_file(format!("{LIBS}/libweb.so"), "stale");
        fs.add_file(format!("{LIBS}/libcustom.so"), "user owned");
        fs
    }

    #[test]
    fn test_report_only_without_prune() {
        let fs = project();
        let stale = reconcile(&record(), false, &fs);

        let paths: Vec<PathBuf> = stale.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from(format!("{LIBS}/libhttp.so")),
                PathBuf::from(format!("{LIBS}/libweb.so")),
            ]
        );
        assert!(stale.iter().all(|s| !s.removed()));
        assert!(fs.exists(Path::new(&format!("{LIBS}/libhttp.so"))));
    }

    #[test]
    fn test_prune_never_touches_unknown_names() {
        let fs = project();
        let stale = reconcile(&record(), true, &fs);

        assert_eq!(stale.len(), 2);
        assert!(stale.iter().all(StaleArtifact::removed));
        assert!(!fs.exists(Path::new(&format!("{LIBS}/libhttp.so"))));
        assert!(!fs.exists(Path::new(&format!("{LIBS}/libweb.so"))));
        assert_eq!(fs.contents(format!("{LIBS}/libcustom.so")).as_deref(), Some("user owned"));
        assert_eq!(fs.contents(format!("{LIBS}/libarkui.so")).as_deref(), Some("used"));
    }

    #[test]
    fn test_known_but_absent_is_not_reported() {
        // libvideo.so is placeable but was never written to disk.
        let fs = project();
        let stale = reconcile(&record(), true, &fs);
        assert!(!stale.iter().any(|s| s.path.ends_with("libvideo.so")));
    }

    #[test]
    fn test_prune_removes_bundle_directories() {
        let fs = MemoryFs::new();
        let frameworks = Path::new("/app/.arkui-x/ios/frameworks");
        fs.add_file(frameworks.join("libold.xcframework/Info.plist"), "plist");
        let mut record = PlacementRecord::default();
        record.mark_known(frameworks, "libold.xcframework");

        let stale = reconcile(&record, true, &fs);

        assert_eq!(stale.len(), 1);
        assert!(stale[0].removed());
        assert!(!fs.exists(&frameworks.join("libold.xcframework")));
        assert!(fs.is_dir(frameworks));
    }
}
