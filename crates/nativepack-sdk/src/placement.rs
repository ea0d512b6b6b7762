//! Copying located artifacts into the consuming project.
//!
//! Placement keeps two sets per destination directory in a
//! [`PlacementRecord`]:
//!
//! - the *used* set, names actually copied during this run;
//! - the *known* set, every name the catalog could place there.
//!
//! The reconciler later treats `known - used` as stale. The known set means
//! "eligible for placement", not "previously placed": a known name may never
//! have been written to disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::catalog::ModuleCatalog;
use crate::fs::{Filesystem, copy_tree, file_name_of};
use crate::layout::{PlatformLayout, SUBDIR_PLACEHOLDER};
use crate::locator::{LocatedArtifact, file_type_of, select_variant};
use crate::types::{ArchitectureTarget, PackError};

/// Used and known artifact names per destination directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementRecord {
    used: BTreeMap<PathBuf, BTreeSet<String>>,
    known: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl PlacementRecord {
    /// Marks `name` as copied into `dir`.
    pub fn mark_used(&mut self, dir: &Path, name: impl Into<String>) {
        self.used.entry(dir.to_path_buf()).or_default().insert(name.into());
    }

    /// Marks `name` as placeable into `dir`.
    pub fn mark_known(&mut self, dir: &Path, name: impl Into<String>) {
        self.known.entry(dir.to_path_buf()).or_default().insert(name.into());
    }

    /// Names copied into `dir` this run.
    pub fn used_in(&self, dir: &Path) -> Option<&BTreeSet<String>> {
        self.used.get(dir)
    }

    /// Names the catalog could place into `dir`.
    pub fn known_in(&self, dir: &Path) -> Option<&BTreeSet<String>> {
        self.known.get(dir)
    }

    /// Used sets of every directory.
    pub fn used(&self) -> &BTreeMap<PathBuf, BTreeSet<String>> {
        &self.used
    }

    /// Known sets of every directory.
    pub fn known(&self) -> &BTreeMap<PathBuf, BTreeSet<String>> {
        &self.known
    }

    /// Every used name across directories.
    pub fn all_used(&self) -> BTreeSet<&str> {
        self.used.values().flatten().map(String::as_str).collect()
    }

    /// Every known name across directories.
    pub fn all_known(&self) -> BTreeSet<&str> {
        self.known.values().flatten().map(String::as_str).collect()
    }
}

/// Destination directories of one sub-project.
#[derive(Debug, Clone, Copy)]
pub struct Destinations<'a> {
    project_dir: &'a Path,
    subproject: &'a str,
    templates: &'a BTreeMap<String, String>,
}

impl<'a> Destinations<'a> {
    /// Binds destination templates to a project and sub-project.
    pub fn new(
        project_dir: &'a Path,
        subproject: &'a str,
        templates: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            project_dir,
            subproject,
            templates,
        }
    }

    /// Directory receiving artifacts of `file_type`, if one is configured.
    pub fn dir_for(&self, file_type: &str) -> Option<PathBuf> {
        self.templates
            .get(file_type)
            .map(|t| self.project_dir.join(t.replace(SUBDIR_PLACEHOLDER, self.subproject)))
    }

    /// Every destination directory, deduplicated.
    pub fn all_dirs(&self) -> BTreeSet<PathBuf> {
        self.templates
            .keys()
            .filter_map(|ty| self.dir_for(ty))
            .collect()
    }

    /// Fails if any artifact has a file type with no destination.
    pub fn validate(&self, located: &[LocatedArtifact]) -> Result<(), PackError> {
        for artifact in located {
            if self.dir_for(&artifact.file_type).is_none() {
                return Err(PackError::Config(format!(
                    "no destination configured for file type '{}' of {} (module {})",
                    artifact.file_type,
                    artifact.source.display(),
                    artifact.module
                )));
            }
        }
        Ok(())
    }
}

/// A copy that failed without stopping the others.
#[derive(Debug)]
pub struct PlacementFailure {
    /// Module that declared the artifact.
    pub module: String,
    /// Destination path.
    pub path: PathBuf,
    /// What went wrong.
    pub error: PackError,
}

/// Outcome of placing one target's artifacts.
#[derive(Debug, Default)]
pub struct PlacementReport {
    /// Destination paths written.
    pub copied: Vec<PathBuf>,
    /// Copies that failed.
    pub failures: Vec<PlacementFailure>,
}

/// Copies located artifacts into their destination directories.
///
/// Every file type is validated before anything is touched, so a missing
/// destination mapping leaves the project unchanged. Existing files are
/// overwritten and directory bundles are mirrored with [`copy_tree`].
///
/// A directory that cannot be created fails every artifact bound for it;
/// artifacts for other directories are still copied.
pub fn place(
    located: &[LocatedArtifact],
    destinations: &Destinations<'_>,
    fs: &dyn Filesystem,
    record: &mut PlacementRecord,
) -> Result<PlacementReport, PackError> {
    destinations.validate(located)?;
    let mut unwritable = BTreeMap::new();
    for dir in destinations.all_dirs() {
        if let Err(error) = fs.create_dir_all(&dir) {
            tracing::warn!("cannot create {}: {}", dir.display(), error);
            unwritable.insert(dir, error.to_string());
        }
    }

    let mut report = PlacementReport::default();
    for artifact in located {
        let Some(dir) = destinations.dir_for(&artifact.file_type) else {
            continue;
        };
        let dest = dir.join(&artifact.file_name);
        if let Some(reason) = unwritable.get(&dir) {
            report.failures.push(PlacementFailure {
                module: artifact.module.clone(),
                path: dest,
                error: PackError::io(&dir, std::io::Error::other(reason.clone())),
            });
            continue;
        }
        match replace_artifact(fs, &artifact.source, &dest) {
            Ok(()) => {
                tracing::debug!("copied {} -> {}", artifact.source.display(), dest.display());
                record.mark_used(&dir, artifact.file_name.clone());
                report.copied.push(dest);
            }
            Err(error) => {
                tracing::warn!("failed to copy {}: {}", artifact.source.display(), error);
                report.failures.push(PlacementFailure {
                    module: artifact.module.clone(),
                    path: dest,
                    error,
                });
            }
        }
    }
    Ok(report)
}

fn replace_artifact(fs: &dyn Filesystem, source: &Path, dest: &Path) -> Result<(), PackError> {
    if fs.is_dir(source) {
        if fs.exists(dest) && !fs.is_dir(dest) {
            fs.remove_file(dest)?;
        }
        copy_tree(fs, source, dest)?;
    } else {
        if fs.is_dir(dest) {
            fs.remove_dir_all(dest)?;
        }
        fs.copy_file(source, dest)?;
    }
    Ok(())
}

/// Adds every placeable catalog artifact of a target to the known set.
///
/// All catalog modules count, not only those in the dependency graph. An
/// artifact is placeable when one of its variants exists in the SDK and its
/// file type has a destination.
pub fn known_artifacts(
    catalog: &ModuleCatalog,
    target: &ArchitectureTarget,
    layout: &PlatformLayout,
    destinations: &Destinations<'_>,
    fs: &dyn Filesystem,
    record: &mut PlacementRecord,
) -> Result<(), PackError> {
    let variants = layout.for_target(target)?.variants.for_mode(target.mode);
    for module in catalog.iter() {
        for template in module.templates_for(target.platform) {
            let Some((source, _)) = select_variant(template, variants, fs) else {
                continue;
            };
            let name = file_name_of(&source);
            if let Some(dir) = destinations.dir_for(&file_type_of(&name)) {
                record.mark_known(&dir, name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModuleDescriptor;
    use crate::fs::MemoryFs;
    use crate::layout::{ArchLayout, VariantPriority};
    use crate::types::{BuildMode, Platform};

    fn templates() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("so".to_string(), "android/{subdir}/libs/arm64-v8a".to_string()),
            ("jar".to_string(), "android/{subdir}/libs".to_string()),
        ])
    }

    fn artifact(module: &str, source: &str) -> LocatedArtifact {
        let source = PathBuf::from(source);
        let file_name = file_name_of(&source);
        LocatedArtifact {
            module: module.to_string(),
            file_type: file_type_of(&file_name),
            file_name,
            source,
            variant: None,
        }
    }

    #[test]
    fn test_place_copies_and_records_used() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/libarkui.so", "new");
        fs.add_file("/sdk/adapter.jar", "jar");
        fs.add_file("/app/android/app/libs/arm64-v8a/libarkui.so", "old");
        let templates = templates();
        let dest = Destinations::new(Path::new("/app"), "app", &templates);
        let mut record = PlacementRecord::default();

        let report = place(
            &[artifact("engine", "/sdk/libarkui.so"), artifact("engine", "/sdk/adapter.jar")],
            &dest,
            &fs,
            &mut record,
        )
        .unwrap();

        assert_eq!(report.copied.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(
            fs.contents("/app/android/app/libs/arm64-v8a/libarkui.so").as_deref(),
            Some("new")
        );
        let so_dir = Path::new("/app/android/app/libs/arm64-v8a");
        assert!(record.used_in(so_dir).unwrap().contains("libarkui.so"));
        assert!(record.used_in(Path::new("/app/android/app/libs")).unwrap().contains("adapter.jar"));
    }

    #[test]
    fn test_unknown_file_type_copies_nothing() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/libarkui.so", "elf");
        fs.add_file("/sdk/icudt72l.dat", "icu");
        let templates = templates();
        let dest = Destinations::new(Path::new("/app"), "app", &templates);
        let mut record = PlacementRecord::default();

        let err = place(
            &[artifact("engine", "/sdk/libarkui.so"), artifact("icu", "/sdk/icudt72l.dat")],
            &dest,
            &fs,
            &mut record,
        )
        .unwrap_err();

        assert!(matches!(err, PackError::Config(_)));
        assert!(err.to_string().contains("'dat'"));
        assert!(!fs.exists(Path::new("/app/android/app/libs/arm64-v8a/libarkui.so")));
        assert!(!fs.exists(Path::new("/app/android")));
        assert_eq!(record, PlacementRecord::default());
    }

    #[test]
    fn test_failed_copy_does_not_stop_others() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/libgood.so", "elf");
        let templates = templates();
        let dest = Destinations::new(Path::new("/app"), "app", &templates);
        let mut record = PlacementRecord::default();

        // Located earlier, deleted from the SDK before the copy.
        let report = place(
            &[artifact("gone", "/sdk/libgone.so"), artifact("good", "/sdk/libgood.so")],
            &dest,
            &fs,
            &mut record,
        )
        .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].module, "gone");
        assert_eq!(report.copied.len(), 1);
        let used = record.all_used();
        assert!(used.contains("libgood.so"));
        assert!(!used.contains("libgone.so"));
    }

    #[test]
    fn test_unwritable_directory_fails_only_its_artifacts() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/libarkui.so", "elf");
        fs.add_file("/sdk/libhttp.so", "elf");
        fs.add_file("/sdk/adapter.jar", "jar");
        // A file where the ABI directory should be.
        fs.add_file("/app/android/app/libs/arm64-v8a", "not a directory");
        let templates = templates();
        let dest = Destinations::new(Path::new("/app"), "app", &templates);
        let mut record = PlacementRecord::default();

        let report = place(
            &[
                artifact("engine", "/sdk/libarkui.so"),
                artifact("engine", "/sdk/adapter.jar"),
                artifact("http", "/sdk/libhttp.so"),
            ],
            &dest,
            &fs,
            &mut record,
        )
        .unwrap();

        let failed: Vec<&str> = report.failures.iter().map(|f| f.module.as_str()).collect();
        assert_eq!(failed, vec!["engine", "http"]);
        assert!(matches!(report.failures[0].error, PackError::Io { .. }));
        assert_eq!(report.copied, vec![PathBuf::from("/app/android/app/libs/adapter.jar")]);
        assert_eq!(record.all_used(), BTreeSet::from(["adapter.jar"]));
    }

    #[test]
    fn test_directory_artifact_is_mirrored() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/libarkui.xcframework/Info.plist", "plist");
        fs.add_file("/sdk/libarkui.xcframework/ios-arm64/libarkui.a", "ar");
        let templates = BTreeMap::from([(
            "xcframework".to_string(),
            ".arkui-x/{subdir}/frameworks".to_string(),
        )]);
        let dest = Destinations::new(Path::new("/app"), "ios", &templates);
        let mut record = PlacementRecord::default();

        place(
            &[artifact("engine", "/sdk/libarkui.xcframework")],
            &dest,
            &fs,
            &mut record,
        )
        .unwrap();

        assert_eq!(
            fs.contents("/app/.arkui-x/ios/frameworks/libarkui.xcframework/ios-arm64/libarkui.a")
                .as_deref(),
            Some("ar")
        );
    }

    #[test]
    fn test_known_set_covers_whole_catalog() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/release/liba.so", "a");
        fs.add_file("/sdk/release/libb.so", "b");
        let catalog = ModuleCatalog::from_modules(["a", "b", "c"].map(|name| ModuleDescriptor {
            module: name.to_string(),
            deps: BTreeMap::new(),
            library: BTreeMap::from([(
                "android".to_string(),
                vec![format!("/sdk/arch_type/lib{name}.so")],
            )]),
        }));
        let mut layout = PlatformLayout::empty();
        layout.set(
            Platform::Android,
            "arm64-v8a",
            ArchLayout {
                variants: VariantPriority {
                    release: vec!["release".into()],
                    ..Default::default()
                },
                destinations: templates(),
            },
        );
        let target = ArchitectureTarget::new(Platform::Android, "arm64-v8a", BuildMode::Release);
        let templates = templates();
        let dest = Destinations::new(Path::new("/app"), "app", &templates);
        let mut record = PlacementRecord::default();

        known_artifacts(&catalog, &target, &layout, &dest, &fs, &mut record).unwrap();

        let known = record.known_in(Path::new("/app/android/app/libs/arm64-v8a")).unwrap();
        let names: Vec<&str> = known.iter().map(String::as_str).collect();
        // libc.so has no variant in the SDK, so it is not placeable.
        assert_eq!(names, vec!["liba.so", "libb.so"]);
        assert!(record.used().is_empty());
    }
}
