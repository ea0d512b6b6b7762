//! End-to-end packaging of a consuming project.
//!
//! [`Packager`] runs every step in order:
//!
//! 1. load the module catalog from the SDK;
//! 2. scan the project for collection markers;
//! 3. resolve the dependency closure;
//! 4. locate artifacts for every sub-project and architecture;
//! 5. copy them into place and record used and known names;
//! 6. report or prune stale artifacts;
//! 7. patch Xcode project descriptors (iOS only).
//!
//! Steps 1 to 4 only read. Configuration errors and an `abort` not-found
//! policy therefore fail the run before the project is modified.
//!
//! [`Packager::install_pods`] is the CocoaPods alternative for iOS
//! applications: it runs steps 1 to 4, then writes a podspec vendoring the
//! located frameworks from the SDK and references it from the Podfile.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::catalog::{CatalogSource, ModuleCatalog};
use crate::collection::{CollectionScan, scan_collections};
use crate::descriptor::{IdGenerator, ManagedNames, PatchOptions, PatchOutcome, UuidIds, patch_file};
use crate::fs::Filesystem;
use crate::layout::PlatformLayout;
use crate::locator::{LocatedArtifact, MissingArtifacts, file_type_of, locate};
use crate::placement::{
    Destinations, PlacementFailure, PlacementRecord, PlacementReport, known_artifacts, place,
};
use crate::podspec::{self, PODSPEC_FILE_NAME, PodfileEdit};
use crate::project;
use crate::reconcile::{StaleArtifact, StaleOutcome, reconcile};
use crate::resolver::{DEFAULT_BASE_MODULE, DependencyGraph, Resolver};
use crate::types::{ArchitectureTarget, BuildMode, NotFoundPolicy, PackError, PackageKind, Platform};
use crate::xcode::{FRAMEWORK_FILE_TYPE, framework_sections};

/// What to package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    /// Target platform.
    pub platform: Platform,
    /// Kind of project.
    pub kind: PackageKind,
    /// Build mode selecting artifact variants.
    pub mode: BuildMode,
    /// Requested ABIs or architectures; used when the project declares none.
    pub abis: Vec<String>,
}

/// Modules requested by the project and their closure.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Catalog the closure was computed against.
    pub catalog: ModuleCatalog,
    /// Collection markers found.
    pub scan: CollectionScan,
    /// Requested names: markers plus explicitly added modules.
    pub requested: BTreeSet<String>,
    /// Dependency closure.
    pub graph: DependencyGraph,
}

/// Placement outcome for one sub-project and architecture.
#[derive(Debug)]
pub struct TargetReport {
    /// Sub-project that received the artifacts.
    pub subproject: String,
    /// Architecture target.
    pub target: ArchitectureTarget,
    /// Number of artifacts located in the SDK.
    pub located: usize,
    /// Copies made and failed.
    pub placement: PlacementReport,
}

/// Patch outcome for one descriptor.
#[derive(Debug)]
pub struct DescriptorReport {
    /// Descriptor path.
    pub path: PathBuf,
    /// Patch result; a failure leaves the file unchanged.
    pub result: Result<PatchOutcome, PackError>,
}

/// Everything a packaging run did.
#[derive(Debug)]
pub struct PackageReport {
    /// Requested module names.
    pub requested: BTreeSet<String>,
    /// Resolved modules, in visit order.
    pub resolved: Vec<String>,
    /// Names not found in the catalog.
    pub unresolved: Vec<String>,
    /// Per-target placement.
    pub targets: Vec<TargetReport>,
    /// Missing artifacts that were reported.
    pub missing_artifacts: Vec<String>,
    /// Missing artifacts ignored under `ignore-all`.
    pub ignored_missing: usize,
    /// Stale artifacts found, and removed when pruning.
    pub stale: Vec<StaleArtifact>,
    /// Descriptor patches.
    pub descriptors: Vec<DescriptorReport>,
}

impl PackageReport {
    /// Number of artifacts copied.
    pub fn copied(&self) -> usize {
        self.targets.iter().map(|t| t.placement.copied.len()).sum()
    }

    /// Copies that failed.
    pub fn failed_copies(&self) -> impl Iterator<Item = &PlacementFailure> {
        self.targets.iter().flat_map(|t| t.placement.failures.iter())
    }

    /// Descriptors that could not be patched.
    pub fn failed_descriptors(&self) -> impl Iterator<Item = (&Path, &PackError)> {
        self.descriptors.iter().filter_map(|d| match &d.result {
            Ok(_) => None,
            Err(e) => Some((d.path.as_path(), e)),
        })
    }

    /// Stale artifacts whose removal failed.
    pub fn failed_removals(&self) -> impl Iterator<Item = (&Path, &PackError)> {
        self.stale.iter().filter_map(|s| match &s.outcome {
            StaleOutcome::RemoveFailed(e) => Some((s.path.as_path(), e)),
            _ => None,
        })
    }

    /// Whether every copy, removal and descriptor patch succeeded.
    pub fn is_success(&self) -> bool {
        self.failed_copies().next().is_none()
            && self.failed_descriptors().next().is_none()
            && self.failed_removals().next().is_none()
    }
}

/// Everything a CocoaPods installation did.
#[derive(Debug)]
pub struct PodsReport {
    /// Resolved modules, in visit order.
    pub resolved: Vec<String>,
    /// Names not found in the catalog.
    pub unresolved: Vec<String>,
    /// Vendored framework paths, relative to the SDK directory.
    pub frameworks: Vec<String>,
    /// Missing artifacts that were reported.
    pub missing_artifacts: Vec<String>,
    /// Missing artifacts ignored under `ignore-all`.
    pub ignored_missing: usize,
    /// Podspec written.
    pub podspec: PathBuf,
    /// Podfile referencing the pod.
    pub podfile: PathBuf,
    /// Whether the Podfile was modified.
    pub podfile_changed: bool,
}

struct TargetPlan {
    subproject: String,
    target: ArchitectureTarget,
    located: Vec<LocatedArtifact>,
}

/// Packages the runtime's native libraries into a consuming project.
///
/// # Example
///
/// ```ignore
/// use nativepack_sdk::{BuildMode, OsFs, PackageConfig, PackageKind, Packager, Platform};
///
/// let report = Packager::new("my-app", "/opt/arkui-x")
///     .prune(true)
///     .package(
///         &PackageConfig {
///             platform: Platform::Android,
///             kind: PackageKind::App,
///             mode: BuildMode::Release,
///             abis: vec![],
///         },
///         &OsFs,
///     )?;
/// println!("{} artifact(s) copied", report.copied());
/// ```
#[derive(Debug, Clone)]
pub struct Packager {
    project_dir: PathBuf,
    sdk_dir: PathBuf,
    catalog_sources: Vec<CatalogSource>,
    collection_roots: Vec<PathBuf>,
    modules: BTreeSet<String>,
    base_module: String,
    layout: PlatformLayout,
    policy: NotFoundPolicy,
    prune: bool,
}

impl Packager {
    /// Creates a packager for a project and an SDK directory.
    ///
    /// Defaults: the SDK's three standard catalog documents, collection
    /// markers scanned from the project directory, the published layout,
    /// the `ignore-all` policy and no pruning.
    pub fn new(project_dir: impl Into<PathBuf>, sdk_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.into();
        Self {
            catalog_sources: CatalogSource::sdk_defaults(sdk_dir.as_ref()),
            sdk_dir: sdk_dir.as_ref().to_path_buf(),
            collection_roots: vec![project_dir.clone()],
            project_dir,
            modules: BTreeSet::new(),
            base_module: DEFAULT_BASE_MODULE.to_string(),
            layout: PlatformLayout::default(),
            policy: NotFoundPolicy::default(),
            prune: false,
        }
    }

    /// Replaces the catalog documents.
    pub fn catalog_sources(mut self, sources: Vec<CatalogSource>) -> Self {
        self.catalog_sources = sources;
        self
    }

    /// Replaces the directories scanned for collection markers.
    pub fn collection_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.collection_roots = roots;
        self
    }

    /// Requests modules in addition to those found by the scan.
    pub fn modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.extend(modules.into_iter().map(Into::into));
        self
    }

    /// Sets the implicit base module. An empty name disables it.
    pub fn base_module(mut self, name: impl Into<String>) -> Self {
        self.base_module = name.into();
        self
    }

    /// Sets the platform layout.
    pub fn layout(mut self, layout: PlatformLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the not-found policy.
    pub fn not_found_policy(mut self, policy: NotFoundPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deletes stale artifacts and descriptor entries when enabled.
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Loads the catalog, scans the project and resolves the closure.
    pub fn resolve(&self, platform: Platform, fs: &dyn Filesystem) -> Result<Resolution, PackError> {
        let catalog = ModuleCatalog::load(&self.catalog_sources, fs)?;
        let unavailable = catalog.unavailable_on(platform);
        if !unavailable.is_empty() {
            tracing::debug!("not available on {}: {}", platform, unavailable.join(", "));
        }

        let mut scan = CollectionScan::default();
        for root in &self.collection_roots {
            scan.merge(scan_collections(root, fs)?);
        }
        let mut requested = scan.modules.clone();
        requested.extend(self.modules.iter().cloned());

        let graph = Resolver::new(&catalog)
            .base_module(self.base_module.clone())
            .resolve(&requested, platform);
        Ok(Resolution {
            catalog,
            scan,
            requested,
            graph,
        })
    }

    /// Runs a packaging pass with random descriptor identifiers.
    pub fn package(
        &self,
        config: &PackageConfig,
        fs: &dyn Filesystem,
    ) -> Result<PackageReport, PackError> {
        self.package_with_ids(config, fs, &mut UuidIds)
    }

    /// Runs a packaging pass with a caller-supplied identifier source.
    pub fn package_with_ids(
        &self,
        config: &PackageConfig,
        fs: &dyn Filesystem,
        ids: &mut dyn IdGenerator,
    ) -> Result<PackageReport, PackError> {
        self.layout.validate()?;
        tracing::info!(
            "packaging {} {} ({}) in {}",
            config.platform,
            config.kind.as_str(),
            config.mode,
            self.project_dir.display()
        );

        let resolution = self.resolve(config.platform, fs)?;
        let (plans, missing) = self.plan(config, &resolution, fs)?;

        let mut record = PlacementRecord::default();
        let mut targets = Vec::with_capacity(plans.len());
        for plan in plans {
            let arch = self.layout.for_target(&plan.target)?;
            let destinations =
                Destinations::new(&self.project_dir, &plan.subproject, &arch.destinations);
            tracing::info!(
                "placing {} artifact(s) for {} into {}",
                plan.located.len(),
                plan.target,
                plan.subproject
            );
            let placement = place(&plan.located, &destinations, fs, &mut record)?;
            known_artifacts(
                &resolution.catalog,
                &plan.target,
                &self.layout,
                &destinations,
                fs,
                &mut record,
            )?;
            targets.push(TargetReport {
                subproject: plan.subproject,
                target: plan.target,
                located: plan.located.len(),
                placement,
            });
        }

        let stale = reconcile(&record, self.prune, fs);
        let descriptors = self.patch_descriptors(config, &record, fs, ids)?;

        Ok(PackageReport {
            requested: resolution.requested,
            resolved: resolution.graph.names().to_vec(),
            unresolved: resolution.graph.missing().to_vec(),
            targets,
            missing_artifacts: missing.reported().to_vec(),
            ignored_missing: missing.ignored(),
            stale,
            descriptors,
        })
    }

    /// Vendors the closure's frameworks through CocoaPods instead of copying them.
    ///
    /// Writes `arkui-x.podspec` into the SDK directory and adds the pod to
    /// the application target of `.arkui-x/ios/Podfile`. The Podfile is read
    /// and edited before anything is written, so a Podfile without the
    /// target block leaves both files untouched.
    pub fn install_pods(
        &self,
        config: &PackageConfig,
        fs: &dyn Filesystem,
    ) -> Result<PodsReport, PackError> {
        if !config.platform.is_apple() || config.kind != PackageKind::App {
            return Err(PackError::Config(format!(
                "CocoaPods integration needs an iOS app, not {} {}",
                config.platform,
                config.kind.as_str()
            )));
        }
        self.layout.validate()?;
        tracing::info!("installing pods for {} in {}", config.platform, self.project_dir.display());

        let resolution = self.resolve(config.platform, fs)?;
        let mut missing = MissingArtifacts::new(self.policy);
        let mut located = Vec::new();
        let arches = project::architectures(
            &self.project_dir,
            project::IOS_APP_TARGET,
            config.platform,
            &config.abis,
            fs,
        )?;
        for arch in arches {
            let target = ArchitectureTarget::new(config.platform, arch, config.mode);
            located.extend(locate(&resolution.graph, &target, &self.layout, fs, &mut missing)?);
        }
        let frameworks = podspec::vendored_frameworks(&located, &self.sdk_dir);

        let podfile = project::podfile(&self.project_dir);
        let edit = podspec::add_pod(
            &fs.read_to_string(&podfile)?,
            project::IOS_APP_TARGET,
            &self.sdk_dir,
        )
        .map_err(|e| e.in_descriptor(&podfile))?;

        let podspec_path = self.sdk_dir.join(PODSPEC_FILE_NAME);
        fs.write_atomic(&podspec_path, &podspec::podspec(&frameworks))?;
        tracing::info!("wrote {} ({} framework(s))", podspec_path.display(), frameworks.len());
        let podfile_changed = match edit {
            PodfileEdit::Updated(text) => {
                fs.write_atomic(&podfile, &text)?;
                tracing::info!("updated {}", podfile.display());
                true
            }
            PodfileEdit::Unchanged => {
                tracing::debug!("{} already references the pod", podfile.display());
                false
            }
        };

        Ok(PodsReport {
            resolved: resolution.graph.names().to_vec(),
            unresolved: resolution.graph.missing().to_vec(),
            frameworks,
            missing_artifacts: missing.reported().to_vec(),
            ignored_missing: missing.ignored(),
            podspec: podspec_path,
            podfile,
            podfile_changed,
        })
    }

    /// Locates and validates every target before anything is written.
    fn plan(
        &self,
        config: &PackageConfig,
        resolution: &Resolution,
        fs: &dyn Filesystem,
    ) -> Result<(Vec<TargetPlan>, MissingArtifacts), PackError> {
        let subprojects = project::subprojects(&self.project_dir, config.platform, config.kind, fs)?;
        if subprojects.is_empty() {
            tracing::warn!(
                "no {} sub-projects found under {}",
                config.kind.as_str(),
                self.project_dir.display()
            );
        }

        let mut missing = MissingArtifacts::new(self.policy);
        let mut plans = Vec::new();
        for subproject in subprojects {
            let arches = project::architectures(
                &self.project_dir,
                &subproject,
                config.platform,
                &config.abis,
                fs,
            )?;
            for arch in arches {
                let target = ArchitectureTarget::new(config.platform, arch, config.mode);
                let located = locate(&resolution.graph, &target, &self.layout, fs, &mut missing)?;
                let arch_layout = self.layout.for_target(&target)?;
                Destinations::new(&self.project_dir, &subproject, &arch_layout.destinations)
                    .validate(&located)?;
                plans.push(TargetPlan {
                    subproject: subproject.clone(),
                    target,
                    located,
                });
            }
        }
        Ok((plans, missing))
    }

    fn patch_descriptors(
        &self,
        config: &PackageConfig,
        record: &PlacementRecord,
        fs: &dyn Filesystem,
        ids: &mut dyn IdGenerator,
    ) -> Result<Vec<DescriptorReport>, PackError> {
        let paths = project::descriptors(&self.project_dir, config.platform, config.kind, fs)?;
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let is_framework = |name: &&str| file_type_of(name) == FRAMEWORK_FILE_TYPE;
        let required: Vec<String> = record
            .all_used()
            .into_iter()
            .filter(is_framework)
            .map(str::to_string)
            .collect();
        let managed: BTreeSet<String> = record
            .all_known()
            .into_iter()
            .filter(is_framework)
            .map(str::to_string)
            .collect();
        let options = PatchOptions {
            prune: self.prune,
            managed: ManagedNames::Only(managed),
        };
        let sections = framework_sections(config.kind);

        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            let result = patch_file(&path, &required, &sections, &options, ids, fs);
            if let Err(e) = &result {
                tracing::warn!("{}", e);
            }
            reports.push(DescriptorReport { path, result });
        }
        Ok(reports)
    }
}
