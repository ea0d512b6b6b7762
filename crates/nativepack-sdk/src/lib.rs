//! Native library packaging for ArkUI-X applications.
//!
//! `nativepack-sdk` copies the prebuilt native libraries of a cross-platform
//! UI runtime into the Android and iOS projects of an application, and keeps
//! the Xcode project descriptors in sync with what was copied.
//!
//! # Quick Start
//!
//! ```ignore
//! use nativepack_sdk::{BuildMode, OsFs, PackageConfig, PackageKind, Packager, Platform};
//!
//! fn main() -> Result<(), nativepack_sdk::PackError> {
//!     let report = Packager::new("my-app", "/opt/arkui-x/sdk")
//!         .prune(true)
//!         .package(
//!             &PackageConfig {
//!                 platform: Platform::Ios,
//!                 kind: PackageKind::App,
//!                 mode: BuildMode::Release,
//!                 abis: vec![],
//!             },
//!             &OsFs,
//!         )?;
//!
//!     println!("{} artifact(s) copied", report.copied());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Catalog**: module declarations shipped with the runtime SDK ([`catalog`])
//! - **Collection scan**: the modules an application asks for ([`collection`])
//! - **Resolver**: transitive dependency closure ([`resolver`])
//! - **Locator**: artifact variant selection per architecture ([`locator`], [`layout`])
//! - **Placement**: copying into the project and stale detection ([`placement`], [`reconcile`])
//! - **Descriptor patcher**: section-based edits of `project.pbxproj` ([`descriptor`], [`xcode`])
//! - **CocoaPods**: podspec generation and Podfile edits ([`podspec`])
//! - **Packager**: the whole pipeline ([`packager`])
//!
//! All filesystem access goes through the [`Filesystem`] trait. [`OsFs`] is
//! the real filesystem; [`MemoryFs`] backs tests.

pub mod catalog;
pub mod collection;
pub mod descriptor;
pub mod fs;
pub mod layout;
pub mod locator;
pub mod packager;
pub mod placement;
pub mod podspec;
pub mod project;
pub mod reconcile;
pub mod resolver;
pub mod types;
pub mod xcode;

pub use catalog::{CatalogSource, ModuleCatalog, ModuleDescriptor};
pub use collection::{CollectionScan, scan_collections};
pub use descriptor::{
    ArtifactIds, IdGenerator, ManagedNames, PatchOptions, PatchOutcome, PatchStage, SectionSpec,
    UuidIds, patch, patch_file,
};
pub use fs::{Filesystem, MemoryFs, OsFs, copy_tree};
pub use layout::{ArchLayout, PlatformLayout, VariantPriority};
pub use locator::{LocatedArtifact, MissingArtifacts, locate};
pub use packager::{
    DescriptorReport, PackageConfig, PackageReport, Packager, PodsReport, Resolution,
    TargetReport,
};
pub use placement::{
    Destinations, PlacementFailure, PlacementRecord, PlacementReport, known_artifacts, place,
};
pub use podspec::{PodfileEdit, add_pod};
pub use reconcile::{StaleArtifact, StaleOutcome, reconcile};
pub use resolver::{DEFAULT_BASE_MODULE, DependencyGraph, Resolver, resolve};
pub use types::{
    ArchitectureTarget, BuildMode, NotFoundPolicy, PackError, PackageKind, Platform,
};

/// Library version, matching `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
