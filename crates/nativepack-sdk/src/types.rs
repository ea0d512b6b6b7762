//! Core types for nativepack-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`PackError`] - Error types for catalog, placement and descriptor operations
//! - [`Platform`] - Target platform (Android, iOS device, iOS simulator)
//! - [`BuildMode`] - Build mode selecting the artifact variant
//! - [`ArchitectureTarget`] - A (platform, CPU architecture, build mode) triple
//! - [`NotFoundPolicy`] - What to do when an artifact is missing from the SDK
//! - [`PackageKind`] - What kind of project is being packaged

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Error types for nativepack-sdk operations.
///
/// # Example
///
/// ```ignore
/// use nativepack_sdk::{ModuleCatalog, PackError};
///
/// match ModuleCatalog::load(&sources, &fs) {
///     Ok(catalog) => println!("{} modules", catalog.len()),
///     Err(PackError::Config(msg)) => eprintln!("bad SDK: {}", msg),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Malformed or missing catalog data, or an artifact file type with no
    /// destination mapping. Always fatal, raised before any file is mutated.
    #[error("configuration error: {0}. Check the SDK catalog and nativepack.toml")]
    Config(String),

    /// One or more artifacts could not be found under the `abort` policy.
    ///
    /// Lists every miss of the run, not only the first.
    #[error("library not found:\n  {}\n\nCheck that the SDK contains the requested build variant", .0.join("\n  "))]
    ArtifactNotFound(Vec<String>),

    /// An expected section marker is absent from a project descriptor.
    ///
    /// The descriptor is presumed malformed or written by an incompatible
    /// tool version. It is never partially rewritten.
    #[error("malformed project descriptor{}: {message}", location(.path))]
    DescriptorStructure {
        /// Descriptor file, when the text came from disk.
        path: Option<PathBuf>,
        /// Which marker was missing.
        message: String,
    },

    /// An I/O operation failed on a specific path.
    #[error("I/O error at {}: {source}. Check file paths and permissions", .path.display())]
    Io {
        /// Path being read, written or copied.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        /// Document that failed to parse.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

fn location(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}

impl PackError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Attaches a descriptor path to a structure error; other errors pass through.
    pub fn in_descriptor(self, descriptor: &Path) -> Self {
        match self {
            PackError::DescriptorStructure { path: None, message } => {
                PackError::DescriptorStructure {
                    path: Some(descriptor.to_path_buf()),
                    message,
                }
            }
            other => other,
        }
    }
}

/// Target platform for packaging.
///
/// # Example
///
/// ```
/// use nativepack_sdk::Platform;
///
/// assert_eq!(Platform::IosSimulator.as_str(), "ios-simulator");
/// assert_eq!(Platform::IosSimulator.catalog_key(), "ios");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Android (`.so` and `.jar` artifacts).
    Android,
    /// iOS device (`.xcframework` artifacts).
    Ios,
    /// iOS simulator. Shares the `ios` catalog entries.
    IosSimulator,
}

impl Platform {
    /// Returns the string representation of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::IosSimulator => "ios-simulator",
        }
    }

    /// Key used for `deps` and `library` lookups in catalog documents.
    pub fn catalog_key(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios | Platform::IosSimulator => "ios",
        }
    }

    /// Whether the platform uses Xcode project descriptors.
    pub fn is_apple(&self) -> bool {
        matches!(self, Platform::Ios | Platform::IosSimulator)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build mode selecting which artifact variants are preferred.
///
/// # Example
///
/// ```
/// use nativepack_sdk::BuildMode;
///
/// assert_eq!(BuildMode::default(), BuildMode::Release);
/// assert_eq!(BuildMode::Debug.as_str(), "debug");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Debug build.
    Debug,
    /// Release build.
    #[default]
    Release,
    /// Profiling build.
    Profile,
}

impl BuildMode {
    /// Returns the string representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
            BuildMode::Profile => "profile",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (platform, CPU architecture, build mode) triple.
///
/// The triple selects exactly one artifact variant per catalog template
/// through the variant-priority list of the platform layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchitectureTarget {
    /// Target platform.
    pub platform: Platform,
    /// CPU architecture as named by the native project (e.g. `arm64-v8a`).
    pub arch: String,
    /// Build mode.
    pub mode: BuildMode,
}

impl ArchitectureTarget {
    /// Creates a new target.
    pub fn new(platform: Platform, arch: impl Into<String>, mode: BuildMode) -> Self {
        Self {
            platform,
            arch: arch.into(),
            mode,
        }
    }
}

impl fmt::Display for ArchitectureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.platform, self.arch, self.mode)
    }
}

/// What to do when a located artifact does not exist in the SDK.
///
/// # Example
///
/// ```
/// use nativepack_sdk::NotFoundPolicy;
///
/// // Forward progress for platform-partial modules is the default.
/// assert_eq!(NotFoundPolicy::default(), NotFoundPolicy::IgnoreAll);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotFoundPolicy {
    /// Fail the run, after every module has been evaluated.
    Abort,
    /// Warn about each missing artifact and continue.
    Skip,
    /// Warn about the first missing artifact, then ignore misses for the rest of the run.
    #[default]
    IgnoreAll,
}

impl NotFoundPolicy {
    /// Returns the string representation of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundPolicy::Abort => "abort",
            NotFoundPolicy::Skip => "skip",
            NotFoundPolicy::IgnoreAll => "ignore-all",
        }
    }
}

/// Kind of project being packaged.
///
/// The kind decides which sub-projects receive artifacts and which
/// project descriptors are patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Application (Android `app` module or the iOS `app.xcodeproj`).
    App,
    /// Android library modules listed in `settings.gradle`.
    Aar,
    /// iOS framework projects.
    Framework,
    /// iOS xcframework projects.
    XcFramework,
}

impl PackageKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::App => "app",
            PackageKind::Aar => "aar",
            PackageKind::Framework => "framework",
            PackageKind::XcFramework => "xcframework",
        }
    }

    /// Whether descriptors of this kind embed frameworks into the bundle.
    pub fn embeds_frameworks(&self) -> bool {
        matches!(self, PackageKind::App)
    }
}
