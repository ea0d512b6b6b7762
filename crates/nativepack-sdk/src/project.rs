//! Layout of the consuming project's native sub-projects.
//!
//! Native projects live under `.arkui-x/` in the consuming project:
//!
//! ```text
//! .arkui-x/
//!   android/
//!     settings.gradle          # include ':app', ':mylib'
//!     app/build.gradle         # abiFilters "arm64-v8a", "x86_64"
//!   ios/
//!     app.xcodeproj/project.pbxproj
//!     Podfile                  # target 'app' do ... end
//!     frameworks/
//! ```

use std::path::{Path, PathBuf};

use crate::fs::{Filesystem, file_name_of};
use crate::types::{PackError, PackageKind, Platform};

/// Directory holding the native projects.
pub const NATIVE_DIR: &str = ".arkui-x";

/// ABI used when nothing else selects one.
pub const DEFAULT_ANDROID_ABI: &str = "arm64-v8a";

/// Architecture of iOS builds.
pub const IOS_ARCH: &str = "arm64";

/// Xcode project and target name of iOS applications.
pub const IOS_APP_TARGET: &str = "app";

/// Sub-projects that receive artifacts.
///
/// Applications go to `app` (Android) or `ios`; library projects go to every
/// module included in `settings.gradle` except `app`.
pub fn subprojects(
    project_dir: &Path,
    platform: Platform,
    kind: PackageKind,
    fs: &dyn Filesystem,
) -> Result<Vec<String>, PackError> {
    match (platform, kind) {
        (Platform::Android, PackageKind::App) => Ok(vec!["app".to_string()]),
        (Platform::Android, PackageKind::Aar) => {
            let settings = project_dir.join(NATIVE_DIR).join("android/settings.gradle");
            if !fs.exists(&settings) {
                return Ok(Vec::new());
            }
            Ok(gradle_includes(&fs.read_to_string(&settings)?)
                .into_iter()
                .filter(|name| name != "app")
                .collect())
        }
        (Platform::Ios | Platform::IosSimulator, PackageKind::Aar)
        | (Platform::Android, PackageKind::Framework | PackageKind::XcFramework) => {
            Err(PackError::Config(format!(
                "{} projects cannot be packaged for {}",
                kind.as_str(),
                platform
            )))
        }
        (Platform::Ios | Platform::IosSimulator, _) => Ok(vec!["ios".to_string()]),
    }
}

/// Module names from `include ':name'` lines.
pub fn gradle_includes(settings: &str) -> Vec<String> {
    settings
        .lines()
        .filter(|line| line.trim_start().starts_with("include"))
        .flat_map(|line| {
            line.split(['\'', '"'])
                .skip(1)
                .step_by(2)
                .map(|quoted| quoted.trim_start_matches(':').to_string())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Maps short ABI names to Android ABI directory names.
pub fn android_abi(name: &str) -> Option<&'static str> {
    match name {
        "arm64" | "arm64-v8a" => Some("arm64-v8a"),
        "arm" | "armeabi-v7a" => Some("armeabi-v7a"),
        "x86_64" => Some("x86_64"),
        _ => None,
    }
}

/// ABIs from the `abiFilters` line of a Gradle build script.
pub fn abi_filters(build_gradle: &str) -> Option<Vec<String>> {
    let line = build_gradle.lines().find(|l| l.contains("abiFilters"))?;
    let abis: Vec<String> = line
        .split(['\'', '"'])
        .skip(1)
        .step_by(2)
        .filter(|abi| !abi.is_empty())
        .map(str::to_string)
        .collect();
    (!abis.is_empty()).then_some(abis)
}

/// CPU architectures to package for a sub-project.
///
/// Android prefers the sub-project's `abiFilters`, then the requested ABIs,
/// then [`DEFAULT_ANDROID_ABI`]. iOS uses the requested architectures or
/// [`IOS_ARCH`].
pub fn architectures(
    project_dir: &Path,
    subproject: &str,
    platform: Platform,
    requested: &[String],
    fs: &dyn Filesystem,
) -> Result<Vec<String>, PackError> {
    if platform.is_apple() {
        return Ok(if requested.is_empty() {
            vec![IOS_ARCH.to_string()]
        } else {
            requested.to_vec()
        });
    }

    let gradle = project_dir
        .join(NATIVE_DIR)
        .join("android")
        .join(subproject)
        .join("build.gradle");
    if fs.exists(&gradle)
        && let Some(abis) = abi_filters(&fs.read_to_string(&gradle)?)
    {
        tracing::debug!("{}: abiFilters {:?}", subproject, abis);
        return Ok(abis);
    }

    if requested.is_empty() {
        return Ok(vec![DEFAULT_ANDROID_ABI.to_string()]);
    }
    requested
        .iter()
        .map(|name| {
            android_abi(name).map(str::to_string).ok_or_else(|| {
                PackError::Config(format!(
                    "unknown Android ABI '{}' (expected arm64, arm or x86_64)",
                    name
                ))
            })
        })
        .collect()
}

/// Xcode project descriptors to patch.
///
/// Applications patch `app.xcodeproj`; framework kinds patch every
/// `*.xcodeproj` found in the iOS directory. Android has none.
pub fn descriptors(
    project_dir: &Path,
    platform: Platform,
    kind: PackageKind,
    fs: &dyn Filesystem,
) -> Result<Vec<PathBuf>, PackError> {
    if !platform.is_apple() {
        return Ok(Vec::new());
    }
    let ios_dir = project_dir.join(NATIVE_DIR).join("ios");
    if kind == PackageKind::App {
        return Ok(vec![
            ios_dir.join(format!("{IOS_APP_TARGET}.xcodeproj/project.pbxproj")),
        ]);
    }
    if !fs.is_dir(&ios_dir) {
        return Ok(Vec::new());
    }
    Ok(fs
        .read_dir(&ios_dir)?
        .into_iter()
        .filter(|entry| file_name_of(entry).ends_with(".xcodeproj") && fs.is_dir(entry))
        .map(|entry| entry.join("project.pbxproj"))
        .collect())
}

/// CocoaPods Podfile of the iOS application.
pub fn podfile(project_dir: &Path) -> PathBuf {
    project_dir.join(NATIVE_DIR).join("ios").join("Podfile")
}
