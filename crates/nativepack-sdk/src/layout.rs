//! Per-platform variant priorities and destination templates.
//!
//! A layout answers two questions for an [`ArchitectureTarget`]:
//!
//! - which SDK build variants may satisfy a template, most preferred first;
//! - where each artifact file type goes inside the consuming project.
//!
//! Destination templates are relative to the project directory and may
//! contain `{subdir}`, replaced by the sub-project name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ArchitectureTarget, BuildMode, PackError, Platform};

/// Placeholder in destination templates replaced by the sub-project name.
pub const SUBDIR_PLACEHOLDER: &str = "{subdir}";

/// Variant names per build mode, most preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantPriority {
    pub debug: Vec<String>,
    pub release: Vec<String>,
    pub profile: Vec<String>,
}

impl VariantPriority {
    /// Variants tried for a build mode.
    pub fn for_mode(&self, mode: BuildMode) -> &[String] {
        match mode {
            BuildMode::Debug => &self.debug,
            BuildMode::Release => &self.release,
            BuildMode::Profile => &self.profile,
        }
    }
}

/// Layout of one CPU architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchLayout {
    /// Variant priorities.
    #[serde(default)]
    pub variants: VariantPriority,
    /// Destination directory template per artifact file type.
    #[serde(default)]
    pub destinations: BTreeMap<String, String>,
}

/// Layout of every platform and architecture.
///
/// Keys are platform names (`android`, `ios`, `ios-simulator`) then
/// architecture names, matching the `[layout.<platform>.<arch>]` tables of
/// `nativepack.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformLayout {
    platforms: BTreeMap<String, BTreeMap<String, ArchLayout>>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn arch(debug: &[&str], release: &[&str], profile: &[&str], dest: &[(&str, &str)]) -> ArchLayout {
    ArchLayout {
        variants: VariantPriority {
            debug: names(debug),
            release: names(release),
            profile: names(profile),
        },
        destinations: dest
            .iter()
            .map(|(ty, dir)| (ty.to_string(), dir.to_string()))
            .collect(),
    }
}

impl Default for PlatformLayout {
    /// The layout the runtime SDK publishes its prebuilt libraries in.
    fn default() -> Self {
        let android_dest = |abi: &str| {
            [
                ("so", format!(".arkui-x/android/{SUBDIR_PLACEHOLDER}/libs/{abi}")),
                ("jar", format!(".arkui-x/android/{SUBDIR_PLACEHOLDER}/libs")),
            ]
        };
        let android = |abi: &str, debug: &[&str], release: &[&str]| {
            let dest = android_dest(abi);
            let dest: Vec<(&str, &str)> = dest.iter().map(|(t, d)| (*t, d.as_str())).collect();
            arch(debug, release, release, &dest)
        };
        let apple_dest = [("xcframework", ".arkui-x/{subdir}/frameworks")];

        let mut platforms = BTreeMap::new();
        platforms.insert(
            Platform::Android.as_str().to_string(),
            BTreeMap::from([
                (
                    "arm64-v8a".to_string(),
                    android(
                        "arm64-v8a",
                        &["android-arm64", "android-arm64-release"],
                        &["android-arm64-release"],
                    ),
                ),
                (
                    "armeabi-v7a".to_string(),
                    android(
                        "armeabi-v7a",
                        &["android-arm", "android-arm-release"],
                        &["android-arm-release", "android-arm"],
                    ),
                ),
                (
                    "x86_64".to_string(),
                    android(
                        "x86_64",
                        &["android-x86_64", "android-x86_64-release"],
                        &["android-x86_64-release", "android-x86_64"],
                    ),
                ),
            ]),
        );
        platforms.insert(
            Platform::Ios.as_str().to_string(),
            BTreeMap::from([(
                "arm64".to_string(),
                arch(
                    &["ios-arm64", "ios-arm64-release"],
                    &["ios-arm64-release"],
                    &["ios-arm64-release"],
                    &apple_dest,
                ),
            )]),
        );
        platforms.insert(
            Platform::IosSimulator.as_str().to_string(),
            BTreeMap::from([
                (
                    "arm64".to_string(),
                    arch(
                        &["ios-arm64-simulator"],
                        &["ios-arm64-simulator"],
                        &["ios-arm64-simulator"],
                        &apple_dest,
                    ),
                ),
                (
                    "x86_64".to_string(),
                    arch(
                        &["ios-x86_64-simulator"],
                        &["ios-x86_64-simulator"],
                        &["ios-x86_64-simulator"],
                        &apple_dest,
                    ),
                ),
            ]),
        );
        Self { platforms }
    }
}

impl PlatformLayout {
    /// A layout with no platforms; useful as a base for hand-built layouts.
    pub fn empty() -> Self {
        Self {
            platforms: BTreeMap::new(),
        }
    }

    /// Sets or replaces the layout of one architecture.
    pub fn set(&mut self, platform: Platform, arch: impl Into<String>, layout: ArchLayout) {
        self.platforms
            .entry(platform.as_str().to_string())
            .or_default()
            .insert(arch.into(), layout);
    }

    /// Overlays `other` on top of this layout, architecture by architecture.
    pub fn merge(&mut self, other: PlatformLayout) {
        for (platform, arches) in other.platforms {
            let entry = self.platforms.entry(platform).or_default();
            entry.extend(arches);
        }
    }

    /// Architectures configured for a platform.
    pub fn architectures(&self, platform: Platform) -> Vec<&str> {
        self.platforms
            .get(platform.as_str())
            .map(|arches| arches.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Layout of one architecture.
    pub fn arch(&self, platform: Platform, arch: &str) -> Option<&ArchLayout> {
        self.platforms.get(platform.as_str())?.get(arch)
    }

    /// Layout of a target, or a configuration error naming it.
    pub fn for_target(&self, target: &ArchitectureTarget) -> Result<&ArchLayout, PackError> {
        self.arch(target.platform, &target.arch).ok_or_else(|| {
            PackError::Config(format!(
                "no layout for architecture {} on {} (known: {})",
                target.arch,
                target.platform,
                self.architectures(target.platform).join(", ")
            ))
        })
    }

    /// Rejects platform keys that name no platform.
    pub fn validate(&self) -> Result<(), PackError> {
        for key in self.platforms.keys() {
            let known = [Platform::Android, Platform::Ios, Platform::IosSimulator]
                .iter()
                .any(|p| p.as_str() == key);
            if !known {
                return Err(PackError::Config(format!(
                    "layout names unknown platform '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_android_priorities() {
        let layout = PlatformLayout::default();
        let target = ArchitectureTarget::new(Platform::Android, "arm64-v8a", BuildMode::Debug);
        let arch = layout.for_target(&target).unwrap();
        assert_eq!(
            arch.variants.for_mode(BuildMode::Debug),
            &["android-arm64".to_string(), "android-arm64-release".to_string()]
        );
        assert_eq!(
            arch.destinations.get("so").map(String::as_str),
            Some(".arkui-x/android/{subdir}/libs/arm64-v8a")
        );
        assert_eq!(
            arch.destinations.get("jar").map(String::as_str),
            Some(".arkui-x/android/{subdir}/libs")
        );
    }

    #[test]
    fn test_unknown_arch_is_config_error() {
        let layout = PlatformLayout::default();
        let target = ArchitectureTarget::new(Platform::Android, "mips", BuildMode::Release);
        let err = layout.for_target(&target).unwrap_err();
        assert!(err.to_string().contains("mips"));
        assert!(err.to_string().contains("arm64-v8a"));
    }

    #[test]
    fn test_merge_from_toml_overrides_one_arch() {
        let overrides: PlatformLayout = toml::from_str(
            r#"
            [android.arm64-v8a]
            variants = { release = ["custom-arm64"] }
            destinations = { so = "native/{subdir}/arm64" }
            "#,
        )
        .unwrap();

        let mut layout = PlatformLayout::default();
        layout.merge(overrides);
        layout.validate().unwrap();

        let arm64 = layout.arch(Platform::Android, "arm64-v8a").unwrap();
        assert_eq!(arm64.variants.release, vec!["custom-arm64".to_string()]);
        assert!(arm64.variants.debug.is_empty());
        assert!(layout.arch(Platform::Android, "x86_64").is_some());
    }

    #[test]
    fn test_validate_rejects_unknown_platform() {
        let mut layout = PlatformLayout::empty();
        layout.merge(toml::from_str("[windows.x64]\n").unwrap());
        assert!(layout.validate().is_err());
    }
}
