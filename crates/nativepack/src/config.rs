//! Configuration file support for nativepack.
//!
//! Settings live in a `nativepack.toml` file so that the project and SDK
//! locations do not have to be passed on every invocation.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./nativepack.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths in the file are taken relative to the directory holding it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! dir = "."
//! collection_root = "."
//! base_module = "engine/arkui"
//!
//! [sdk]
//! dir = "/opt/arkui-x/sdk"
//!
//! [package]
//! prune = false
//! not_found = "ignore-all"
//!
//! [android]
//! abis = ["arm64-v8a"]
//!
//! [layout.android.arm64-v8a]
//! variants.debug = ["android-arm64"]
//! variants.release = ["android-arm64-release"]
//! destinations.so = ".arkui-x/android/{subdir}/libs/arm64-v8a"
//! ```

use anyhow::{Context, Result};
use nativepack_sdk::{DEFAULT_BASE_MODULE, NotFoundPolicy, PlatformLayout};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "nativepack.toml";

/// Root configuration structure for `nativepack.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NativepackConfig {
    /// Consuming project settings.
    pub project: ProjectConfig,

    /// Runtime SDK location.
    pub sdk: SdkConfig,

    /// Packaging behaviour.
    pub package: PackageSettings,

    /// Android-specific configuration.
    pub android: AndroidConfig,

    /// Overrides merged over the built-in platform layout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<PlatformLayout>,
}

/// Consuming project settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root of the consuming project (the directory holding `.arkui-x/`).
    pub dir: PathBuf,

    /// Directory scanned for collection markers.
    ///
    /// Defaults to the project directory.
    pub collection_root: Option<PathBuf>,

    /// Module always added to the dependency closure.
    ///
    /// Defaults to `engine/arkui`. An empty string disables it.
    pub base_module: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            collection_root: None,
            base_module: DEFAULT_BASE_MODULE.to_string(),
        }
    }
}

/// Runtime SDK location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Root of the runtime SDK, holding `engine/`, `plugins/api/` and
    /// `plugins/component/`.
    pub dir: Option<PathBuf>,
}

/// Packaging behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    /// Delete stale artifacts and descriptor entries instead of reporting them.
    pub prune: bool,

    /// Policy for artifacts missing from the SDK.
    pub not_found: NotFoundPolicy,
}

/// Android-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// ABIs packaged when a sub-project declares no `abiFilters`.
    ///
    /// Defaults to `arm64-v8a`.
    pub abis: Option<Vec<String>>,
}

impl NativepackConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the specified file path.
    ///
    /// # Returns
    ///
    /// * `Ok(NativepackConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed, or its layout names
    ///   an unknown platform
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: NativepackConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if let Some(layout) = &config.layout {
            layout
                .validate()
                .with_context(|| format!("Invalid layout in config file: {:?}", path))?;
        }

        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Saves the configuration to the specified file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Generates a starter configuration for a project and SDK.
    pub fn starter(sdk_dir: &Path) -> Self {
        Self {
            sdk: SdkConfig {
                dir: Some(sdk_dir.to_path_buf()),
            },
            ..Self::default()
        }
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes comments explaining each configuration option.
    pub fn generate_starter_toml(sdk_dir: &Path) -> String {
        format!(
            r#"# nativepack configuration file
# CLI flags override these settings when provided.
# Relative paths are resolved against the directory of this file.

[project]
# Root of the consuming project (the directory holding .arkui-x/)
dir = "."

# Directory scanned for component_collection.json / module_collection.json
# (default: the project directory)
# collection_root = "."

# Module always included in the dependency closure ("" disables it)
base_module = "{base_module}"

[sdk]
# Root of the runtime SDK (engine/, plugins/api/, plugins/component/)
dir = "{sdk_dir}"

[package]
# Delete stale artifacts and descriptor entries instead of only reporting them
prune = false

# What to do when an artifact is missing from the SDK: abort | skip | ignore-all
not_found = "ignore-all"

[android]
# ABIs packaged when a sub-project declares no abiFilters (default: arm64-v8a)
# abis = ["arm64-v8a", "armeabi-v7a", "x86_64"]

# Override variant priorities and destinations per platform and architecture
# [layout.android.arm64-v8a]
# variants.debug = ["android-arm64", "android-arm64-release"]
# variants.release = ["android-arm64-release"]
# destinations.so = ".arkui-x/android/{{subdir}}/libs/arm64-v8a"
"#,
            base_module = DEFAULT_BASE_MODULE,
            sdk_dir = sdk_dir.display(),
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<NativepackConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a new resolver by discovering and loading configuration.
    pub fn new() -> Result<Self> {
        match NativepackConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self {
                config: None,
                config_path: None,
            }),
        }
    }

    /// Resolves `path` against the directory of the loaded config file.
    fn anchored(&self, path: &Path) -> PathBuf {
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Returns the project directory, if configured.
    pub fn project_dir(&self) -> Option<PathBuf> {
        self.config.as_ref().map(|c| self.anchored(&c.project.dir))
    }

    /// Returns the collection marker root, if configured.
    pub fn collection_root(&self) -> Option<PathBuf> {
        self.config
            .as_ref()
            .and_then(|c| c.project.collection_root.as_deref())
            .map(|p| self.anchored(p))
    }

    /// Returns the base module, defaulting to `engine/arkui`.
    pub fn base_module(&self) -> String {
        self.config
            .as_ref()
            .map(|c| c.project.base_module.clone())
            .unwrap_or_else(|| DEFAULT_BASE_MODULE.to_string())
    }

    /// Returns the SDK directory, if configured.
    pub fn sdk_dir(&self) -> Option<PathBuf> {
        self.config
            .as_ref()
            .and_then(|c| c.sdk.dir.as_deref())
            .map(|p| self.anchored(p))
    }

    /// Returns the Android configuration.
    pub fn android(&self) -> AndroidConfig {
        self.config
            .as_ref()
            .map(|c| c.android.clone())
            .unwrap_or_default()
    }

    /// Returns the built-in layout with the configured overrides merged in.
    pub fn layout(&self) -> PlatformLayout {
        let mut layout = PlatformLayout::default();
        if let Some(overrides) = self.config.as_ref().and_then(|c| c.layout.clone()) {
            layout.merge(overrides);
        }
        layout
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&NativepackConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativepack_sdk::{BuildMode, Platform};
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = NativepackConfig::default();
        assert_eq!(config.project.dir, PathBuf::from("."));
        assert_eq!(config.project.base_module, "engine/arkui");
        assert!(config.sdk.dir.is_none());
        assert!(!config.package.prune);
        assert_eq!(config.package.not_found, NotFoundPolicy::IgnoreAll);
        assert!(config.layout.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
[project]
dir = "app"
collection_root = "app/entry"
base_module = ""

[sdk]
dir = "/opt/arkui-x"

[package]
prune = true
not_found = "abort"

[android]
abis = ["x86_64"]

[layout.android.x86_64]
variants.release = ["custom-x64"]
destinations.so = "out/{subdir}/x64"
"#;
        std::fs::write(&config_path, toml_content).unwrap();

        let config = NativepackConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.project.dir, PathBuf::from("app"));
        assert_eq!(config.project.collection_root, Some(PathBuf::from("app/entry")));
        assert_eq!(config.project.base_module, "");
        assert_eq!(config.sdk.dir, Some(PathBuf::from("/opt/arkui-x")));
        assert!(config.package.prune);
        assert_eq!(config.package.not_found, NotFoundPolicy::Abort);
        assert_eq!(config.android.abis, Some(vec!["x86_64".to_string()]));

        let layout = config.layout.unwrap();
        let x64 = layout.arch(Platform::Android, "x86_64").unwrap();
        assert_eq!(x64.variants.for_mode(BuildMode::Release), ["custom-x64".to_string()]);
        assert_eq!(x64.destinations["so"], "out/{subdir}/x64");
    }

    #[test]
    fn test_unknown_layout_platform_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &config_path,
            "[layout.windows.x64]\nvariants.release = [\"win\"]\n",
        )
        .unwrap();

        let err = NativepackConfig::load_from_file(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("windows"));
    }

    #[test]
    fn test_discover_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[sdk]\ndir = \"sdk\"\n").unwrap();

        let nested = temp_dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = NativepackConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.sdk.dir, Some(PathBuf::from("sdk")));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = NativepackConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_save_and_reload_starter() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let mut config = NativepackConfig::starter(Path::new("/opt/arkui-x"));
        config.package.not_found = NotFoundPolicy::Skip;
        config.save_to_file(&config_path).unwrap();

        let loaded = NativepackConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.sdk.dir, Some(PathBuf::from("/opt/arkui-x")));
        assert_eq!(loaded.package.not_found, NotFoundPolicy::Skip);
        assert_eq!(loaded.project.base_module, DEFAULT_BASE_MODULE);
    }

    #[test]
    fn test_config_resolver() {
        let resolver = ConfigResolver {
            config: Some(NativepackConfig::starter(Path::new("sdk"))),
            config_path: Some(PathBuf::from("/work/nativepack.toml")),
        };

        // CLI value takes precedence
        let prune = resolver.resolve(Some(true), |c| Some(c.package.prune), false);
        assert!(prune);

        // Config value used when CLI is None
        let policy = resolver.resolve(None, |c| Some(c.package.not_found), NotFoundPolicy::Abort);
        assert_eq!(policy, NotFoundPolicy::IgnoreAll);

        // Relative paths follow the config file
        assert_eq!(resolver.sdk_dir(), Some(PathBuf::from("/work/sdk")));
        assert_eq!(resolver.project_dir(), Some(PathBuf::from("/work/.")));
        assert!(resolver.collection_root().is_none());
    }

    #[test]
    fn test_resolver_layout_merges_overrides() {
        let mut overrides = PlatformLayout::empty();
        overrides.set(
            Platform::Android,
            "x86_64",
            nativepack_sdk::ArchLayout::default(),
        );
        let mut config = NativepackConfig::default();
        config.layout = Some(overrides);
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: None,
        };

        let layout = resolver.layout();
        assert!(layout.arch(Platform::Android, "arm64-v8a").is_some());
        assert!(
            layout
                .arch(Platform::Android, "x86_64")
                .unwrap()
                .destinations
                .is_empty()
        );
    }

    #[test]
    fn test_generate_starter_toml() {
        let toml = NativepackConfig::generate_starter_toml(Path::new("/opt/arkui-x"));
        assert!(toml.contains("dir = \"/opt/arkui-x\""));
        assert!(toml.contains("base_module = \"engine/arkui\""));
        assert!(toml.contains("not_found = \"ignore-all\""));
        assert!(toml.contains("{subdir}"));

        let parsed: NativepackConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.sdk.dir, Some(PathBuf::from("/opt/arkui-x")));
        assert!(parsed.layout.is_none());
    }
}
