//! # nativepack
//!
//! Command-line tool that packages the native libraries of the ArkUI-X
//! runtime into the Android and iOS projects of an application.
//!
//! ## Overview
//!
//! `nativepack` drives the [`nativepack_sdk`] pipeline:
//!
//! - **Resolving** - reads the SDK's module catalog and the project's
//!   collection markers, then computes the dependency closure
//! - **Placing** - copies the matching `.so`, `.jar` and `.xcframework`
//!   artifacts into `.arkui-x/` and reports (or prunes) stale ones
//! - **Registering** - keeps `project.pbxproj` in sync with the frameworks
//!   that were copied
//! - **Pods** - alternatively vendors the iOS frameworks through a generated
//!   CocoaPods podspec
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter nativepack.toml
//! nativepack init --sdk /opt/arkui-x/sdk
//!
//! # Package an Android application
//! nativepack package --platform android --kind app
//!
//! # Package an iOS application, deleting what is no longer needed
//! nativepack package --platform ios --kind app --prune
//!
//! # Show the dependency closure for a platform
//! nativepack resolve --platform ios
//!
//! # Consume the iOS frameworks as a local pod instead
//! nativepack pods && (cd .arkui-x/ios && pod install)
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `package` | Resolve, copy and register native artifacts |
//! | `resolve` | Print the dependency closure and unknown modules |
//! | `patch` | Patch one Xcode project descriptor directly |
//! | `pods` | Write `arkui-x.podspec` and add it to the iOS Podfile |
//! | `init` | Write a commented `nativepack.toml` |
//!
//! ## Configuration
//!
//! Settings are read from `nativepack.toml`, discovered from the current
//! directory upwards. See [`config`] for the format. CLI flags override file
//! values.
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. `RUST_LOG` selects the level;
//! without it the level is `info`, or `debug` with `--verbose`.
//!
//! ## Exit status
//!
//! Fatal errors exit non-zero before anything is written. A run that
//! completes with failed copies, removals or descriptor patches lists them
//! in the summary and also exits non-zero.

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use nativepack_sdk::{
    BuildMode, ManagedNames, NotFoundPolicy, OsFs, PackageConfig, PackageKind, PackageReport,
    Packager, PatchOptions, Platform, PodsReport, StaleOutcome, UuidIds, patch_file,
    xcode::{default_managed, framework_sections},
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub mod config;

use config::{CONFIG_FILE_NAME, ConfigResolver, NativepackConfig};

/// Packages native runtime libraries into Android and iOS projects.
#[derive(Parser, Debug)]
#[command(name = "nativepack", author, version, about = "ArkUI-X native library packager", long_about = None)]
struct Cli {
    /// Log debug output (ignored when RUST_LOG is set)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve, copy and register the native artifacts a project needs.
    Package {
        #[arg(long, value_enum)]
        platform: PlatformArg,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long, value_enum, default_value_t = ModeArg::Release)]
        mode: ModeArg,
        #[arg(long, help = "Delete stale artifacts and descriptor entries")]
        prune: bool,
        #[arg(long, value_enum, help = "Policy for artifacts missing from the SDK")]
        not_found: Option<NotFoundArg>,
        #[arg(long = "abi", help = "ABIs used when a sub-project has no abiFilters")]
        abis: Vec<String>,
        #[arg(long = "module", help = "Module requested in addition to collection markers")]
        modules: Vec<String>,
        #[arg(long, help = "Project directory (overrides nativepack.toml)")]
        project: Option<PathBuf>,
        #[arg(long, help = "Runtime SDK directory (overrides nativepack.toml)")]
        sdk: Option<PathBuf>,
    },
    /// Print the dependency closure for a platform.
    Resolve {
        #[arg(long, value_enum)]
        platform: PlatformArg,
        #[arg(help = "Modules requested in addition to collection markers")]
        modules: Vec<String>,
        #[arg(long, help = "Project directory (overrides nativepack.toml)")]
        project: Option<PathBuf>,
        #[arg(long, help = "Runtime SDK directory (overrides nativepack.toml)")]
        sdk: Option<PathBuf>,
    },
    /// Register a set of xcframeworks in one project.pbxproj.
    Patch {
        #[arg(long, help = "Path to project.pbxproj")]
        descriptor: PathBuf,
        #[arg(long, value_enum, default_value_t = DescriptorKindArg::App)]
        kind: DescriptorKindArg,
        #[arg(long, help = "Remove xcframework entries not listed")]
        prune: bool,
        #[arg(help = "xcframework names the descriptor must reference")]
        names: Vec<String>,
    },
    /// Vendor the iOS frameworks through a CocoaPods podspec.
    Pods {
        #[arg(long, value_enum, default_value_t = PlatformArg::Ios)]
        platform: PlatformArg,
        #[arg(long, value_enum, default_value_t = ModeArg::Release)]
        mode: ModeArg,
        #[arg(long, value_enum, help = "Policy for artifacts missing from the SDK")]
        not_found: Option<NotFoundArg>,
        #[arg(long = "arch", help = "Architectures to vendor (default arm64)")]
        arches: Vec<String>,
        #[arg(long = "module", help = "Module requested in addition to collection markers")]
        modules: Vec<String>,
        #[arg(long, help = "Project directory (overrides nativepack.toml)")]
        project: Option<PathBuf>,
        #[arg(long, help = "Runtime SDK directory (overrides nativepack.toml)")]
        sdk: Option<PathBuf>,
    },
    /// Scaffold a nativepack.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, help = "Runtime SDK directory written to the file")]
        sdk: Option<PathBuf>,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
enum PlatformArg {
    Android,
    Ios,
    IosSimulator,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Android => Platform::Android,
            PlatformArg::Ios => Platform::Ios,
            PlatformArg::IosSimulator => Platform::IosSimulator,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "lowercase")]
enum KindArg {
    /// Android apk or iOS app
    App,
    /// Android library modules
    Aar,
    /// iOS framework projects
    Framework,
    /// iOS xcframework projects
    XcFramework,
}

impl From<KindArg> for PackageKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::App => PackageKind::App,
            KindArg::Aar => PackageKind::Aar,
            KindArg::Framework => PackageKind::Framework,
            KindArg::XcFramework => PackageKind::XcFramework,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "lowercase")]
enum ModeArg {
    Debug,
    Release,
    Profile,
}

impl From<ModeArg> for BuildMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Debug => BuildMode::Debug,
            ModeArg::Release => BuildMode::Release,
            ModeArg::Profile => BuildMode::Profile,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
enum NotFoundArg {
    /// Fail after reporting every missing artifact
    Abort,
    /// Warn about each missing artifact
    Skip,
    /// Warn once, then ignore further misses
    IgnoreAll,
}

impl From<NotFoundArg> for NotFoundPolicy {
    fn from(arg: NotFoundArg) -> Self {
        match arg {
            NotFoundArg::Abort => NotFoundPolicy::Abort,
            NotFoundArg::Skip => NotFoundPolicy::Skip,
            NotFoundArg::IgnoreAll => NotFoundPolicy::IgnoreAll,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "lowercase")]
enum DescriptorKindArg {
    /// Application project (embeds frameworks)
    App,
    /// Framework project (references ../frameworks)
    Framework,
}

impl From<DescriptorKindArg> for PackageKind {
    fn from(arg: DescriptorKindArg) -> Self {
        match arg {
            DescriptorKindArg::App => PackageKind::App,
            DescriptorKindArg::Framework => PackageKind::Framework,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Package {
            platform,
            kind,
            mode,
            prune,
            not_found,
            abis,
            modules,
            project,
            sdk,
        } => cmd_package(
            PackageConfig {
                platform: platform.into(),
                kind: kind.into(),
                mode: mode.into(),
                abis,
            },
            prune.then_some(true),
            not_found.map(Into::into),
            modules,
            project,
            sdk,
        ),
        Command::Resolve {
            platform,
            modules,
            project,
            sdk,
        } => cmd_resolve(platform.into(), modules, project, sdk),
        Command::Patch {
            descriptor,
            kind,
            prune,
            names,
        } => cmd_patch(&descriptor, kind.into(), prune, names),
        Command::Pods {
            platform,
            mode,
            not_found,
            arches,
            modules,
            project,
            sdk,
        } => cmd_pods(
            PackageConfig {
                platform: platform.into(),
                kind: PackageKind::App,
                mode: mode.into(),
                abis: arches,
            },
            not_found.map(Into::into),
            modules,
            project,
            sdk,
        ),
        Command::Init { output, sdk, force } => cmd_init(&output, sdk, force),
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds a packager from CLI overrides and the discovered config file.
fn packager(
    resolver: &ConfigResolver,
    project: Option<PathBuf>,
    sdk: Option<PathBuf>,
) -> Result<Packager> {
    let project_dir = match project.or_else(|| resolver.project_dir()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let Some(sdk_dir) = sdk.or_else(|| resolver.sdk_dir()) else {
        bail!(
            "No runtime SDK directory configured. Pass --sdk or set [sdk] dir in {}",
            CONFIG_FILE_NAME
        );
    };
    if !sdk_dir.is_dir() {
        bail!("Runtime SDK directory does not exist: {:?}", sdk_dir);
    }

    let collection_root = resolver
        .collection_root()
        .unwrap_or_else(|| project_dir.clone());

    println!("  Project: {:?}", project_dir);
    println!("  SDK: {:?}", sdk_dir);

    Ok(Packager::new(project_dir, &sdk_dir)
        .collection_roots(vec![collection_root])
        .base_module(resolver.base_module())
        .layout(resolver.layout()))
}

fn load_config() -> ConfigResolver {
    match ConfigResolver::new() {
        Ok(resolver) => {
            if let Some(config_path) = &resolver.config_path {
                println!("Using config file: {:?}", config_path);
            }
            resolver
        }
        Err(e) => {
            tracing::warn!("ignoring configuration: {:#}", e);
            ConfigResolver::default()
        }
    }
}

fn cmd_package(
    mut package: PackageConfig,
    prune: Option<bool>,
    not_found: Option<NotFoundPolicy>,
    modules: Vec<String>,
    project: Option<PathBuf>,
    sdk: Option<PathBuf>,
) -> Result<()> {
    let resolver = load_config();

    println!("Packaging native artifacts...");
    println!("  Platform: {}", package.platform);
    println!("  Kind: {}", package.kind.as_str());
    println!("  Mode: {}", package.mode);

    let prune = resolver.resolve(prune, |c| Some(c.package.prune), false);
    let policy = resolver.resolve(
        not_found,
        |c| Some(c.package.not_found),
        NotFoundPolicy::default(),
    );
    if package.abis.is_empty() && package.platform == Platform::Android {
        package.abis = resolver.android().abis.unwrap_or_default();
    }
    println!("  Prune: {}", prune);
    println!("  Not found: {}", policy.as_str());

    let report = packager(&resolver, project, sdk)?
        .modules(modules)
        .not_found_policy(policy)
        .prune(prune)
        .package(&package, &OsFs)
        .context("Packaging failed")?;

    print_report(&report);

    if !report.is_success() {
        bail!("Packaging completed with errors");
    }
    println!("\n[checkmark] Packaging completed!");
    Ok(())
}

fn print_report(report: &PackageReport) {
    println!("\nModules: {} resolved", report.resolved.len());
    for name in &report.resolved {
        println!("  {}", name);
    }
    if !report.unresolved.is_empty() {
        println!("\nUnknown modules (not in the SDK catalog):");
        for name in &report.unresolved {
            println!("  {}", name);
        }
    }

    println!("\nTargets:");
    for target in &report.targets {
        println!(
            "  {} {}: {} located, {} copied, {} failed",
            target.subproject,
            target.target,
            target.located,
            target.placement.copied.len(),
            target.placement.failures.len()
        );
    }

    if !report.missing_artifacts.is_empty() || report.ignored_missing > 0 {
        println!("\nMissing from the SDK:");
        for path in &report.missing_artifacts {
            println!("  {}", path);
        }
        if report.ignored_missing > 0 {
            println!("  ... and {} more (ignored)", report.ignored_missing);
        }
    }

    if !report.stale.is_empty() {
        println!("\nStale artifacts:");
        for stale in &report.stale {
            let status = match &stale.outcome {
                StaleOutcome::Reported => "not needed".to_string(),
                StaleOutcome::Removed => "removed".to_string(),
                StaleOutcome::RemoveFailed(e) => format!("removal failed: {}", e),
            };
            println!("  {:?} ({})", stale.path, status);
        }
    }

    for descriptor in &report.descriptors {
        match &descriptor.result {
            Ok(outcome) if outcome.changed => println!(
                "\nPatched {:?}: +{} -{}",
                descriptor.path,
                outcome.added.len(),
                outcome.removed.len()
            ),
            Ok(_) => println!("\n{:?} already up to date", descriptor.path),
            Err(e) => println!("\nFailed to patch {:?}: {}", descriptor.path, e),
        }
    }

    let failures: Vec<_> = report.failed_copies().collect();
    if !failures.is_empty() {
        println!("\nFailed copies:");
        for failure in failures {
            println!("  {} -> {:?}: {}", failure.module, failure.path, failure.error);
        }
    }
}

fn cmd_resolve(
    platform: Platform,
    modules: Vec<String>,
    project: Option<PathBuf>,
    sdk: Option<PathBuf>,
) -> Result<()> {
    let resolver = load_config();

    println!("Resolving modules for {}...", platform);
    let resolution = packager(&resolver, project, sdk)?
        .modules(modules)
        .resolve(platform, &OsFs)
        .context("Resolution failed")?;

    println!(
        "\nRequested: {} ({} collection marker(s))",
        resolution.requested.len(),
        resolution.scan.component_files + resolution.scan.module_files
    );
    println!("Resolved: {}", resolution.graph.len());
    for name in resolution.graph.names() {
        println!("  {}", name);
    }
    if !resolution.graph.missing().is_empty() {
        println!("\nUnknown modules:");
        for name in resolution.graph.missing() {
            println!("  {}", name);
        }
    }
    Ok(())
}

fn cmd_patch(descriptor: &Path, kind: PackageKind, prune: bool, names: Vec<String>) -> Result<()> {
    println!("Patching {:?}...", descriptor);
    println!("  Kind: {}", kind.as_str());
    println!("  Frameworks: {}", names.len());

    let options = PatchOptions {
        prune,
        managed: managed_for(prune),
    };
    let outcome = patch_file(
        descriptor,
        &names,
        &framework_sections(kind),
        &options,
        &mut UuidIds,
        &OsFs,
    )
    .with_context(|| format!("Failed to patch {:?}", descriptor))?;

    for name in &outcome.added {
        println!("  + {}", name);
    }
    for name in &outcome.removed {
        println!("  - {}", name);
    }
    if outcome.changed {
        println!("\n[checkmark] Descriptor updated!");
    } else {
        println!("\n[checkmark] Descriptor already up to date.");
    }
    Ok(())
}

fn cmd_pods(
    package: PackageConfig,
    not_found: Option<NotFoundPolicy>,
    modules: Vec<String>,
    project: Option<PathBuf>,
    sdk: Option<PathBuf>,
) -> Result<()> {
    let resolver = load_config();

    println!("Installing CocoaPods integration...");
    println!("  Platform: {}", package.platform);
    println!("  Mode: {}", package.mode);

    let policy = resolver.resolve(
        not_found,
        |c| Some(c.package.not_found),
        NotFoundPolicy::default(),
    );
    println!("  Not found: {}", policy.as_str());

    let report = packager(&resolver, project, sdk)?
        .modules(modules)
        .not_found_policy(policy)
        .install_pods(&package, &OsFs)
        .context("CocoaPods integration failed")?;

    print_pods_report(&report);
    let ios_dir = report.podfile.parent().unwrap_or(&report.podfile);
    println!("\n[checkmark] Podspec ready! Run 'pod install' in {:?}", ios_dir);
    Ok(())
}

fn print_pods_report(report: &PodsReport) {
    println!("\nModules: {} resolved", report.resolved.len());
    if !report.unresolved.is_empty() {
        println!("Unknown modules: {}", report.unresolved.join(", "));
    }

    println!("\nVendored frameworks:");
    for path in &report.frameworks {
        println!("  {}", path);
    }
    if !report.missing_artifacts.is_empty() || report.ignored_missing > 0 {
        println!("\nMissing from the SDK:");
        for path in &report.missing_artifacts {
            println!("  {}", path);
        }
        if report.ignored_missing > 0 {
            println!("  ... and {} more (ignored)", report.ignored_missing);
        }
    }

    println!("\nWrote {:?}", report.podspec);
    if report.podfile_changed {
        println!("Updated {:?}", report.podfile);
    } else {
        println!("{:?} already references the pod", report.podfile);
    }
}

fn managed_for(prune: bool) -> ManagedNames {
    if prune {
        default_managed()
    } else {
        ManagedNames::All
    }
}

fn cmd_init(output: &Path, sdk: Option<PathBuf>, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{:?} already exists (use --force to overwrite)", output);
    }
    let sdk_dir = sdk.unwrap_or_else(|| PathBuf::from("/path/to/arkui-x/sdk"));
    let contents = NativepackConfig::generate_starter_toml(&sdk_dir);
    std::fs::write(output, contents).with_context(|| format!("Failed to write {:?}", output))?;

    println!("\n[checkmark] Wrote {:?}", output);
    println!("\nNext steps:");
    println!("  1. Set [sdk] dir to the runtime SDK location");
    println!("  2. Run 'nativepack package --platform <platform> --kind app'");
    Ok(())
}
