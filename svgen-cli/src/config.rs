//! Launcher configuration
//!
//! Defaults describe the packaged Node.js server. A `launcher.toml` in the
//! package root may override any of them.

use serde::Deserialize;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

use crate::error::{ConfigParseSnafu, ConfigReadSnafu, Result};

/// Name of the optional override file looked up in the package root
pub const CONFIG_FILE_NAME: &str = "launcher.toml";

/// Manifest name used when discovering the package root
pub const DEFAULT_MANIFEST: &str = "package.json";

/// Full launcher configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Executables that must be on PATH, checked in order
    pub prerequisites: Vec<PrerequisiteSpec>,

    /// Program that runs the server entry point
    pub runtime: String,

    /// Dependency manifest, relative to the package root
    pub manifest: PathBuf,

    /// Directory whose presence means dependencies are installed
    pub dependency_dir: PathBuf,

    /// Prebuilt server entry point, relative to the package root
    pub entry: PathBuf,

    /// Required install command, run when `dependency_dir` is missing
    pub install: CommandSpec,

    /// Opportunistic acceleration dependencies
    pub optional: OptionalConfig,
}

/// A runtime that must be present before anything else happens
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrerequisiteSpec {
    pub name: String,
    pub label: String,
    pub hint: String,
    /// Semver requirement such as `">=18.0.0"`; only warned about
    #[serde(default)]
    pub version: Option<String>,
}

/// An external command: program name plus arguments
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Per-platform optional install commands
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionalConfig {
    pub enabled: bool,
    /// macOS on aarch64
    pub apple_silicon: Option<CommandSpec>,
    /// every other platform
    pub other: Option<CommandSpec>,
}

impl CommandSpec {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            prerequisites: vec![
                PrerequisiteSpec {
                    name: "node".to_string(),
                    label: "Node.js".to_string(),
                    hint: "Please install Node.js 18+ from https://nodejs.org/".to_string(),
                    version: Some(">=18.0.0".to_string()),
                },
                PrerequisiteSpec {
                    name: "npm".to_string(),
                    label: "npm".to_string(),
                    hint: "Please install Node.js 18+ (includes npm) from https://nodejs.org/"
                        .to_string(),
                    version: None,
                },
            ],
            runtime: "node".to_string(),
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            dependency_dir: PathBuf::from("node_modules"),
            entry: PathBuf::from("dist").join("index.js"),
            install: CommandSpec::new("npm", &["install", "--production"]),
            optional: OptionalConfig::default(),
        }
    }
}

impl Default for OptionalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            apple_silicon: Some(CommandSpec::new(
                "python3",
                &["-m", "pip", "install", "--quiet", "mflux"],
            )),
            other: Some(CommandSpec::new(
                "python3",
                &[
                    "-m",
                    "pip",
                    "install",
                    "--quiet",
                    "torch",
                    "torchvision",
                    "diffusers",
                    "transformers",
                    "accelerate",
                ],
            )),
        }
    }
}

impl LauncherConfig {
    /// Load `launcher.toml` from `root`, falling back to defaults when absent
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context(ConfigReadSnafu { path: &path })?;
        let config = Self::parse(&content).context(ConfigParseSnafu { path: &path })?;
        tracing::debug!("loaded launcher config from {}", path.display());
        Ok(config)
    }

    /// Parse a config document; missing keys keep their defaults
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
