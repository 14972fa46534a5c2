use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Default XML-RPC endpoint of a local TestLink installation
pub const DEFAULT_ENDPOINT: &str = "http://localhost/lib/api/v1/xmlapi.php";

/// TestLink options recognized on the command line.
///
/// Designed to be `#[command(flatten)]`-ed into the argument struct of a test
/// harness or of the bundled `testlink-reporter` binary. Every option can also
/// come from the environment, which is the usual channel on CI.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TestlinkArgs {
    /// API endpoint for communicating with your TestLink instance
    #[arg(long = "testlink-endpoint", env = "TESTLINK_ENDPOINT")]
    pub testlink_endpoint: Option<String>,

    /// Developer key for accessing your TestLink API
    #[arg(long = "testlink-key", env = "TESTLINK_KEY")]
    pub testlink_key: Option<String>,

    /// Test plan name for this run
    #[arg(long = "plan-name", env = "TESTLINK_PLAN_NAME")]
    pub plan_name: Option<String>,

    /// Project containing the test plan
    #[arg(long = "project-name", env = "TESTLINK_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Build name for this run; auto-generated and created remotely if absent
    #[arg(long = "build-name", env = "TESTLINK_BUILD_NAME")]
    pub build_name: Option<String>,

    /// Platform to associate with reported results
    #[arg(long = "platform-name", env = "TESTLINK_PLATFORM_NAME")]
    pub platform_name: Option<String>,
}

/// File-based defaults for the reporter
///
/// Command-line (or environment) values always win over the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// API endpoint of the TestLink instance
    pub endpoint: Option<String>,

    /// Developer key for the TestLink API
    pub key: Option<String>,

    /// Project containing the test plan
    pub project_name: Option<String>,

    /// Test plan to report against
    pub plan_name: Option<String>,

    /// Build to attach reports to
    pub build_name: Option<String>,

    /// Platform dimension for reports
    pub platform_name: Option<String>,

    /// Logging configuration
    pub logging: Option<LoggingConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Enable verbose logging by default
    pub verbose: Option<bool>,

    /// Time format for log timestamps (uses time crate format syntax)
    pub time_format: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Try to load configuration from standard locations
    pub async fn load() -> Result<Self> {
        let config_paths = Self::get_config_paths();

        for path in config_paths {
            if path.exists() {
                return Self::load_from_file(&path).await;
            }
        }

        // Return default config if no config file found
        Ok(Self::default())
    }

    /// Get potential configuration file paths in order of preference
    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Current directory
        paths.push(PathBuf::from("testlink-reporter.toml"));
        paths.push(PathBuf::from(".testlink-reporter.toml"));

        // 2. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("testlink-reporter").join("config.toml"));
            paths.push(config_dir.join("testlink-reporter.toml"));
        }

        // 3. User home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".testlink-reporter.toml"));
        }

        paths
    }

    /// Check if verbose logging is enabled by default
    pub fn is_verbose_default(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    /// Get the time format for log timestamps
    pub fn get_time_format(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.time_format.clone())
            .unwrap_or_else(|| "[year]-[month]-[day] [hour]:[minute]:[second]".to_string())
    }
}

/// Error produced when required reporter settings are absent
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),
}

/// Fully resolved, validated settings for one test run.
///
/// Resolution is strict: a reporter is either configured completely or not
/// constructed at all. There is no silently-disabled mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    pub endpoint: String,
    pub key: String,
    pub project_name: String,
    pub plan_name: String,
    /// Absent means "synthesize a build at configure time"
    pub build_name: Option<String>,
    pub platform_name: String,
}

impl ReporterConfig {
    /// Merge command-line values over file defaults and validate.
    ///
    /// The endpoint falls back to [`DEFAULT_ENDPOINT`]; everything in
    /// {key, project name, plan name, platform name} must be present somewhere
    /// or the whole resolution fails, listing every missing setting.
    pub fn resolve(args: &TestlinkArgs, file: &Config) -> Result<Self, ConfigError> {
        let endpoint = args
            .testlink_endpoint
            .clone()
            .or_else(|| file.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let key = args.testlink_key.clone().or_else(|| file.key.clone());
        let project_name = args
            .project_name
            .clone()
            .or_else(|| file.project_name.clone());
        let plan_name = args.plan_name.clone().or_else(|| file.plan_name.clone());
        let build_name = args.build_name.clone().or_else(|| file.build_name.clone());
        let platform_name = args
            .platform_name
            .clone()
            .or_else(|| file.platform_name.clone());

        let mut missing = Vec::new();
        if key.is_none() {
            missing.push("testlink-key");
        }
        if project_name.is_none() {
            missing.push("project-name");
        }
        if plan_name.is_none() {
            missing.push("plan-name");
        }
        if platform_name.is_none() {
            missing.push("platform-name");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingSettings(missing));
        }

        Ok(Self {
            endpoint,
            key: key.unwrap(),
            project_name: project_name.unwrap(),
            plan_name: plan_name.unwrap(),
            build_name,
            platform_name: platform_name.unwrap(),
        })
    }
}
