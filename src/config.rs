use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{DriverOptions, DEFAULT_POLL_INTERVAL};

/// awsx - retrieve short-living credentials via AWS SSO
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration to use when no subcommand is given (same as `select`)
    pub config_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AWSX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory holding awsx configuration and caches
    #[arg(long, global = true, env = "AWSX_CONFIG_DIR")]
    pub config_dir: Option<String>,

    /// AWS shared credentials file to write
    #[arg(long, global = true, env = "AWSX_CREDENTIALS_FILE")]
    pub credentials_file: Option<String>,

    /// Give up waiting for device approval after this many seconds
    #[arg(long, global = true, env = "AWSX_POLL_TIMEOUT")]
    pub poll_timeout: Option<u64>,

    /// Print the verification URL without opening a browser
    #[arg(long, global = true, env = "AWSX_NO_BROWSER")]
    pub no_browser: bool,

    /// Override the SSO OIDC endpoint
    #[arg(long, global = true, env = "AWSX_OIDC_ENDPOINT", hide = true)]
    pub oidc_endpoint: Option<String>,

    /// Override the SSO portal endpoint
    #[arg(long, global = true, env = "AWSX_PORTAL_ENDPOINT", hide = true)]
    pub portal_endpoint: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Lets you select a profile from available profiles on AWS SSO
    Select {
        /// Configuration name (default: "default")
        config_name: Option<String>,
    },

    /// Refreshes your previously used credentials
    Refresh {
        /// Configuration names (default: "default")
        config_names: Vec<String>,
    },

    /// Configures one or more AWS SSO configurations
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,

        /// Configuration names to create or edit (default: "default")
        config_names: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Prints awsx's configuration
    Get,

    /// Exports awsx configs
    Export {
        /// Path to save the exported config file
        #[arg(short, long)]
        file: String,
    },

    /// Imports awsx configs
    Import {
        /// Path of the config file to import
        #[arg(short, long)]
        file: String,
    },

    /// Removes awsx configurations
    Remove {
        /// Configuration names (default: "default")
        config_names: Vec<String>,
    },
}

/// Locations of every file awsx reads or writes
#[derive(Clone, Debug, PartialEq)]
pub struct AppPaths {
    pub internal_dir: PathBuf,
    pub config_file: PathBuf,
    pub token_store_file: PathBuf,
    pub usage_file: PathBuf,
    pub credentials_file: PathBuf,
}

impl AppPaths {
    /// Lay out all files under `internal_dir`
    pub fn new(internal_dir: PathBuf, credentials_file: PathBuf) -> Self {
        let cache_dir = internal_dir.join("cache");
        Self {
            config_file: internal_dir.join("config"),
            token_store_file: cache_dir.join("access-token"),
            usage_file: cache_dir.join("last-usage"),
            internal_dir,
            credentials_file,
        }
    }

    /// Default locations below the user's home directory
    pub fn from_home(home: PathBuf) -> Self {
        Self::new(
            home.join(".config").join("awsx"),
            home.join(".aws").join("credentials"),
        )
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub command: Command,
    pub paths: AppPaths,
    pub log_level: String,
    pub poll_timeout: Option<Duration>,
    pub open_browser: bool,
    pub oidc_endpoint: Option<String>,
    pub portal_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine the home directory")?;
        let defaults = AppPaths::from_home(home);

        let internal_dir = args
            .config_dir
            .map(|s| expand_tilde(&s))
            .unwrap_or(defaults.internal_dir);
        let credentials_file = args
            .credentials_file
            .map(|s| expand_tilde(&s))
            .unwrap_or(defaults.credentials_file);

        let command = args.command.unwrap_or(Command::Select {
            config_name: args.config_name,
        });

        Ok(Config {
            command,
            paths: AppPaths::new(internal_dir, credentials_file),
            log_level: args.log_level,
            poll_timeout: args.poll_timeout.map(Duration::from_secs),
            open_browser: !args.no_browser,
            oidc_endpoint: args.oidc_endpoint,
            portal_endpoint: args.portal_endpoint,
        })
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: self.poll_timeout,
            open_browser: self.open_browser,
        }
    }
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::from_args(CliArgs::try_parse_from(args).unwrap()).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_app_paths_layout() {
        let paths = AppPaths::from_home(PathBuf::from("/home/op"));
        assert_eq!(paths.internal_dir, PathBuf::from("/home/op/.config/awsx"));
        assert_eq!(paths.config_file, PathBuf::from("/home/op/.config/awsx/config"));
        assert_eq!(
            paths.token_store_file,
            PathBuf::from("/home/op/.config/awsx/cache/access-token")
        );
        assert_eq!(
            paths.usage_file,
            PathBuf::from("/home/op/.config/awsx/cache/last-usage")
        );
        assert_eq!(
            paths.credentials_file,
            PathBuf::from("/home/op/.aws/credentials")
        );
    }

    #[test]
    fn test_default_command_is_select() {
        let config = parse(&["awsx"]);
        assert_eq!(config.command, Command::Select { config_name: None });

        let config = parse(&["awsx", "work"]);
        assert_eq!(
            config.command,
            Command::Select {
                config_name: Some("work".to_string())
            }
        );
    }

    #[test]
    fn test_refresh_and_config_commands() {
        let config = parse(&["awsx", "refresh", "a", "b"]);
        assert_eq!(
            config.command,
            Command::Refresh {
                config_names: vec!["a".to_string(), "b".to_string()]
            }
        );

        let config = parse(&["awsx", "config", "export", "-f", "/tmp/out.yaml"]);
        assert_eq!(
            config.command,
            Command::Config {
                action: Some(ConfigAction::Export {
                    file: "/tmp/out.yaml".to_string()
                }),
                config_names: vec![],
            }
        );

        let config = parse(&["awsx", "config", "team"]);
        assert_eq!(
            config.command,
            Command::Config {
                action: None,
                config_names: vec!["team".to_string()],
            }
        );
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "awsx",
            "--config-dir",
            "/tmp/awsx",
            "--credentials-file",
            "/tmp/creds",
            "--poll-timeout",
            "120",
            "--no-browser",
            "refresh",
        ]);
        assert_eq!(config.paths.config_file, PathBuf::from("/tmp/awsx/config"));
        assert_eq!(config.paths.credentials_file, PathBuf::from("/tmp/creds"));

        let options = config.driver_options();
        assert_eq!(options.poll_timeout, Some(Duration::from_secs(120)));
        assert_eq!(options.poll_interval, Duration::from_secs(3));
        assert!(!options.open_browser);
    }
}
