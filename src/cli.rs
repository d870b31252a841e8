//! Command-line interface.

use clap::Parser;

use crate::config::DEFAULT_CONFIG_NAME;

/// Command-line flags for a bootstrapped service.
#[derive(Debug, Clone, Parser)]
#[command(name = "service-bootstrap", version, about = "Bootstrap harness for HTTP services")]
pub struct Cli {
    /// Environment whose config directory is loaded
    #[arg(short = 'e', long = "env", default_value = "testing")]
    pub env: String,

    /// Print the version and exit
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Start the diagnostics (metrics) listener
    #[arg(short = 'p', long = "enable-pprof")]
    pub enable_pprof: bool,

    /// Diagnostics listener port
    #[arg(short = 'd', long = "pprof-port", default_value_t = 8188)]
    pub pprof_port: u16,

    /// Health check path
    #[arg(short = 'i', long = "health-check-uri", default_value = "/health")]
    pub health_check_uri: String,

    /// Health check listener port
    #[arg(short = 'f', long = "health-check-port", default_value_t = 8186)]
    pub health_check_port: u16,

    /// Config file base name (without extension)
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_NAME)]
    pub config: String,
}

impl Cli {
    /// Config base name, falling back to the default when empty.
    pub fn config_name(&self) -> &str {
        if self.config.is_empty() {
            DEFAULT_CONFIG_NAME
        } else {
            &self.config
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["service-bootstrap"]).unwrap();
        assert_eq!(cli.env, "testing");
        assert!(!cli.verbose);
        assert!(!cli.enable_pprof);
        assert_eq!(cli.pprof_port, 8188);
        assert_eq!(cli.health_check_uri, "/health");
        assert_eq!(cli.health_check_port, 8186);
        assert_eq!(cli.config_name(), "main");
    }

    #[test]
    fn short_flags() {
        let cli = Cli::try_parse_from([
            "service-bootstrap",
            "-e",
            "production",
            "-v",
            "-p",
            "-d",
            "9000",
            "-i",
            "/ready",
            "-f",
            "9001",
            "-c",
            "api",
        ])
        .unwrap();
        assert_eq!(cli.env, "production");
        assert!(cli.verbose);
        assert!(cli.enable_pprof);
        assert_eq!(cli.pprof_port, 9000);
        assert_eq!(cli.health_check_uri, "/ready");
        assert_eq!(cli.health_check_port, 9001);
        assert_eq!(cli.config_name(), "api");
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["service-bootstrap", "--bogus"]).is_err());
        assert!(Cli::try_parse_from(["service-bootstrap", "-d", "not-a-port"]).is_err());
    }
}
