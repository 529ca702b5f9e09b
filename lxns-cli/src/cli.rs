//! CLI argument definitions

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lxns_namespace::{ConfigOverrides, LaunchOptions};

#[derive(Parser, Debug)]
#[command(name = "lxns")]
#[command(about = "Run a program in new Linux namespaces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON namespace configuration
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Helper that attaches the network namespace to the host bridge
    #[arg(long, value_name = "PATH")]
    pub network_helper: Option<PathBuf>,

    /// IPv4 address for the namespace interface (e.g. 10.0.0.2/24)
    #[arg(long, value_name = "CIDR")]
    pub ipaddr: Option<String>,

    /// Root filesystem to pivot into
    #[arg(long, value_name = "PATH")]
    pub rootfs: Option<PathBuf>,

    /// Instance ID, also used for the hostname
    #[arg(long, visible_alias = "nest-id", value_name = "ID")]
    pub id: Option<String>,

    /// Seconds to wait for the network helper
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub attach_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Program to run, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Configuration fields overridden on the command line
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            id: self.id.clone(),
            rootfs: self.rootfs.clone(),
            network_addr: self.ipaddr.clone(),
        }
    }

    /// Launcher options
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            network_helper: self.network_helper.clone(),
            attach_timeout: Duration::from_secs(self.attach_timeout),
            ..LaunchOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_keeps_its_flags() {
        let cli = Cli::parse_from(["lxns", "--id", "abc", "ls", "-la", "--color"]);
        assert_eq!(cli.id.as_deref(), Some("abc"));
        let expected: Vec<OsString> = vec!["ls".into(), "-la".into(), "--color".into()];
        assert_eq!(cli.command, expected);
    }

    #[test]
    fn test_nest_id_alias() {
        let cli = Cli::parse_from(["lxns", "--nest-id", "abc", "true"]);
        assert_eq!(cli.overrides().id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "lxns",
            "--rootfs",
            "/srv/root",
            "--ipaddr",
            "10.0.0.2/24",
            "sh",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.rootfs, Some(PathBuf::from("/srv/root")));
        assert_eq!(overrides.network_addr.as_deref(), Some("10.0.0.2/24"));
        assert_eq!(overrides.id, None);
    }

    #[test]
    fn test_launch_options() {
        let cli = Cli::parse_from([
            "lxns",
            "--network-helper",
            "/usr/libexec/lxns-network-helper",
            "--attach-timeout",
            "5",
            "sh",
        ]);
        let options = cli.launch_options();
        assert_eq!(
            options.network_helper,
            Some(PathBuf::from("/usr/libexec/lxns-network-helper"))
        );
        assert_eq!(options.attach_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_default_timeout() {
        let cli = Cli::parse_from(["lxns", "sh"]);
        assert_eq!(cli.launch_options().attach_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["lxns"]).is_err());
    }
}
