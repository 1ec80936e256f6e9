//! Command line

use clap::Parser;
use clap::builder::RangedU64ValueParser;
use std::path::PathBuf;
use usageguard_engine::GuardConfig;

/// Reconcile item protection against the usage ranking
#[derive(Debug, Parser)]
#[command(name = "usageguard", version)]
pub struct Cli {
    /// Configuration file (defaults to $USAGEGUARD_CONFIG, then
    /// ~/.config/usageguard/usageguard.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run every guard and counter without changing any protection
    #[arg(long)]
    pub simulate: bool,

    /// Stop each pass after N processed cases (at least 1)
    #[arg(long, value_name = "N", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub hard_limit: Option<usize>,
}

impl Cli {
    /// Flags win over the configuration file. `--simulate` can only turn
    /// simulation on.
    pub fn apply_overrides(&self, config: &mut GuardConfig) {
        if self.simulate {
            config.run.simulate = true;
        }
        if let Some(limit) = self.hard_limit {
            config.policy.hard_limit = Some(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "usageguard",
            "--config",
            "/etc/usageguard.toml",
            "--simulate",
            "--hard-limit",
            "25",
        ])
        .expect("parse");

        assert_eq!(cli.config, Some(PathBuf::from("/etc/usageguard.toml")));
        assert!(cli.simulate);
        assert_eq!(cli.hard_limit, Some(25));
    }

    #[test]
    fn test_rejects_bad_hard_limit() {
        assert!(Cli::try_parse_from(["usageguard", "--hard-limit", "many"]).is_err());
        assert!(Cli::try_parse_from(["usageguard", "--hard-limit", "-3"]).is_err());
        assert!(Cli::try_parse_from(["usageguard", "--hard-limit", "0"]).is_err());
        assert!(Cli::try_parse_from(["usageguard", "--hard-limit", "1"]).is_ok());
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let mut config = GuardConfig::parse(
            r#"
            [policy]
            hard_limit = 100

            [run]
            simulate = false
            "#,
        )
        .expect("config");

        let cli = Cli::try_parse_from(["usageguard", "--simulate", "--hard-limit", "5"])
            .expect("parse");
        cli.apply_overrides(&mut config);

        assert!(config.run.simulate);
        assert_eq!(config.policy.hard_limit, Some(5));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = GuardConfig::parse(
            r#"
            [policy]
            hard_limit = 100

            [run]
            simulate = true
            "#,
        )
        .expect("config");

        let cli = Cli::try_parse_from(["usageguard"]).expect("parse");
        cli.apply_overrides(&mut config);

        assert!(config.run.simulate);
        assert_eq!(config.policy.hard_limit, Some(100));
    }
}
