mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;

use lazarus_utils::config::RecoveryConfig;
use lazarus_utils::recovery::ReplayMode;

#[derive(Parser, Debug)]
#[clap(name = "lazarus", version, about = "Crash and reboot recovery for tmux sessions")]
pub struct CliArgs {
    /// PostgreSQL connection string; without it state lives in memory
    #[clap(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Time between collector cycles
    #[clap(
        long,
        env = "LAZARUS_COLLECT_INTERVAL",
        default_value = "30s",
        parse(try_from_str = humantime::parse_duration)
    )]
    pub collect_interval: Duration,

    /// Snapshots retained per session
    #[clap(long, env = "LAZARUS_MAX_SNAPSHOTS", default_value = "50")]
    pub max_snapshots: usize,

    /// Upper bound for one restore job
    #[clap(
        long,
        env = "LAZARUS_RESTORE_TIMEOUT",
        default_value = "5m",
        parse(try_from_str = humantime::parse_duration)
    )]
    pub restore_timeout: Duration,

    /// Restore sessions lost to a reboot automatically, in this mode
    #[clap(long, env = "LAZARUS_BOOT_RESTORE_MODE")]
    pub boot_restore_mode: Option<ReplayMode>,

    /// Lines of pane content kept with each snapshot, 0 to disable
    #[clap(long, env = "LAZARUS_CAPTURE_LINES", default_value = "20")]
    pub capture_lines: u32,

    /// tmux executable
    #[clap(long, env = "LAZARUS_TMUX", default_value = "tmux")]
    pub tmux: String,

    /// Timeout for a single tmux invocation
    #[clap(
        long,
        env = "LAZARUS_TMUX_TIMEOUT",
        default_value = "10s",
        parse(try_from_str = humantime::parse_duration)
    )]
    pub tmux_timeout: Duration,

    /// How long shutdown waits for collector and restore tasks
    #[clap(
        long,
        env = "LAZARUS_SHUTDOWN_TIMEOUT",
        default_value = "15s",
        parse(try_from_str = humantime::parse_duration)
    )]
    pub shutdown_timeout: Duration,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect on an interval until interrupted
    Daemon,
    /// Run one collector cycle and print what it found
    Collect,
    /// Print the recovery overview
    Overview,
    /// List stored snapshots of a session, newest first
    Snapshots {
        session: String,
        #[clap(long, default_value = "20")]
        limit: usize,
    },
    /// List restore jobs, newest first
    Jobs {
        #[clap(long, default_value = "20")]
        limit: usize,
    },
    /// Restore a snapshot and wait for the job to finish
    Restore {
        snapshot_id: i64,
        /// safe, confirm or full
        #[clap(long, default_value = "confirm")]
        mode: String,
        /// rename, replace or skip
        #[clap(long, default_value = "rename")]
        conflict: String,
        /// Session name to create instead of the original
        #[clap(long, default_value = "")]
        target: String,
    },
    /// Stop offering a killed session for restore
    Archive { session: String },
}

impl CliArgs {
    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            collect_interval_secs: self.collect_interval.as_secs(),
            max_snapshots_per_session: self.max_snapshots,
            restore_timeout_secs: self.restore_timeout.as_secs(),
            boot_restore_mode: self.boot_restore_mode,
            capture_lines: self.capture_lines,
            tmux_binary: self.tmux.clone(),
            tmux_timeout_secs: self.tmux_timeout.as_secs(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    commands::run(args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_build_config() {
        let args = CliArgs::parse_from([
            "lazarus",
            "--collect-interval",
            "2m",
            "--boot-restore-mode",
            "full",
            "--capture-lines",
            "0",
            "collect",
        ]);
        let config = args.recovery_config();
        assert_eq!(config.collect_interval_secs, 120);
        assert_eq!(config.boot_restore_mode, Some(ReplayMode::Full));
        assert_eq!(config.capture_lines, 0);
        assert_eq!(config.restore_timeout_secs, 300);
        assert!(matches!(args.command, Command::Collect));
    }

    #[test]
    fn test_restore_flags() {
        let args = CliArgs::parse_from([
            "lazarus", "restore", "7", "--mode", "safe", "--target", "scratch",
        ]);
        match args.command {
            Command::Restore {
                snapshot_id,
                mode,
                conflict,
                target,
            } => {
                assert_eq!(snapshot_id, 7);
                assert_eq!(mode, "safe");
                assert_eq!(conflict, "rename");
                assert_eq!(target, "scratch");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_boot_mode_is_rejected() {
        let result = CliArgs::try_parse_from(["lazarus", "--boot-restore-mode", "yolo", "daemon"]);
        assert!(result.is_err());
    }
}
