// Restore target resolution
//
// Picks the session name a restore will create, applying the conflict policy
// when the requested name is taken.

use log::info;

use lazarus_utils::recovery::ConflictPolicy;

use crate::error::{RecoveryError, RecoveryResult};
use crate::integrations::{TmuxClient, TmuxControl, TmuxQuery};

/// Highest `-restored-NN` suffix probed under the rename policy.
pub const MAX_RENAME_SUFFIX: u32 = 99;

pub fn restored_name(base: &str, suffix: u32) -> String {
    format!("{}-restored-{:02}", base, suffix)
}

/// Resolve `requested` against live sessions.
///
/// `replace` kills the existing session before returning its name, so the
/// caller can create it afresh.
pub async fn resolve_restore_target(
    tmux: &dyn TmuxClient,
    requested: &str,
    policy: ConflictPolicy,
) -> RecoveryResult<String> {
    if !tmux.has_session(requested).await? {
        return Ok(requested.to_string());
    }

    match policy {
        ConflictPolicy::Replace => {
            info!("Lazarus: replacing existing session {}", requested);
            tmux.kill_session(requested).await?;
            Ok(requested.to_string())
        }
        ConflictPolicy::Skip => Err(RecoveryError::TargetExists(requested.to_string())),
        ConflictPolicy::Rename => {
            for suffix in 1..=MAX_RENAME_SUFFIX {
                let candidate = restored_name(requested, suffix);
                if !tmux.has_session(&candidate).await? {
                    return Ok(candidate);
                }
            }
            Err(RecoveryError::NoFreeRestoreName(requested.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::MockTmux;

    #[test]
    fn test_restored_name_is_zero_padded() {
        assert_eq!(restored_name("dev", 1), "dev-restored-01");
        assert_eq!(restored_name("dev", 42), "dev-restored-42");
    }

    #[tokio::test]
    async fn test_free_name_is_used_as_is() {
        let mock = MockTmux::new();
        let target = resolve_restore_target(&mock, "dev", ConflictPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(target, "dev");
    }

    #[tokio::test]
    async fn test_rename_takes_next_free_suffix() {
        let mock = MockTmux::new();
        mock.spawn_session("dev", "/", "zsh");
        mock.spawn_session("dev-restored-01", "/", "zsh");

        let target = resolve_restore_target(&mock, "dev", ConflictPolicy::Rename)
            .await
            .unwrap();
        assert_eq!(target, "dev-restored-02");
    }

    #[tokio::test]
    async fn test_rename_exhausted() {
        let mock = MockTmux::new();
        mock.spawn_session("dev", "/", "zsh");
        for suffix in 1..=MAX_RENAME_SUFFIX {
            mock.spawn_session(&restored_name("dev", suffix), "/", "zsh");
        }

        let err = resolve_restore_target(&mock, "dev", ConflictPolicy::Rename)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::NoFreeRestoreName(_)));
    }

    #[tokio::test]
    async fn test_skip_fails_without_touching_tmux() {
        let mock = MockTmux::new();
        mock.spawn_session("dev", "/", "zsh");

        let err = resolve_restore_target(&mock, "dev", ConflictPolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::TargetExists(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replace_kills_existing() {
        let mock = MockTmux::new();
        mock.spawn_session("dev", "/", "zsh");

        let target = resolve_restore_target(&mock, "dev", ConflictPolicy::Replace)
            .await
            .unwrap();
        assert_eq!(target, "dev");
        assert!(mock.session_names().is_empty());
    }
}
