use crate::config::Mode;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub batch_limit: Option<usize>,
    pub compress: bool,
    pub precheck: bool,
    pub upload_timeout: Duration,
}

pub fn policy_for(mode: Mode) -> SyncPolicy {
    match mode {
        // Same transport profile; LocalFast only tightens the loop intervals.
        Mode::Realtime | Mode::LocalFast => SyncPolicy {
            batch_limit: None,
            compress: false,
            precheck: false,
            upload_timeout: Duration::from_secs(10),
        },
        Mode::Intermittent => SyncPolicy {
            batch_limit: Some(500),
            compress: true,
            precheck: true,
            upload_timeout: Duration::from_secs(30),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_uploads_everything_uncompressed() {
        let policy = policy_for(Mode::Realtime);
        assert_eq!(policy.batch_limit, None);
        assert!(!policy.compress);
        assert!(!policy.precheck);
        assert_eq!(policy.upload_timeout, Duration::from_secs(10));
    }

    #[test]
    fn localfast_matches_realtime_transport() {
        assert_eq!(policy_for(Mode::LocalFast), policy_for(Mode::Realtime));
    }

    #[test]
    fn intermittent_batches_compresses_and_prechecks() {
        let policy = policy_for(Mode::Intermittent);
        assert_eq!(policy.batch_limit, Some(500));
        assert!(policy.compress);
        assert!(policy.precheck);
        assert_eq!(policy.upload_timeout, Duration::from_secs(30));
    }
}
