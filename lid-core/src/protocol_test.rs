#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, Utc};

    use crate::error::ErrorKind;
    use crate::protocol::{LockProtocol, LockVerdict, UnlockVerdict};
    use crate::types::{LockRecord, LockRequest, LockResponse, LockStatus, UnlockRequest, UnlockStatus};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn held(signee: &str, level: i64, expires_in_secs: i64) -> LockRecord {
        LockRecord::new("a", signee, level, now() + TimeDelta::seconds(expires_in_secs))
    }

    fn decide(current: Option<&LockRecord>, signee: &str, level: i64) -> LockVerdict {
        let req = LockRequest::new("a", signee, level);
        LockProtocol::decide_lock(current, &req, now(), now() + TimeDelta::seconds(10))
    }

    #[test]
    fn test_free_lock_is_granted() {
        match decide(None, "0", 0) {
            LockVerdict::Grant { record, response } => {
                assert_eq!(response, LockResponse::ok());
                assert_eq!(record.signee, "0");
                assert_eq!(record.expires_at, now() + TimeDelta::seconds(10));
            }
            LockVerdict::Deny => panic!("Expected Grant"),
        }
    }

    #[test]
    fn test_owner_always_renews() {
        // Lower level and an expired lease change nothing for the owner.
        for current in [held("0", 5, 30), held("0", 0, -30), held("0", -3, 0)] {
            let verdict = decide(Some(&current), "0", 1);
            let LockVerdict::Grant { record, response } = verdict else {
                panic!("Expected Grant for {current:?}");
            };
            assert_eq!(response.status, LockStatus::Renewed);
            assert_eq!(record.level, 1);
            assert_eq!(record.expires_at, now() + TimeDelta::seconds(10));
        }
    }

    #[test]
    fn test_higher_level_transfers() {
        let verdict = decide(Some(&held("0", 0, 30)), "1", 1);
        assert_eq!(
            verdict.into_result().unwrap(),
            LockResponse::transferred("0")
        );
    }

    #[test]
    fn test_expired_lock_transfers_at_any_level() {
        let verdict = decide(Some(&held("0", 9, -1)), "1", 0);
        assert_eq!(
            verdict.into_result().unwrap(),
            LockResponse::transferred("0")
        );
    }

    #[test]
    fn test_expiry_is_strict() {
        // Expiring exactly now is still valid.
        assert_eq!(decide(Some(&held("0", 0, 0)), "1", 0), LockVerdict::Deny);
    }

    #[test]
    fn test_equal_or_lower_level_is_forbidden() {
        assert_eq!(decide(Some(&held("0", 3, 30)), "1", 3), LockVerdict::Deny);
        assert_eq!(decide(Some(&held("0", 3, 30)), "1", 2), LockVerdict::Deny);
        let err = decide(Some(&held("0", 3, 30)), "1", 3).into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_negative_levels_compare_numerically() {
        let verdict = decide(Some(&held("0", -5, 30)), "1", -4);
        assert!(matches!(verdict, LockVerdict::Grant { .. }));
    }

    #[test]
    fn test_unlock_rules() {
        let req = UnlockRequest::new("a", "0");
        assert_eq!(LockProtocol::decide_unlock(None, &req), UnlockVerdict::NoLock);
        assert_eq!(
            LockProtocol::decide_unlock(Some(&held("0", 0, 30)), &req),
            UnlockVerdict::Release
        );
        // Expired or not, only the owner may release.
        assert_eq!(
            LockProtocol::decide_unlock(Some(&held("1", 0, -30)), &req),
            UnlockVerdict::Deny
        );

        assert_eq!(
            UnlockVerdict::NoLock.into_result().unwrap().status,
            UnlockStatus::NoLock
        );
        assert_eq!(
            UnlockVerdict::Release.into_result().unwrap().status,
            UnlockStatus::Ok
        );
        assert_eq!(
            UnlockVerdict::Deny.into_result().unwrap_err().kind(),
            ErrorKind::Forbidden
        );
    }
}
