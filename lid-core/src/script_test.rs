#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use crate::error::{ErrorKind, LockError};
    use crate::infrastructure::LockServiceExt;
    use crate::infrastructure_in_memory::InMemoryLockService;
    use crate::script::{
        ScriptCommand, ScriptEntry, ScriptError, build_script, parse_script, run_script,
    };
    use crate::types::*;

    fn service() -> InMemoryLockService {
        InMemoryLockService::new(ServiceOptions::new(TimeDelta::seconds(10)))
    }

    #[test]
    fn test_parse_each_command() {
        let script = r#"
            {"d": -20000}
            {"l": {"req": {"signature": "a", "signee": "0", "level": 2}, "opts": {"force": true, "duration_ms": 500}}}
            {"u": {"req": {"signature": "a", "signee": "0"}}}
            {"c": {"signature": "a"}}
        "#;
        let commands = parse_script(script).unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0], ScriptCommand::Duration(-20_000));
        match &commands[1] {
            ScriptCommand::Lock { req, opts } => {
                assert_eq!(req, &LockRequest::new("a", "0", 2));
                let opts = opts.as_ref().unwrap();
                assert!(opts.force);
                assert_eq!(opts.duration, Some(TimeDelta::milliseconds(500)));
            }
            other => panic!("Expected Lock, got {other:?}"),
        }
        assert_eq!(commands[2], ScriptCommand::unlock("a", "0"));
        assert_eq!(commands[3], ScriptCommand::check("a"));
    }

    #[test]
    fn test_level_defaults_to_zero() {
        let commands = parse_script(r#"{"l": {"req": {"signature": "a", "signee": "0"}}}"#).unwrap();
        assert_eq!(commands, vec![ScriptCommand::lock("a", "0", 0)]);
    }

    #[test]
    fn test_malformed_script_runs_nothing() {
        let service = service();
        let script = r#"{"l": {"req": {"signature": "a", "signee": "0"}}} {"x": 1}"#;
        let err = run_script(script, &service).unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
        assert_eq!(service.held_count(), 0);
    }

    #[test]
    fn test_out_of_range_duration_override_is_a_parse_error() {
        let script = r#"{"l": {"req": {"signature": "a", "signee": "0"}, "opts": {"duration_ms": -9223372036854775808}}}"#;
        assert!(matches!(parse_script(script), Err(ScriptError::Parse(_))));

        let script = r#"{"l": {"req": {"signature": "a", "signee": "0"}, "opts": {"ttl_ms": -9223372036854775808}}}"#;
        assert!(matches!(parse_script(script), Err(ScriptError::Parse(_))));
    }

    #[test]
    fn test_out_of_range_duration_command_runs_nothing() {
        let service = service();
        let script = r#"
            {"l": {"req": {"signature": "a", "signee": "0"}}}
            {"d": -9223372036854775808}
        "#;
        let err = run_script(script, &service).unwrap_err();
        assert!(matches!(err, ScriptError::InvalidDuration(i64::MIN)));
        assert_eq!(service.held_count(), 0);
        assert_eq!(service.duration(), TimeDelta::seconds(10));
    }

    #[test]
    fn test_duration_conversions_reject_out_of_range() {
        assert_eq!(duration_from_millis(-20_000).unwrap(), TimeDelta::seconds(-20));
        assert_eq!(duration_from_secs(90).unwrap(), TimeDelta::seconds(90));
        assert!(matches!(duration_from_millis(i64::MIN), Err(LockError::BadRequest(_))));
        assert!(matches!(
            duration_from_secs(9_223_372_036_854_776),
            Err(LockError::BadRequest(_))
        ));
    }

    #[test]
    fn test_build_script_parses_back() {
        let commands = vec![
            ScriptCommand::duration_secs(-20),
            ScriptCommand::lock("a", "0", 1),
            ScriptCommand::unlock("a", "0"),
        ];
        let script = build_script(&commands).unwrap();
        assert_eq!(script.lines().count(), 3);
        assert_eq!(parse_script(&script).unwrap(), commands);
    }

    #[test]
    fn test_run_records_history_and_errors() {
        let service = service();
        let script = r#"
            {"d": -20000}
            {"l": {"req": {"signature": "a", "signee": "0"}}}
            {"d": 10000}
            {"l": {"req": {"signature": "a", "signee": "1"}}}
            {"l": {"req": {"signature": "a", "signee": "2"}}}
            {"u": {"req": {"signature": "a", "signee": "0"}}}
            {"c": {"signature": "b"}}
        "#;
        let response = run_script(script, &service).unwrap();
        assert_eq!(
            response.history,
            vec![
                ScriptEntry::lock(LockResponse::ok(), None),
                ScriptEntry::lock(LockResponse::transferred("0"), None),
                ScriptEntry::lock(LockResponse::failed(), Some(ErrorKind::Forbidden)),
                ScriptEntry::unlock(UnlockResponse::failed(), Some(ErrorKind::Forbidden)),
                ScriptEntry::Check {
                    response: None,
                    error: Some(ErrorKind::NotFound)
                },
            ]
        );
        assert_eq!(service.duration(), TimeDelta::seconds(10));
    }

    #[test]
    fn test_history_serializes_with_op_tag() {
        let entry = ScriptEntry::lock(LockResponse::transferred("0"), None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "op": "lock",
                "response": {"status": "TRANSFERRED", "previous_signee": "0"},
                "error": null
            })
        );
    }
}
