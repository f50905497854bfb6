//! Analytics refresh gated on transcript modification time.

mod test_utils;

use agentdeck::analytics::{AnalyticsCache, RefreshOutcome, SessionAnalytics};
use agentdeck::config::Config;
use agentdeck::error::AnalyticsError;
use agentdeck::session::{InstanceRegistry, NewInstance, Tool};
use agentdeck::transcript::{SessionLogLocator, TranscriptFormat, TranscriptRoots};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use test_utils::{
    claude_session_jsonl, gemini_session_json, gemini_session_json_at, set_age,
    write_claude_session, write_gemini_session, FakeMultiplexer,
};

const GEMINI_ID: &str = "4d8fcb4d-aaaa-bbbb-cccc-000000000000";

struct Env {
    _roots: tempfile::TempDir,
    workdir: tempfile::TempDir,
    gemini_root: PathBuf,
    claude_root: PathBuf,
    registry: InstanceRegistry,
}

fn env() -> Env {
    let roots = tempfile::tempdir().unwrap();
    let gemini_root = roots.path().join("gemini");
    let claude_root = roots.path().join("claude");

    let mut config = Config::default();
    config.gemini.config_dir = Some(gemini_root.clone());
    config.claude.config_dir = Some(claude_root.clone());

    let registry = InstanceRegistry::new(Arc::new(FakeMultiplexer::default()), config);
    Env {
        _roots: roots,
        workdir: tempfile::tempdir().unwrap(),
        gemini_root,
        claude_root,
        registry,
    }
}

fn add(env: &mut Env, name: &str, tool: Tool) {
    env.registry
        .create(NewInstance {
            name: name.to_string(),
            workdir: env.workdir.path().to_path_buf(),
            tool,
            yolo_mode: None,
            model: None,
        })
        .unwrap()
        .start()
        .unwrap();
}

mod fingerprint {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unchanged_transcript_is_parsed_once() {
        let mut env = env();
        add(&mut env, "g", Tool::Gemini);
        let path = write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json(GEMINI_ID, &[(10, 1), (20, 2), (30, 3)]),
        );
        set_age(&path, 120);

        assert_eq!(env.registry.refresh("g").unwrap(), RefreshOutcome::Updated);
        assert_eq!(env.registry.refresh("g").unwrap(), RefreshOutcome::Unchanged);

        let analytics = env.registry.get("g").unwrap().analytics();
        assert_eq!(analytics.input_tokens, 60);
        assert_eq!(analytics.output_tokens, 6);
        assert_eq!(analytics.total_turns, 3);
        assert_eq!(analytics.current_context_tokens, 30);
        assert_eq!(analytics.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(analytics.duration().map(|d| d.num_minutes()), Some(45));
    }

    #[test]
    fn new_mtime_rebuilds_counters_from_scratch() {
        let mut env = env();
        add(&mut env, "g", Tool::Gemini);
        let path = write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json(GEMINI_ID, &[(10, 1)]),
        );
        set_age(&path, 120);
        env.registry.refresh("g").unwrap();

        std::fs::write(&path, gemini_session_json(GEMINI_ID, &[(10, 1), (40, 4)])).unwrap();
        set_age(&path, 60);

        assert_eq!(env.registry.refresh("g").unwrap(), RefreshOutcome::Updated);
        let analytics = env.registry.get("g").unwrap().analytics();
        assert_eq!(analytics.input_tokens, 50);
        assert_eq!(analytics.total_turns, 2);
        assert_eq!(analytics.current_context_tokens, 40);
    }

    #[test]
    fn parse_failure_keeps_previous_snapshot() {
        let mut env = env();
        add(&mut env, "g", Tool::Gemini);
        let path = write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json(GEMINI_ID, &[(10, 1)]),
        );
        set_age(&path, 120);
        env.registry.refresh("g").unwrap();
        let before = env.registry.get("g").unwrap().analytics();

        std::fs::write(&path, "{\"sessionId\": ").unwrap();
        set_age(&path, 60);

        let err = env.registry.refresh("g").unwrap_err();
        assert!(matches!(err, AnalyticsError::Parse(_)));
        assert_eq!(env.registry.get("g").unwrap().analytics(), before);
    }
}

mod discovery {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn gemini_session_id_comes_from_newest_session_file() {
        let mut env = env();
        add(&mut env, "g", Tool::Gemini);
        let path = write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json(GEMINI_ID, &[(5, 1)]),
        );
        set_age(&path, 30);

        assert_eq!(env.registry.refresh("g").unwrap(), RefreshOutcome::Updated);
        let instance = env.registry.get("g").unwrap();
        assert_eq!(instance.tool_session_id(), Some(GEMINI_ID));
        assert_eq!(instance.analytics().session_id, GEMINI_ID);
    }

    #[test]
    fn instances_sharing_a_directory_do_not_share_a_session() {
        const SECOND_ID: &str = "9e1d0c2b-aaaa-bbbb-cccc-111111111111";
        let mut env = env();
        add(&mut env, "first", Tool::Gemini);
        add(&mut env, "second", Tool::Gemini);
        write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json(GEMINI_ID, &[(5, 1)]),
        );

        assert_eq!(env.registry.refresh("first").unwrap(), RefreshOutcome::Updated);
        assert_eq!(
            env.registry.refresh("second").unwrap(),
            RefreshOutcome::Unavailable
        );
        assert_eq!(env.registry.get("second").unwrap().tool_session_id(), None);

        write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-05",
            SECOND_ID,
            &gemini_session_json(SECOND_ID, &[(7, 1)]),
        );
        env.registry.refresh("second").unwrap();
        env.registry.refresh("first").unwrap();
        assert_eq!(
            env.registry.get("second").unwrap().tool_session_id(),
            Some(SECOND_ID)
        );
        assert_eq!(
            env.registry.get("first").unwrap().tool_session_id(),
            Some(GEMINI_ID)
        );
    }

    #[test]
    fn session_older_than_the_instance_is_not_adopted() {
        let mut env = env();
        let yesterday = chrono::Utc::now() - chrono::Duration::days(1);
        write_gemini_session(
            &env.gemini_root,
            env.workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json_at(
                GEMINI_ID,
                &[(5, 1)],
                yesterday - chrono::Duration::minutes(30),
                yesterday,
            ),
        );
        add(&mut env, "g", Tool::Gemini);

        assert_eq!(env.registry.refresh("g").unwrap(), RefreshOutcome::Unavailable);
        assert_eq!(env.registry.get("g").unwrap().tool_session_id(), None);
    }

    #[test]
    fn claude_instance_reads_its_own_log() {
        let mut env = env();
        add(&mut env, "c", Tool::Claude);
        let id = env
            .registry
            .get("c")
            .unwrap()
            .tool_session_id()
            .unwrap()
            .to_string();
        write_claude_session(
            &env.claude_root,
            env.workdir.path(),
            &id,
            &claude_session_jsonl(&id, &[(100, 10), (200, 20)]),
        );

        assert_eq!(env.registry.refresh("c").unwrap(), RefreshOutcome::Updated);
        let analytics = env.registry.get("c").unwrap().analytics();
        assert_eq!(analytics.total_turns, 2);
        assert_eq!(analytics.input_tokens, 300);
        assert_eq!(analytics.message_count, 3);
    }

    #[test]
    fn no_transcript_yet_is_unavailable() {
        let mut env = env();
        add(&mut env, "c", Tool::Claude);
        add(&mut env, "sh", Tool::Shell);

        assert_eq!(env.registry.refresh("c").unwrap(), RefreshOutcome::Unavailable);
        assert_eq!(env.registry.refresh("sh").unwrap(), RefreshOutcome::Unavailable);
        assert!(env.registry.get("c").unwrap().analytics().is_empty());
    }
}

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn concurrent_refreshes_of_one_slot_parse_once() {
        let roots = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();
        let path = write_gemini_session(
            roots.path(),
            workdir.path(),
            "2025-03-01T09-00",
            GEMINI_ID,
            &gemini_session_json(GEMINI_ID, &[(1, 1)]),
        );
        set_age(&path, 60);

        let cache = Arc::new(AnalyticsCache::new(SessionLogLocator::new(
            TranscriptRoots::new(roots.path(), roots.path().join("claude")),
        )));
        let slot = Arc::new(Mutex::new(SessionAnalytics::default()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let slot = Arc::clone(&slot);
                let workdir = workdir.path().to_path_buf();
                thread::spawn(move || {
                    cache
                        .refresh_slot(TranscriptFormat::Gemini, &workdir, GEMINI_ID, &slot)
                        .unwrap()
                })
            })
            .collect();
        let outcomes: Vec<RefreshOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let updated = outcomes
            .iter()
            .filter(|o| **o == RefreshOutcome::Updated)
            .count();
        assert_eq!(updated, 1);
        assert_eq!(slot.lock().unwrap().total_turns, 1);
    }
}
