#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use grader::backend::{ExecutionBackend, LocalBackend, OUTPUT_LIMIT};
use grader::config::BackendConfig;
use grader::models::{CheckSource, CheckSpec, TIMEOUT_EXIT_CODE, TestSpec};
use grader::{ActivityFile, ActivitySequencer, SourceFile, SourceFiles};

fn backend(root: &std::path::Path) -> Arc<LocalBackend> {
    Arc::new(
        LocalBackend::new(&BackendConfig {
            shell: "sh -c".into(),
            root: Some(root.to_path_buf()),
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn exec_captures_streams_and_exit_code() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let session = backend.open_session().await.unwrap();

    let result = backend
        .exec(session, "echo hi; echo oops >&2; exit 3", 5_000)
        .await
        .unwrap();

    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "oops\n");
    assert_eq!(result.exit_code, 3);
}

#[tokio::test]
async fn files_round_trip_and_missing_files_are_none() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let session = backend.open_session().await.unwrap();

    backend
        .upload_file(session, "src/main.txt", "hello")
        .await
        .unwrap();
    let result = backend.exec(session, "cat src/main.txt", 5_000).await.unwrap();
    assert_eq!(result.stdout, "hello");

    backend.exec(session, ": > empty.txt", 5_000).await.unwrap();
    assert_eq!(
        backend.download_file(session, "empty.txt").await.unwrap(),
        Some(Vec::new())
    );
    assert_eq!(backend.download_file(session, "nope.txt").await.unwrap(), None);
    assert!(backend.download_file(session, "../escape").await.is_err());
}

#[tokio::test]
async fn timeout_resolves_with_failure_code() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let session = backend.open_session().await.unwrap();

    let result = backend.exec(session, "sleep 5", 100).await.unwrap();

    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.stderr.contains("timed out"));
}

#[tokio::test]
async fn timeout_is_not_held_up_by_escaped_processes() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let session = backend.open_session().await.unwrap();

    let started = Instant::now();
    let result = backend
        .exec(session, "echo before; setsid sleep 30 & sleep 10", 200)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(result.stdout, "before\n");
}

#[tokio::test]
async fn finished_command_does_not_wait_for_escaped_processes() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let session = backend.open_session().await.unwrap();

    let started = Instant::now();
    let result = backend
        .exec(session, "setsid sleep 30 & echo done", 5_000)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "done\n");
}

#[tokio::test]
async fn oversized_output_is_truncated() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let session = backend.open_session().await.unwrap();

    let result = backend
        .exec(session, "yes | head -c 3000000", 10_000)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.starts_with("y\ny\n"));
    assert!(result.stdout.len() < OUTPUT_LIMIT + 100);
    assert!(result.stdout.ends_with("[output truncated: 1951424 bytes dropped]\n"));
}

#[tokio::test]
async fn sessions_are_isolated_and_closable() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let a = backend.open_session().await.unwrap();
    let b = backend.open_session().await.unwrap();

    backend.upload_file(a, "x.txt", "a").await.unwrap();
    assert_eq!(backend.download_file(b, "x.txt").await.unwrap(), None);

    let dir = backend.session_dir(a).unwrap();
    backend.close_session(a).unwrap();
    assert!(!dir.exists());
    assert!(backend.exec(a, "true", 1_000).await.is_err());
}

#[tokio::test]
async fn grades_an_activity_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let backend = backend(root.path());
    let sources = SourceFiles::new([SourceFile::new("answer.sh", "echo 41\n")]);
    let tests = vec![
        TestSpec::new("runs", ["sh answer.sh > out.txt"])
            .with_postcmds(["rm -f out.txt"])
            .with_check(CheckSpec::exact(CheckSource::File("out.txt".into()), "42\n")),
        TestSpec::new("prints", ["sh answer.sh"])
            .with_check(CheckSpec::regex(CheckSource::Stdout, r"(?m)^4\d$").unwrap()),
    ];
    let seq = ActivitySequencer::open(backend, sources.clone(), tests)
        .await
        .unwrap();

    let first = seq.submit(None).await.unwrap();
    assert!(first.outcomes[0].check_failed);
    assert!(!first.outcomes[1].failed());

    sources.edit("answer.sh", "echo 42\n").unwrap();
    let second = seq.submit(None).await.unwrap();
    assert!(second.passed());
}

#[tokio::test]
async fn activity_file_drives_a_fatal_abort() {
    let root = tempfile::tempdir().unwrap();
    let activity = ActivityFile::parse(
        r#"
id = "abort"
title = "Abort"

[[skeleton]]
filename = "main.sh"
data = "exit 1\n"

[[tests]]
name = "runs"
cmds = ["sh main.sh"]
postcmds = ["touch cleaned"]
fatal = true

[[tests]]
name = "unreached"
cmds = ["touch reached"]
"#,
    )
    .unwrap()
    .build(5_000)
    .unwrap();
    let backend = backend(root.path());
    let seq = ActivitySequencer::open(backend.clone(), activity.sources, activity.tests)
        .await
        .unwrap();

    let outcome = seq.submit(None).await.unwrap();

    assert!(outcome.aborted);
    assert_eq!(outcome.outcomes.len(), 1);
    let session = seq.session();
    assert!(backend.download_file(session, "cleaned").await.unwrap().is_some());
    assert!(backend.download_file(session, "reached").await.unwrap().is_none());
}
