use std::collections::BTreeMap;
use std::path::Path;

use envmap::{EnvLoader, Error, ParseErrorKind, SubstitutionMode, TargetEnv};
use tempfile::TempDir;

#[test]
fn override_existing_false_skips_existing_values() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=from_file\nB=2\n");

    let mut initial = BTreeMap::new();
    initial.insert("A".to_string(), "existing".to_string());

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::from_memory(initial))
        .override_existing(false);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 1);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "existing");
    assert_eq!(map.get("B").expect("B should exist"), "2");
}

#[test]
fn override_existing_true_replaces_values() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=from_file\n");

    let mut initial = BTreeMap::new();
    initial.insert("A".to_string(), "existing".to_string());

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::from_memory(initial))
        .override_existing(true);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 0);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "from_file");
}

#[test]
fn read_merges_files_keeping_first_positions() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join(".env.base");
    let second = dir.path().join(".env.local");
    write_file(&first, "A=base\nB=base\n");
    write_file(&second, "C=local\nB=local\n");

    let map = EnvLoader::new()
        .paths([first, second])
        .read()
        .expect("read should succeed");

    let entries: Vec<_> = map.iter().collect();
    assert_eq!(entries, [("A", "base"), ("B", "local"), ("C", "local")]);
}

#[test]
fn read_does_not_touch_target() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=1\n");

    let loader = EnvLoader::new().path(&file).target(TargetEnv::memory());
    let map = loader.read().expect("read should succeed");

    assert_eq!(map.get("A"), Some(("1", 0)));
    let target = loader.target_env().as_memory().expect("memory target");
    assert!(target.is_empty());
}

#[test]
fn later_files_see_variables_loaded_by_earlier_files() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join(".env.base");
    let second = dir.path().join(".env.local");
    write_file(&first, "ROOT=/srv\n");
    write_file(&second, "DATA=$ROOT/data\n");

    let mut loader = EnvLoader::new()
        .paths([first, second])
        .target(TargetEnv::memory());
    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 2);
    assert_eq!(report.loaded, 2);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("DATA").expect("DATA should exist"), "/srv/data");
}

#[test]
fn missing_file_returns_io_error() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let missing = dir.path().join("missing.env");

    let mut loader = EnvLoader::new().path(missing);
    let err = loader.load().expect_err("expected I/O error");

    match err {
        Error::Io(io_err) => assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn failing_file_aborts_without_rolling_back_earlier_files() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let good = dir.path().join(".env.good");
    let bad = dir.path().join(".env.bad");
    let never = dir.path().join(".env.never");
    write_file(&good, "A=1\n");
    write_file(&bad, "B=2\nBAD LINE\n");
    write_file(&never, "C=3\n");

    let mut loader = EnvLoader::new()
        .paths([good, bad, never])
        .target(TargetEnv::memory());
    let err = loader.load().expect_err("expected parse error");

    match err {
        Error::Parse(parse_err) => {
            assert_eq!(parse_err.kind, ParseErrorKind::MissingSeparator);
            assert_eq!(parse_err.line, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").map(String::as_str), Some("1"));
    assert!(!map.contains_key("B"));
    assert!(!map.contains_key("C"));
}

#[test]
fn substitution_uses_target_environment_for_missing_values() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "OUT=${BASE}/bin\n");

    let mut initial = BTreeMap::new();
    initial.insert("BASE".to_string(), "/opt/app".to_string());

    let mut loader = EnvLoader::new()
        .path(file)
        .target(TargetEnv::from_memory(initial));

    loader.load().expect("load should succeed");

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("OUT").expect("OUT should exist"), "/opt/app/bin");
}

#[test]
fn substitution_prefers_file_values_over_target() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=file\nB=${A}\n");

    let mut initial = BTreeMap::new();
    initial.insert("A".to_string(), "existing".to_string());

    let mut loader = EnvLoader::new()
        .path(file)
        .target(TargetEnv::from_memory(initial))
        .override_existing(false);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "existing");
    assert_eq!(map.get("B").expect("B should exist"), "file");
}

#[test]
fn unknown_placeholders_expand_to_empty() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=prefix-${MISSING}-$OTHER-suffix\n");

    let map = EnvLoader::new()
        .path(file)
        .read()
        .expect("read should succeed");

    assert_eq!(map.get("A"), Some(("prefix---suffix", 0)));
}

#[test]
fn disabled_substitution_keeps_placeholders() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=1\nB=${A}\n");

    let map = envmap::read_no_expand([&file]).expect("read should succeed");
    assert_eq!(map.get("B"), Some(("${A}", 1)));

    let map = EnvLoader::new()
        .path(&file)
        .substitution_mode(SubstitutionMode::Disabled)
        .read()
        .expect("read should succeed");
    assert_eq!(map.get("B"), Some(("${A}", 1)));
}

#[test]
fn write_then_read_round_trips() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let source = dir.path().join(".env");
    let copy = dir.path().join(".env.copy");
    write_file(
        &source,
        "export Z=last # note\nA='single $X'\nM=\"multi\\nline\"\nQ: \"quote \\\" inside\"\n",
    );

    let original = envmap::read_no_expand([&source]).expect("read should succeed");
    envmap::write(&original, &copy).expect("write should succeed");
    let reread = envmap::read_no_expand([&copy]).expect("reread should succeed");

    assert_eq!(original, reread);
    assert_eq!(
        std::fs::read_to_string(&copy).expect("copy should exist"),
        "Z=\"last\"\nA=\"single $X\"\nM=\"multi\\nline\"\nQ=\"quote \\\" inside\"\n"
    );
}

#[cfg(unix)]
#[test]
fn exec_runs_command_with_loaded_variables() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "ENVMAP_EXEC_CHECK=expected\n");

    let status = envmap::exec(
        [&file],
        "sh",
        &["-c", "test \"$ENVMAP_EXEC_CHECK\" = expected"],
    )
    .expect("exec should start the command");
    assert!(status.success());
}

#[cfg(unix)]
#[test]
fn exec_applies_files_in_order_before_running() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join(".env.first");
    let second = dir.path().join(".env.second");
    write_file(&first, "ENVMAP_EXEC_DUP=first\nENVMAP_EXEC_BASE=/x\n");
    write_file(
        &second,
        "ENVMAP_EXEC_DUP=second\nENVMAP_EXEC_REF=$ENVMAP_EXEC_BASE/y\n",
    );

    let status = envmap::exec(
        [&first, &second],
        "sh",
        &[
            "-c",
            "test \"$ENVMAP_EXEC_DUP\" = first && test \"$ENVMAP_EXEC_REF\" = /x/y",
        ],
    )
    .expect("exec should start the command");
    assert!(status.success());
}

#[test]
fn into_target_returns_loaded_environment() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=1\n");

    let mut loader = EnvLoader::new().path(&file);
    loader.load().expect("load should succeed");

    let target = loader.into_target();
    let map = target.as_memory().expect("memory target");
    assert_eq!(map.get("A").map(String::as_str), Some("1"));
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write test file");
}
