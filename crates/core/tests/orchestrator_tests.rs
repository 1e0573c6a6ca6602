//! Integration tests for the plugin orchestrator
//!
//! Runs whole plans against in-memory capabilities and checks outcomes, the
//! installed-tool map and what was (not) touched.

mod support;

use plugstrap_core::capabilities::ProcessOutput;
use plugstrap_core::{Action, EngineOptions, Error, LogLevel, RunState, SkipReason};
use std::path::PathBuf;
use support::{Harness, phase, plan, repo_plugin, sha256_hex};

#[tokio::test]
async fn test_disabled_plugin_makes_no_calls() {
    let h = Harness::new();
    let plan = plan(&phase("misc", &[repo_plugin("tool", "enabled = false")]));

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan)
        .await
        .unwrap();

    let outcome = report.outcome("tool").unwrap();
    assert_eq!(outcome.action, Action::Skipped(SkipReason::Disabled));
    assert_eq!(h.source.total_calls(), 0);
    assert_eq!(h.http.download_count(), 0);
    assert!(h.process.runs.lock().unwrap().is_empty());
    // Only the install root itself was created
    assert_eq!(h.fs.call_count(), 1);
}

#[tokio::test]
async fn test_end_to_end_repository_install() {
    let h = Harness::new();
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool", "README.md"]);
    let plan = plan(&phase("misc", &[repo_plugin("tool", "")]));

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan)
        .await
        .unwrap();

    let outcome = report.outcome("tool").unwrap();
    assert_eq!(outcome.action, Action::Installed, "{outcome:?}");
    assert_eq!(outcome.installed_version.as_deref(), Some("2.0.0"));
    assert_eq!(outcome.latest_version.as_deref(), Some("2.0.0"));
    assert!(h.fs.contains(Harness::path("_Downloads/tool-2.0.0-x64.zip")));
    assert!(h.fs.contains(Harness::path("tool-2.0.0-x64/tool")));
    assert_eq!(
        report.install_roots()["tool"],
        Harness::path("tool-2.0.0-x64")
    );
    assert_eq!(report.state, RunState::RunComplete);
    assert!(h.sink.has(LogLevel::Success, "tool"));
}

#[tokio::test]
async fn test_second_run_is_up_to_date() {
    let h = Harness::new();
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    h.source.release("other", "1.4", "other-1.4-x64.zip");
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool"]);
    h.fs.script_archive("other-1.4-x64.zip", &["bin/other"]);
    let plan = plan(&phase(
        "misc",
        &[repo_plugin("tool", ""), repo_plugin("other", "")],
    ));
    let orchestrator = h.orchestrator(Harness::options());

    let first = orchestrator.resolve_plugins(&plan).await.unwrap();
    assert!(first.outcomes.iter().all(|o| o.action == Action::Installed));

    let second = orchestrator.resolve_plugins(&plan).await.unwrap();
    for outcome in &second.outcomes {
        assert_eq!(outcome.action, Action::Skipped(SkipReason::UpToDate), "{outcome:?}");
    }
    assert_eq!(h.http.download_count(), 2);
    assert_eq!(second.installed().len(), 2);
}

#[tokio::test]
async fn test_failure_is_isolated_to_one_plugin() {
    let h = Harness::new();
    h.source.fail("broken", 10, None);
    h.source.release("ok", "1.0.0", "ok-1.0.0-x64.zip");
    h.source.release("late", "3.1.0", "late-3.1.0-x64.zip");
    h.fs.script_archive("ok-1.0.0-x64.zip", &["ok"]);
    h.fs.script_archive("late-3.1.0-x64.zip", &["late"]);
    let manifest = [
        phase("first", &[repo_plugin("broken", ""), repo_plugin("ok", "")]),
        phase("second", &[repo_plugin("late", "")]),
    ]
    .concat();

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap();

    let broken = report.outcome("broken").unwrap();
    assert_eq!(broken.action, Action::Failed);
    assert!(broken.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(report.outcome("ok").unwrap().action, Action::Installed);
    assert_eq!(report.outcome("late").unwrap().action, Action::Installed);
    // Three attempts with the default two retries
    assert_eq!(h.source.calls("broken"), 3);
    assert!(h.sink.has(LogLevel::Error, "broken"));
}

#[tokio::test]
async fn test_mandatory_failure_aborts_later_phases() {
    let h = Harness::new();
    h.source.release("base", "1.0.0", "base-1.0.0-x64.zip");
    h.http.fail("https://example.com/base-1.0.0-x64.zip", 10, Some(503));
    h.source.release("late", "1.0.0", "late-1.0.0-x64.zip");
    let manifest = [
        phase("essentials", &[repo_plugin("base", "mandatory = true")]),
        phase("later", &[repo_plugin("late", "")]),
    ]
    .concat();

    let err = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap_err();

    let Error::FatalPlugin {
        plugin,
        cause,
        report,
    } = err
    else {
        panic!("expected a fatal plugin error");
    };
    assert_eq!(plugin, "base");
    assert!(cause.contains("HTTP 503"));
    assert_eq!(report.state, RunState::RunAborted);
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcome("late").is_none());
    assert_eq!(h.source.calls("late"), 0);
}

#[tokio::test]
async fn test_mandatory_failure_skips_rest_of_phase() {
    let h = Harness::new();
    h.source.release("base", "1.0.0", "base-1.0.0-x64.zip");
    h.http.fail("https://example.com/base-1.0.0-x64.zip", 10, Some(404));
    h.source.release("sibling", "1.0.0", "sibling-1.0.0-x64.zip");
    let manifest = phase(
        "essentials",
        &[repo_plugin("base", "mandatory = true"), repo_plugin("sibling", "")],
    );

    let err = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap_err();

    let Error::FatalPlugin { report, .. } = err else {
        panic!("expected a fatal plugin error");
    };
    assert_eq!(
        report.outcome("sibling").unwrap().action,
        Action::Skipped(SkipReason::Cancelled)
    );
    assert_eq!(h.source.calls("sibling"), 0);
}

#[tokio::test]
async fn test_unknown_latest_for_mandatory_plugin_fails_only_that_plugin() {
    let h = Harness::new();
    h.source.fail("base", 10, None);
    h.source.release("sibling", "1.0.0", "sibling-1.0.0-x64.zip");
    h.source.release("late", "1.0.0", "late-1.0.0-x64.zip");
    h.fs.script_archive("sibling-1.0.0-x64.zip", &["sibling"]);
    h.fs.script_archive("late-1.0.0-x64.zip", &["late"]);
    let manifest = [
        phase(
            "essentials",
            &[repo_plugin("base", "mandatory = true"), repo_plugin("sibling", "")],
        ),
        phase("later", &[repo_plugin("late", "")]),
    ]
    .concat();

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap();

    let base = report.outcome("base").unwrap();
    assert_eq!(base.action, Action::Failed);
    assert!(base.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(report.outcome("sibling").unwrap().action, Action::Installed);
    assert_eq!(report.outcome("late").unwrap().action, Action::Installed);
    assert_eq!(report.state, RunState::RunComplete);
}

#[tokio::test]
async fn test_installed_mandatory_plugin_survives_remote_failure() {
    let h = Harness::new();
    h.fs.add_file(support::Harness::path("base-1.0.0-x64/base"), b"binary");
    h.source.fail("base", 10, None);
    let manifest = phase("essentials", &[repo_plugin("base", "mandatory = true")]);

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap();

    let outcome = report.outcome("base").unwrap();
    assert_eq!(outcome.action, Action::Skipped(SkipReason::LatestUnknown));
    assert_eq!(outcome.installed_version.as_deref(), Some("1.0.0"));
    assert!(report.installed().contains_key("base"));
    assert!(h.sink.has(LogLevel::Warning, "base"));
    assert_eq!(report.warnings().count(), 1);
}

#[tokio::test]
async fn test_force_refresh_reinstalls_and_fails_on_unknown_latest() {
    let h = Harness::new();
    h.fs.add_file(Harness::path("tool-2.0.0-x64/tool"), b"binary");
    h.fs.add_file(Harness::path("flaky-1.0.0-x64/flaky"), b"binary");
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool"]);
    h.source.fail("flaky", 10, None);
    let manifest = phase("misc", &[repo_plugin("tool", ""), repo_plugin("flaky", "")]);
    let options = EngineOptions {
        force_refresh: true,
        ..Harness::options()
    };

    let report = h
        .orchestrator(options)
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap();

    assert_eq!(report.outcome("tool").unwrap().action, Action::Upgraded);
    assert_eq!(h.http.download_count(), 1);
    let flaky = report.outcome("flaky").unwrap();
    assert_eq!(flaky.action, Action::Failed);
    // Still usable, so it stays in the map
    assert!(report.installed().contains_key("flaky"));
}

#[tokio::test]
async fn test_outdated_install_is_upgraded() {
    let h = Harness::new();
    h.fs.add_file(Harness::path("tool-1.9.9-x64/tool"), b"binary");
    h.source.release("tool", "1.10.0", "tool-1.10.0-x64.zip");
    h.fs.script_archive("tool-1.10.0-x64.zip", &["tool"]);

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&phase("misc", &[repo_plugin("tool", "")])))
        .await
        .unwrap();

    let outcome = report.outcome("tool").unwrap();
    assert_eq!(outcome.action, Action::Upgraded);
    assert_eq!(outcome.installed_version.as_deref(), Some("1.10.0"));
    assert_eq!(report.install_roots()["tool"], Harness::path("tool-1.10.0-x64"));
}

#[tokio::test]
async fn test_cancelled_run_skips_everything() {
    let h = Harness::new();
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    let orchestrator = h.orchestrator(Harness::options());
    orchestrator.cancellation_token().cancel();

    let report = orchestrator
        .resolve_plugins(&plan(&phase("misc", &[repo_plugin("tool", "")])))
        .await
        .unwrap();

    assert_eq!(
        report.outcome("tool").unwrap().action,
        Action::Skipped(SkipReason::Cancelled)
    );
    assert_eq!(h.source.total_calls(), 0);
}

#[tokio::test]
async fn test_missing_requirement_fails_dependent() {
    let h = Harness::new();
    h.source.fail("base", 10, None);
    h.source.release("dependent", "1.0.0", "dependent-1.0.0-x64.zip");
    let manifest = [
        phase("first", &[repo_plugin("base", "")]),
        phase("second", &[repo_plugin("dependent", "requires = [\"base\"]")]),
    ]
    .concat();

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap();

    let dependent = report.outcome("dependent").unwrap();
    assert_eq!(dependent.action, Action::Failed);
    assert!(dependent.error.as_deref().unwrap().contains("dependency unavailable"));
    assert_eq!(h.source.calls("dependent"), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let h = Harness::new();
    h.source.fail("tool", 2, Some(502));
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    h.http.fail("https://example.com/tool-2.0.0-x64.zip", 1, None);
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool"]);

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&phase("misc", &[repo_plugin("tool", "")])))
        .await
        .unwrap();

    assert_eq!(report.outcome("tool").unwrap().action, Action::Installed);
    assert_eq!(h.source.calls("tool"), 3);
    assert_eq!(h.http.download_count(), 1);
}

#[tokio::test]
async fn test_checksum_mismatch_fails() {
    let h = Harness::new();
    h.source
        .release_with_digest("tool", "2.0.0", "tool-2.0.0-x64.zip", "sha256:deadbeef");
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool"]);

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&phase("misc", &[repo_plugin("tool", "")])))
        .await
        .unwrap();

    let outcome = report.outcome("tool").unwrap();
    assert_eq!(outcome.action, Action::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("checksum mismatch"));
    assert!(!h.fs.contains(Harness::path("tool-2.0.0-x64")));
}

#[tokio::test]
async fn test_matching_checksum_installs() {
    let h = Harness::new();
    let url = "https://example.com/tool-2.0.0-x64.zip";
    let digest = format!("sha256:{}", sha256_hex(url.as_bytes()));
    h.source
        .release_with_digest("tool", "2.0.0", "tool-2.0.0-x64.zip", &digest);
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool"]);

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&phase("misc", &[repo_plugin("tool", "")])))
        .await
        .unwrap();

    assert_eq!(report.outcome("tool").unwrap().action, Action::Installed);
}

#[tokio::test]
async fn test_corrupt_archive_fails() {
    let h = Harness::new();
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&phase("misc", &[repo_plugin("tool", "")])))
        .await
        .unwrap();

    let outcome = report.outcome("tool").unwrap();
    assert_eq!(outcome.action, Action::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("corrupt"));
}

const SEVEN_ZIP_AND_GIT: &str = r#"
[[phase]]
name = "essentials"

[[phase.plugin]]
name = "7zip"
mandatory = true
source = "direct-url"
base_uri = "https://www.7-zip.org/a/7z{version_compact}-x64.exe"
version_probe_url = "https://www.7-zip.org/download.html"
command_file_name = "7z.exe"

[[phase]]
name = "git environment"

[[phase.plugin]]
name = "git"
source = "repository"
repository_id = "git-for-windows/git"
asset_pattern = 'regex:^PortableGit-(?<version>[\d.]+)-64-bit\.7z\.exe$'
command_relative_path = "cmd"
command_file_name = "git.exe"
"#;

#[tokio::test]
async fn test_archiver_from_earlier_phase_extracts_git() {
    let h = Harness::new();
    h.source.release("7zip", "24.09", "7z2409-x64.exe");
    h.source
        .release("git", "2.45.1", "PortableGit-2.45.1-64-bit.7z.exe");
    // Silent installer drops 7z.exe into /D=<dest>
    h.process.script("7z2409-x64.exe", ProcessOutput::ok(""), &["7z.exe"]);
    // 7z.exe both reports its version and extracts into -o<dest>
    h.process.script(
        "7z.exe",
        ProcessOutput::ok("7-Zip 24.09 (x64) : Copyright (c) 1999-2024 Igor Pavlov"),
        &["cmd/git.exe", "bin/bash.exe"],
    );
    h.process
        .script("git.exe", ProcessOutput::ok("git version 2.45.1.windows.1"), &[]);

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(SEVEN_ZIP_AND_GIT))
        .await
        .unwrap();

    let seven = report.outcome("7zip").unwrap();
    assert_eq!(seven.action, Action::Installed, "{seven:?}");
    assert_eq!(seven.installed_version.as_deref(), Some("24.09"));
    let git = report.outcome("git").unwrap();
    assert_eq!(git.action, Action::Installed, "{git:?}");
    assert_eq!(git.installed_version.as_deref(), Some("2.45.1"));

    assert_eq!(report.install_roots()["7zip"], Harness::path("7zip"));
    assert_eq!(
        report.installed()["git"].command,
        Harness::path("PortableGit-2.45.1-64-bit/cmd/git.exe")
    );

    // The archiver was invoked by its resolved path, never through PATH
    let runs = h.process.runs.lock().unwrap();
    let extraction = runs
        .iter()
        .find(|(_, args)| args.first().is_some_and(|a| a == "x"))
        .unwrap();
    assert_eq!(extraction.0, Harness::path("7zip/7z.exe"));
    assert_eq!(
        extraction.1,
        vec![
            "x".to_string(),
            Harness::path("_Downloads/PortableGit-2.45.1-64-bit.7z.exe")
                .display()
                .to_string(),
            format!("-o{}", Harness::path("PortableGit-2.45.1-64-bit").display()),
            "-y".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_silent_installer_starts_from_empty_directory() {
    let h = Harness::new();
    h.source.release("7zip", "24.09", "7z2409-x64.exe");
    // Leftovers of an earlier, broken install
    h.fs.add_file(Harness::path("7zip/7-zip.dll"), b"stale");
    h.process.script("7z2409-x64.exe", ProcessOutput::ok(""), &["7z.exe"]);
    h.process.script("7z.exe", ProcessOutput::ok("7-Zip 24.09 (x64)"), &[]);
    let manifest = SEVEN_ZIP_AND_GIT.split("[[phase]]\nname = \"git").next().unwrap();

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(manifest))
        .await
        .unwrap();

    assert_eq!(report.outcome("7zip").unwrap().action, Action::Installed);
    assert!(h.fs.contains(Harness::path("7zip/7z.exe")));
    assert!(!h.fs.contains(Harness::path("7zip/7-zip.dll")));
}

#[tokio::test]
async fn test_installer_exit_code_is_reported() {
    let h = Harness::new();
    h.source.release("7zip", "24.09", "7z2409-x64.exe");
    h.process.script(
        "7z2409-x64.exe",
        ProcessOutput {
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "access denied".into(),
        },
        &[],
    );
    let manifest = SEVEN_ZIP_AND_GIT.replace("mandatory = true", "mandatory = false");

    let report = h
        .orchestrator(Harness::options())
        .resolve_plugins(&plan(&manifest))
        .await
        .unwrap();

    let seven = report.outcome("7zip").unwrap();
    assert_eq!(seven.action, Action::Failed);
    let error = seven.error.as_deref().unwrap();
    assert!(error.contains("exit code 2") && error.contains("access denied"), "{error}");

    let git = report.outcome("git").unwrap();
    assert_eq!(git.action, Action::Failed);
    assert!(git.error.as_deref().unwrap().contains("dependency unavailable"));
}

#[tokio::test]
async fn test_parallel_phase_keeps_declared_order() {
    let h = Harness::new();
    let names = ["alpha", "beta", "gamma", "delta"];
    for name in names {
        let asset = format!("{name}-1.0.0-x64.zip");
        h.source.release(name, "1.0.0", &asset);
        h.fs.script_archive(&asset, &[name]);
    }
    let plugins: Vec<String> = names.iter().map(|n| repo_plugin(n, "")).collect();
    let options = EngineOptions {
        max_parallel: 3,
        ..Harness::options()
    };

    let report = h
        .orchestrator(options)
        .resolve_plugins(&plan(&phase("misc", &plugins)))
        .await
        .unwrap();

    let order: Vec<_> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(order, names);
    assert_eq!(report.summary().installed, 4);
}

#[tokio::test]
async fn test_check_reports_without_installing() {
    let h = Harness::new();
    h.fs.add_file(Harness::path("tool-1.0.0-x64/tool"), b"binary");
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    h.source.fail("other", 10, Some(404));
    let plan = plan(&phase(
        "misc",
        &[
            repo_plugin("tool", ""),
            repo_plugin("other", ""),
            repo_plugin("off", "enabled = false"),
        ],
    ));

    let reports = h.orchestrator(Harness::options()).check(&plan).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].installed.as_deref(), Some("1.0.0"));
    assert_eq!(reports[0].latest.as_deref(), Some("2.0.0"));
    assert!(!reports[0].up_to_date);
    assert!(reports[1].error.as_deref().unwrap().contains("HTTP 404"));
    assert_eq!(h.http.download_count(), 0);
}

#[tokio::test]
async fn test_probe_installed_is_local_only() {
    let h = Harness::new();
    h.fs.add_file(Harness::path("tool-1.0.0-x64/bin/tool"), b"binary");
    let plan = plan(&phase("misc", &[repo_plugin("tool", ""), repo_plugin("other", "")]));

    let installed = h.orchestrator(Harness::options()).probe_installed(&plan).await;

    assert_eq!(installed.len(), 1);
    assert_eq!(
        installed["tool"].directory,
        PathBuf::from("/plugins/tool-1.0.0-x64/bin")
    );
    assert_eq!(h.source.total_calls(), 0);
}

#[tokio::test]
async fn test_free_function_matches_orchestrator() {
    let h = Harness::new();
    h.source.release("tool", "2.0.0", "tool-2.0.0-x64.zip");
    h.fs.script_archive("tool-2.0.0-x64.zip", &["tool"]);

    let report = plugstrap_core::resolve_plugins(
        &plan(&phase("misc", &[repo_plugin("tool", "")])),
        h.root(),
        h.services(),
        h.sources(),
        Harness::options(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome("tool").unwrap().action, Action::Installed);
    assert_eq!(report.run_id, uuid::Uuid::from_u128(0x1234));
}
