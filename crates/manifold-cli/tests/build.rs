//! End-to-end builds through the command implementations.

mod common;

use std::fs;

use manifold_cli::CliError;
use manifold_cli::cli::{BuildArgs, CheckArgs, ModeArg, ProjectArgs};
use manifold_cli::commands::{build_execute, check_execute};
use manifold_cli::writer::MANIFEST_FILE;

use common::{MANIFEST, files_with_extension, project, write};

fn args(root: &std::path::Path, mode: ModeArg) -> ProjectArgs {
    ProjectArgs {
        cwd: Some(root.to_path_buf()),
        mode: Some(mode),
        ..ProjectArgs::default()
    }
}

#[tokio::test]
async fn builds_every_target_and_emits_shared_assets_once() {
    let dir = project(MANIFEST);
    build_execute(BuildArgs {
        project: args(dir.path(), ModeArg::Production),
        out_dir: None,
    })
    .await
    .unwrap();

    let build = dir.path().join("build");
    let client = fs::read_to_string(build.join("client/client.js")).unwrap();
    let server = fs::read_to_string(build.join("server/index.js")).unwrap();

    let pngs = files_with_extension(&build, "png");
    assert_eq!(pngs.len(), 1, "asset written more than once: {pngs:?}");
    assert!(pngs[0].starts_with(build.join("client")));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(build.join(MANIFEST_FILE)).unwrap()).unwrap();
    let logo = &manifest["src/images/logo.png"];
    assert_eq!(logo["owner"], "client");
    let url = logo["url"].as_str().unwrap();
    assert!(url.starts_with("/client/"));
    assert!(client.contains(url));
    assert!(server.contains(url));
    assert!(!client.contains("// boot the app"));
}

#[tokio::test]
async fn development_mode_skips_minification() {
    let dir = project(MANIFEST);
    build_execute(BuildArgs {
        project: args(dir.path(), ModeArg::Development),
        out_dir: Some("dist".into()),
    })
    .await
    .unwrap();

    let client = fs::read_to_string(dir.path().join("dist/client/client.js")).unwrap();
    assert!(client.contains("// boot the app"));
}

#[tokio::test]
async fn selected_targets_only() {
    let dir = project(MANIFEST);
    let mut project_args = args(dir.path(), ModeArg::Production);
    project_args.targets = vec!["server".into()];
    build_execute(BuildArgs {
        project: project_args,
        out_dir: None,
    })
    .await
    .unwrap();

    assert!(dir.path().join("build/server/index.js").is_file());
    assert!(!dir.path().join("build/client").exists());
}

#[tokio::test]
async fn node_only_external_fails_the_client_and_keeps_the_server() {
    let manifest = MANIFEST.replacen(
        "entries = [\"src/client.js\"]",
        "entries = [\"src/client.js\"]\nexternals = [{ id = \"fs\", requires = [\"node\"] }]",
        1,
    );
    let dir = project(&manifest);
    write(
        dir.path(),
        "src/client.js",
        b"import { readFileSync } from 'fs';\nimport { start } from './app.js';\nimport logo from './images/logo.png';\nstart(readFileSync(logo));\n",
    );

    let err = build_execute(BuildArgs {
        project: args(dir.path(), ModeArg::Production),
        out_dir: None,
    })
    .await
    .unwrap_err();

    assert!(matches!(err, CliError::BuildFailed { failed: 1, total: 2 }));
    assert!(dir.path().join("build/server/index.js").is_file());
    assert!(!dir.path().join("build/client/client.js").exists());
}

#[tokio::test]
async fn profile_overrides_apply_for_the_mode() {
    let manifest = format!("{MANIFEST}\n[profiles.production.targets.client.output]\nfile = \"client.min.js\"\n");
    let dir = project(&manifest);
    build_execute(BuildArgs {
        project: args(dir.path(), ModeArg::Production),
        out_dir: None,
    })
    .await
    .unwrap();

    assert!(dir.path().join("build/client/client.min.js").is_file());
}

#[tokio::test]
async fn inconsistent_targets_abort_before_writing() {
    let manifest = MANIFEST.replace("name = \"server\"", "name = \"client\"");
    let dir = project(&manifest);
    let err = build_execute(BuildArgs {
        project: args(dir.path(), ModeArg::Production),
        out_dir: None,
    })
    .await
    .unwrap_err();

    assert!(matches!(err, CliError::Config(_) | CliError::Configuration(_)));
    assert!(!dir.path().join("build").exists());
}

#[tokio::test]
async fn check_validates_files_on_disk() {
    let dir = project(MANIFEST);
    check_execute(CheckArgs {
        project: args(dir.path(), ModeArg::Production),
    })
    .await
    .unwrap();

    fs::remove_file(dir.path().join("src/server.js")).unwrap();
    let err = check_execute(CheckArgs {
        project: args(dir.path(), ModeArg::Production),
    })
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        CliError::Config(manifold_config::ConfigError::EntryNotFound { ref target, .. }) if target == "server"
    ));
}
