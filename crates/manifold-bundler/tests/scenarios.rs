//! End-to-end builds of the three-target fixture project.

mod common;

use std::time::Duration;

use common::*;
use manifold_bundler::{
    BuildFlags, DiagnosticCode, DiagnosticRouter, ExternalSpec, Orchestrator, PolicyViolation, RuntimeEnvironment,
    SuppressionRule, Target, TargetFailure, TransformRef,
};
use manifold_graph::{Module, ModuleGraph, ModuleId, SourceType};
use serde_json::Value;

fn framework_router() -> DiagnosticRouter {
    DiagnosticRouter::new()
        .with_rule(SuppressionRule::missing_export("preload"))
        .with_rule(SuppressionRule::circular_within("@framework/internal"))
}

#[tokio::test]
async fn framework_cycle_is_suppressed_for_every_target() {
    let targets = vec![client(), server(), service_worker()];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::new(framework_router())
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(report.targets.keys().collect::<Vec<_>>(), ["client", "server", "serviceworker"]);
    assert_eq!(report.suppressed.get("circular_within(@framework/internal)"), Some(&3));
    assert!(
        report
            .diagnostics
            .iter()
            .all(|d| d.code != DiagnosticCode::CircularDependency)
    );
}

#[tokio::test]
async fn framework_cycle_is_reported_without_the_rule() {
    let targets = vec![client(), server()];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::default()
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    let cycles: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::CircularDependency)
        .collect();
    assert_eq!(cycles.len(), 2);
    assert_eq!(cycles[0].target, "client");
    assert_eq!(cycles[1].target, "server");
    assert_eq!(cycles[0].scope.as_deref(), Some("@framework/internal"));
    assert_eq!(cycles[0].origin.as_deref(), Some("bundle"));
    assert!(report.is_success());
}

fn fs_graph() -> ModuleGraph {
    let app = ModuleId::new("src/app.js").unwrap();
    ModuleGraph::from_modules([Module::from_source(
        app.clone(),
        SourceType::JavaScript,
        "import { readFileSync } from 'fs';\nexport const config = readFileSync('config.json', 'utf8');\n",
    )])
    .with_entries([app])
}

fn fs_target(name: &str) -> Target {
    Target::new(name)
        .entry("src/app.js")
        .external(ExternalSpec::new("fs").requiring(["node"]))
        .transform(transform("bundle", Value::Null))
}

#[tokio::test]
async fn node_only_external_fails_the_browser_target_only() {
    let targets = vec![
        fs_target("client"),
        fs_target("server").environment(RuntimeEnvironment::Node),
        fs_target("serviceworker")
            .environment(RuntimeEnvironment::Worker)
            .runtime_assumed(["node"]),
    ];

    let report = Orchestrator::default()
        .build(targets, BuildFlags::production(), fs_graph())
        .await
        .unwrap();

    assert!(!report.is_success());
    match report.targets["client"].failure() {
        Some(TargetFailure::Policy(PolicyViolation::DisallowedExternal { external, requires, .. })) => {
            assert_eq!(external, "fs");
            assert!(requires.contains("node"));
        }
        other => panic!("expected a disallowed external, got {other:?}"),
    }

    for name in ["server", "serviceworker"] {
        let bundle = report.bundle(name).unwrap();
        assert_eq!(bundle.externals, ["fs"]);
        assert!(bundle.code.contains("import { readFileSync } from \"fs\";"));
    }
}

/// A CommonJS package whose transport has a browser replacement.
fn http_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        (
            "src/net.js",
            b"import { get } from 'http-lite';\nexport const load = () => get('/data');\n".to_vec(),
        ),
        (
            "node_modules/http-lite/package.json",
            br#"{ "name": "http-lite", "main": "index.js", "browser": { "./transport.js": "./transport-browser.js" } }"#
                .to_vec(),
        ),
        (
            "node_modules/http-lite/index.js",
            b"const transport = require('./transport.js');\nexports.get = (url) => transport.send(url);\n".to_vec(),
        ),
        (
            "node_modules/http-lite/transport.js",
            b"const http = require('http');\nexports.send = (url) => http.get(url);\n".to_vec(),
        ),
        (
            "node_modules/http-lite/transport-browser.js",
            b"exports.send = (url) => fetch(url);\n".to_vec(),
        ),
    ]
}

fn http_target(name: &str) -> Target {
    Target::new(name)
        .entry("src/net.js")
        .transform(transform("commonjs", Value::Null))
        .transform(transform("bundle", Value::Null))
}

#[tokio::test]
async fn each_target_resolves_through_its_own_main_fields() {
    let targets = vec![
        http_target("client"),
        http_target("server").environment(RuntimeEnvironment::Node).node_builtins(),
    ];
    let graph = load(&http_files(), &targets).await;

    let report = Orchestrator::default()
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures().collect::<Vec<_>>());

    let client = report.bundle("client").unwrap();
    assert!(client.code.contains("fetch(url)"));
    assert!(!client.code.contains("http.get"));
    assert!(!client.code.contains("require("));
    assert!(client.externals.is_empty());

    let server = report.bundle("server").unwrap();
    assert!(server.code.contains("http.get(url)"));
    assert!(!server.code.contains("fetch(url)"));
    assert_eq!(server.externals, ["http"]);
}

#[tokio::test]
async fn minify_follows_the_build_mode() {
    let dev_targets = vec![client()];
    let graph = load(&project_files(), &dev_targets).await;

    let orchestrator = Orchestrator::new(framework_router());
    let dev = orchestrator
        .build(dev_targets, BuildFlags::development(), graph.clone())
        .await
        .unwrap();
    let prod = orchestrator
        .build(vec![client()], BuildFlags::production(), graph)
        .await
        .unwrap();

    let dev = dev.bundle("client").unwrap();
    let prod = prod.bundle("client").unwrap();

    assert!(dev.code.contains("// boot the app"));
    assert!(dev.code.contains("\"development\" === 'development'"));
    assert!(!prod.code.contains("//"));
    assert!(!prod.code.contains("/*"));
    assert!(prod.code.contains("\"production\" === 'development'"));
    assert!(prod.size() < dev.size());

    // Same statements, modulo formatting and the mode literal.
    let statements = |code: &str| -> Vec<String> {
        code.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with("/*"))
            .map(|line| line.replace("\"development\"", "\"production\""))
            .collect()
    };
    assert_eq!(statements(&dev.code), statements(&prod.code));
}

#[tokio::test]
async fn shared_asset_is_emitted_once_by_its_owner() {
    // The owner starts late; the referencing target still sees one registration.
    let slow_client = {
        let mut target = client();
        target
            .transforms
            .insert(0, TransformRef::new(Delay(Duration::from_millis(50))));
        target
    };
    let targets = vec![server(), slow_client];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::default()
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(report.asset_writes, 1);
    assert_eq!(report.assets.len(), 1);

    let asset = &report.assets[0];
    assert_eq!(asset.owner, "client");
    assert_eq!(asset.asset_id, "src/images/logo.png");
    assert!(asset.public_url.starts_with("/client/"));
    assert_eq!(&asset.bytes[..], PNG);

    for name in ["client", "server"] {
        let code = &report.bundle(name).unwrap().code;
        assert!(code.contains(&asset.public_url), "{name} does not reference {}", asset.public_url);
        assert!(!code.contains("__MANIFOLD_ASSET_"));
    }
}

#[tokio::test]
async fn crashed_owner_still_serves_its_assets() {
    let crashing_client = {
        let mut target = client();
        target.transforms.insert(0, TransformRef::new(Explode));
        target
    };
    let targets = vec![crashing_client, server()];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::new(framework_router())
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    assert!(matches!(report.targets["client"].failure(), Some(TargetFailure::Panicked(_))));
    assert!(report.targets["server"].is_built(), "server: {:?}", report.targets["server"].failure());
    assert_eq!(report.asset_writes, 1);

    let asset = &report.assets[0];
    assert_eq!(asset.owner, "client");
    assert!(asset.public_url.starts_with("/client/"));
    assert!(report.bundle("server").unwrap().code.contains(&asset.public_url));
    assert!(report.diagnostics.iter().all(|d| d.code != DiagnosticCode::AssetMissing));
}

#[tokio::test]
async fn owner_that_never_emits_fails_the_waiting_target() {
    let svg_only_client = Target::new("client")
        .entry("src/client.js")
        .transform(transform(
            "url",
            serde_json::json!({ "source_dir": "src/images", "include": ["svg"] }),
        ))
        .transform(transform("bundle", Value::Null));
    let targets = vec![svg_only_client, server()];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::default()
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    assert!(report.targets["client"].is_built());
    assert!(matches!(
        report.targets["server"].failure(),
        Some(TargetFailure::Diagnostics { errors: 1, .. })
    ));
    let missing: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::AssetMissing)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].target, "server");
    assert_eq!(report.asset_writes, 0);
}

#[tokio::test]
async fn panicking_target_fails_alone() {
    let exploding = {
        let mut target = service_worker();
        target.transforms.insert(0, TransformRef::new(Explode));
        target
    };
    let targets = vec![client(), server(), exploding];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::new(framework_router())
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    assert!(report.targets["client"].is_built());
    assert!(report.targets["server"].is_built());
    match report.targets["serviceworker"].failure() {
        Some(TargetFailure::Panicked(message)) => assert!(message.contains("component compiler crashed")),
        other => panic!("expected a panic failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_entry_fails_that_target() {
    let broken = Target::new("admin")
        .entry("src/admin.js")
        .transform(transform("bundle", Value::Null));
    let targets = vec![client(), broken];
    let graph = load(&project_files(), &targets).await;

    let report = Orchestrator::new(framework_router())
        .build(targets, BuildFlags::production(), graph)
        .await
        .unwrap();

    assert!(report.targets["client"].is_built());
    assert!(!report.targets["admin"].is_built());
    let entry = report
        .diagnostics_for("admin")
        .find(|d| d.code == DiagnosticCode::UnresolvedEntry)
        .expect("unresolved entry reported");
    assert!(entry.is_error());
}

#[tokio::test]
async fn configuration_errors_abort_before_any_work() {
    let targets = vec![client(), client()];
    let result = Orchestrator::default()
        .build(targets, BuildFlags::production(), ModuleGraph::new())
        .await;
    assert!(result.is_err());

    let registry = manifold_bundler::TransformRegistry::with_builtins();
    assert!(registry.instantiate("url", serde_json::json!({ "emit": true }), Default::default()).is_err());
}
