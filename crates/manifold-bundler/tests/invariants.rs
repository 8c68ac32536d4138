//! Properties that must hold for every build.

mod common;

use common::*;
use manifold_bundler::{
    BuildFlags, BuildMode, DiagnosticCode, DiagnosticRouter, DiagnosticSeverity, Orchestrator, SuppressionRule,
    Target,
};
use manifold_graph::{Module, ModuleGraph, ModuleId, SourceType};
use serde_json::Value;

fn framework_router() -> DiagnosticRouter {
    DiagnosticRouter::new().with_rule(SuppressionRule::circular_within("@framework/internal"))
}

#[tokio::test]
async fn disabled_transforms_change_nothing() {
    let with_gated = client().transform(gated("lower", Value::Null, "legacy"));
    // `lower` is graph to graph; put it ahead of `bundle` so the chain stays kind compatible.
    let with_gated = {
        let mut target = with_gated;
        let lower = target.transforms.pop().unwrap();
        target.transforms.insert(1, lower);
        target
    };
    let without = client();

    let graph = load(&project_files(), &[without.clone()]).await;
    let orchestrator = Orchestrator::new(framework_router());
    let flags = BuildFlags::new(BuildMode::Production, false);

    let a = orchestrator.build(vec![with_gated.clone()], flags, graph.clone()).await.unwrap();
    let b = orchestrator.build(vec![without], flags, graph.clone()).await.unwrap();
    assert_eq!(a.bundle("client"), b.bundle("client"));
    assert_eq!(a.diagnostics, b.diagnostics);

    // Enabled, it does change the output.
    let legacy = orchestrator
        .build(vec![with_gated], BuildFlags::new(BuildMode::Production, true), graph)
        .await
        .unwrap();
    let lowered = &legacy.bundle("client").unwrap().code;
    assert_ne!(Some(lowered), a.bundle("client").map(|bundle| &bundle.code));
    assert!(lowered.contains("var back"));
}

#[tokio::test]
async fn asset_emission_does_not_depend_on_target_order() {
    let forward = vec![client(), server(), service_worker()];
    let reverse = vec![service_worker(), server(), client()];
    let graph = load(&project_files(), &forward).await;

    let orchestrator = Orchestrator::new(framework_router());
    let mut reports = Vec::new();
    for targets in [forward, reverse] {
        reports.push(
            orchestrator
                .build(targets, BuildFlags::production(), graph.clone())
                .await
                .unwrap(),
        );
    }

    for report in &reports {
        assert!(report.is_success());
        assert_eq!(report.asset_writes, 1);
        assert_eq!(report.assets[0].owner, "client");
    }
    assert_eq!(reports[0].assets, reports[1].assets);
    for name in ["client", "server", "serviceworker"] {
        assert_eq!(reports[0].bundle(name), reports[1].bundle(name), "{name} differs across orders");
    }
}

fn layout_graph() -> ModuleGraph {
    let page = ModuleId::new("src/routes/index.js").unwrap();
    let layout = ModuleId::new("src/routes/_layout.js").unwrap();
    let mut importer = Module::from_source(
        page.clone(),
        SourceType::JavaScript,
        "import { preload, title } from './_layout.js';\nexport default () => [preload, title];\n",
    );
    importer.resolve_import("./_layout.js", Some(layout.clone()));
    ModuleGraph::from_modules([
        importer,
        Module::from_source(layout, SourceType::JavaScript, "export const heading = 'Home';\n"),
    ])
    .with_entries([page])
}

fn page_target(name: &str) -> Target {
    Target::new(name)
        .entry("src/routes/index.js")
        .transform(transform("bundle", Value::Null))
}

#[tokio::test]
async fn identical_diagnostics_route_identically_across_targets() {
    let router = DiagnosticRouter::new().with_rule(SuppressionRule::missing_export("preload"));
    let report = Orchestrator::new(router)
        .build(
            vec![page_target("client"), page_target("server"), page_target("serviceworker")],
            BuildFlags::production(),
            layout_graph(),
        )
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.suppressed.get("missing_export(preload)"), Some(&3));

    let reported: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::MissingExport)
        .collect();
    assert_eq!(
        reported.iter().map(|d| d.target.as_str()).collect::<Vec<_>>(),
        ["client", "server", "serviceworker"]
    );
    assert!(reported.iter().all(|d| d.export_name() == Some("title")));
    assert!(reported.iter().all(|d| d.severity == DiagnosticSeverity::Warning));
    assert!(reported.iter().all(|d| d.message == reported[0].message));
}

#[tokio::test]
async fn escalated_diagnostics_fail_every_target_alike() {
    let router = DiagnosticRouter::new()
        .with_rule(SuppressionRule::missing_export("preload"))
        .escalate(DiagnosticCode::MissingExport);
    let report = Orchestrator::new(router)
        .build(
            vec![page_target("client"), page_target("server")],
            BuildFlags::production(),
            layout_graph(),
        )
        .await
        .unwrap();

    assert!(report.failures().count() == 2);
    assert!(
        report
            .diagnostics
            .iter()
            .all(|d| d.severity == DiagnosticSeverity::Error && d.export_name() == Some("title"))
    );
    // Suppression runs before escalation.
    assert_eq!(report.suppressed.get("missing_export(preload)"), Some(&2));
}
