//! Shared fixtures: a small three-target project held in memory.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use manifold_bundler::{
    Artifact, ArtifactKind, Gate, RuntimeEnvironment, Target, Transform, TransformContext, TransformError,
    TransformOutput, TransformRef, TransformRegistry,
};
use manifold_graph::{GraphLoader, MemoryRuntime, ModuleGraph};
use serde_json::{Value, json};

pub const ROOT: &str = "/project";

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a];

/// Source files of the fixture project.
pub fn project_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        (
            "src/client.js",
            b"import { start } from './app.js';\nimport logo from './images/logo.png';\n// boot the app\nstart(logo);\n".to_vec(),
        ),
        (
            "src/server.js",
            b"import { render } from './app.js';\nimport logo from './images/logo.png';\nexport function handle() {\n    return render(logo);\n}\n".to_vec(),
        ),
        (
            "src/service-worker.js",
            b"import { start } from './app.js';\nself.addEventListener('install', () => start('/offline'));\n".to_vec(),
        ),
        (
            "src/app.js",
            b"import { goto } from '@framework/internal';\n\n/* shared entry logic */\nexport function start(url) {\n    if (process.env.NODE_ENV === 'development') {\n        console.log('starting', url);\n    }\n    goto(url);\n}\n\nexport function render(url) {\n    return '<img src=\"' + url + '\">';\n}\n".to_vec(),
        ),
        (
            "node_modules/@framework/internal/package.json",
            br#"{ "name": "@framework/internal", "module": "index.mjs" }"#.to_vec(),
        ),
        (
            "node_modules/@framework/internal/index.mjs",
            b"import { navigate } from './router.mjs';\nexport function goto(url) {\n    navigate(url);\n}\n".to_vec(),
        ),
        (
            "node_modules/@framework/internal/router.mjs",
            b"import { goto } from './index.mjs';\nexport function navigate(url) {\n    history.pushState({}, '', url);\n}\nexport const back = () => goto(-1);\n".to_vec(),
        ),
        ("src/images/logo.png", PNG.to_vec()),
    ]
}

pub fn runtime(files: &[(&str, Vec<u8>)]) -> MemoryRuntime {
    let runtime = MemoryRuntime::new();
    for (path, content) in files {
        runtime.insert(format!("{ROOT}/{path}"), content);
    }
    runtime
}

/// Load the graph every target starts from.
pub async fn load(files: &[(&str, Vec<u8>)], targets: &[Target]) -> ModuleGraph {
    let loader = GraphLoader::new(Arc::new(runtime(files)), ROOT)
        .with_alias_fields(manifold_bundler::Orchestrator::resolution_fields(targets));
    loader
        .load(manifold_bundler::Orchestrator::entry_points(targets))
        .await
        .expect("fixture graph loads")
}

pub fn transform(name: &str, options: Value) -> TransformRef {
    TransformRegistry::with_builtins()
        .instantiate(name, options, Gate::always())
        .expect("valid transform options")
}

pub fn gated(name: &str, options: Value, gate: &str) -> TransformRef {
    transform(name, options).enabled_when(Gate::parse(gate).expect("valid gate"))
}

pub fn url(public_path: &str, emit: bool) -> TransformRef {
    transform(
        "url",
        json!({ "source_dir": "src/images", "public_path": public_path, "emit": emit }),
    )
}

pub fn client() -> Target {
    Target::new("client")
        .entry("src/client.js")
        .transform(url("/client/", true))
        .transform(transform("bundle", Value::Null))
        .transform(gated("minify", Value::Null, "!dev"))
}

pub fn server() -> Target {
    Target::new("server")
        .environment(RuntimeEnvironment::Node)
        .entry("src/server.js")
        .node_builtins()
        .transform(url("/server/", false))
        .transform(transform("bundle", Value::Null))
}

pub fn service_worker() -> Target {
    Target::new("serviceworker")
        .environment(RuntimeEnvironment::Worker)
        .entry("src/service-worker.js")
        .transform(transform("bundle", Value::Null))
        .transform(gated("minify", Value::Null, "!dev"))
}

/// Graph to graph transform that yields for a while before passing its input on.
#[derive(Debug)]
pub struct Delay(pub Duration);

#[async_trait]
impl Transform for Delay {
    fn name(&self) -> &str {
        "delay"
    }

    fn input_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    fn output_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    async fn apply(&self, artifact: Artifact, _ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        tokio::time::sleep(self.0).await;
        Ok(TransformOutput::new(artifact))
    }
}

/// Graph to graph transform that panics.
#[derive(Debug)]
pub struct Explode;

#[async_trait]
impl Transform for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    fn input_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    fn output_kind(&self) -> ArtifactKind {
        ArtifactKind::Graph
    }

    async fn apply(&self, _artifact: Artifact, _ctx: &TransformContext<'_>) -> Result<TransformOutput, TransformError> {
        panic!("component compiler crashed");
    }
}
