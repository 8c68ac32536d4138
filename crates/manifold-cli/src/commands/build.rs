//! `manifold build`: load the graph once, build every target, write outputs.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use manifold_bundler::{Orchestrator, OutputSpec, TransformRegistry};
use manifold_graph::{GraphLoader, NativeRuntime};
use tracing::info;

use crate::cli::BuildArgs;
use crate::config::Project;
use crate::error::{CliError, Result};
use crate::{ui, writer};

pub async fn execute(args: BuildArgs) -> Result<()> {
    let started = Instant::now();
    let project = Project::load(&args.project, args.out_dir.clone())?;
    let flags = project.options.flags();

    let targets = project.targets(&TransformRegistry::with_builtins(), &args.project.targets)?;
    let orchestrator = Orchestrator::new(project.router());
    orchestrator.plan(&targets, &flags)?;

    ui::info(&format!(
        "Building {} targets ({}{})",
        targets.len(),
        flags.mode,
        if flags.legacy { ", legacy" } else { "" }
    ));

    let loader = GraphLoader::new(Arc::new(NativeRuntime::new()), project.root.clone())
        .with_alias_fields(Orchestrator::resolution_fields(&targets));
    let graph = loader.load(Orchestrator::entry_points(&targets)).await?;
    info!(modules = graph.len(), "source graph loaded");

    let outputs: IndexMap<String, OutputSpec> = targets
        .iter()
        .map(|target| (target.name.clone(), target.output.clone()))
        .collect();
    let report = orchestrator.build(targets, flags, graph).await?;

    let written = writer::write_report(
        &report,
        &outputs,
        &project.out_dir(),
        project.config.settings.asset_manifest,
    )?;
    ui::print_report(&report, &written, started.elapsed());

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::BuildFailed {
            failed: report.failures().count(),
            total: report.targets.len(),
        })
    }
}
