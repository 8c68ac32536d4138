//! Drives every target of one invocation.
//!
//! Planning validates all target descriptors before any work starts. Each
//! target then runs as its own task; the only state the tasks share is the
//! router, the diagnostic stream and the asset registry.

use std::sync::Arc;

use indexmap::IndexMap;
use manifold_graph::ModuleGraph;
use rustc_hash::FxHashMap;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::artifact::ArtifactKind;
use crate::assets::{AssetRegistry, AssetSource, EmissionPlan};
use crate::chain::ChainRun;
use crate::mode::BuildFlags;
use crate::report::{BuildReport, TargetOutcome};
use crate::router::DiagnosticRouter;
use crate::stream::DiagnosticStream;
use crate::substitution::validate_token;
use crate::target::Target;
use crate::{ConfigurationError, TargetFailure};

/// Result of planning: everything decided before targets run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    /// Asset emission owners per source directory
    pub emission: EmissionPlan,
}

/// Owns the diagnostic router for one or more invocations.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    router: Arc<DiagnosticRouter>,
}

impl Orchestrator {
    pub fn new(router: DiagnosticRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &DiagnosticRouter {
        &self.router
    }

    /// Union of every target's entries, in declaration order, for loading
    /// the shared graph.
    pub fn entry_points(targets: &[Target]) -> Vec<String> {
        let mut entries: Vec<String> = Vec::new();
        for entry in targets.iter().flat_map(|target| &target.entries) {
            let entry = entry.trim_start_matches("./");
            if !entries.iter().any(|e| e == entry) {
                entries.push(entry.to_string());
            }
        }
        entries
    }

    /// Every main field any target honours, in first-seen order. The graph
    /// loader records replacements for these.
    pub fn resolution_fields(targets: &[Target]) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for field in targets.iter().flat_map(|target| &target.resolution.main_fields) {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Validate `targets` for `flags` and decide asset ownership.
    pub fn plan(&self, targets: &[Target], flags: &BuildFlags) -> Result<BuildPlan, ConfigurationError> {
        let mut names: Vec<&str> = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            if target.name.trim().is_empty() {
                return Err(ConfigurationError::EmptyTargetName { index });
            }
            if names.contains(&target.name.as_str()) {
                return Err(ConfigurationError::DuplicateTarget {
                    name: target.name.clone(),
                });
            }
            names.push(&target.name);

            if target.entries.is_empty() {
                return Err(ConfigurationError::NoEntries {
                    target: target.name.clone(),
                });
            }

            for token in target.defines.keys() {
                validate_token(token).map_err(|source| ConfigurationError::InvalidToken {
                    target: target.name.clone(),
                    source,
                })?;
            }

            for transform in &target.transforms {
                transform
                    .transform
                    .validate_config(&transform.config)
                    .map_err(|source| ConfigurationError::InvalidTransformConfig {
                        target: target.name.clone(),
                        source,
                    })?;
            }

            check_chain(target, flags)?;
        }

        let declarations: Vec<(&str, AssetSource)> = targets
            .iter()
            .flat_map(|target| {
                target
                    .transforms
                    .iter()
                    .flat_map(|transform| transform.asset_sources(flags))
                    .map(move |source| (target.name.as_str(), source))
            })
            .collect();
        let emission = EmissionPlan::from_declarations(declarations.iter().map(|(target, source)| (*target, source)));
        for (dir, owner) in emission.owners() {
            debug!(source_dir = dir, owner, "asset emission owner");
        }

        Ok(BuildPlan { emission })
    }

    /// Build every target from `graph`.
    ///
    /// Returns a `ConfigurationError` before any work starts when a target is
    /// inconsistent. Otherwise the report holds exactly one outcome per
    /// target, in declaration order.
    pub async fn build(
        &self,
        targets: Vec<Target>,
        flags: BuildFlags,
        graph: ModuleGraph,
    ) -> Result<BuildReport, ConfigurationError> {
        let plan = self.plan(&targets, &flags)?;
        info!(targets = targets.len(), mode = %flags.mode, legacy = flags.legacy, "starting build");

        let stream = Arc::new(DiagnosticStream::new(targets.len()));
        let assets = Arc::new(AssetRegistry::new(plan.emission));
        register_owned_assets(&assets, &targets, &flags, &graph);
        let targets: Vec<Arc<Target>> = targets.into_iter().map(Arc::new).collect();

        let mut join_set = JoinSet::new();
        let mut task_index = FxHashMap::default();
        for (index, target) in targets.iter().enumerate() {
            let run = ChainRun {
                target: Arc::clone(target),
                index,
                flags,
                router: Arc::clone(&self.router),
                stream: Arc::clone(&stream),
                assets: Arc::clone(&assets),
            };
            let graph = graph.clone();
            let handle = join_set.spawn(async move { (index, run.run(graph).await) });
            task_index.insert(handle.id(), index);
        }

        let mut outcomes: Vec<Option<TargetOutcome>> = vec![None; targets.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(bundle))) => outcomes[index] = Some(TargetOutcome::Built(bundle)),
                Ok((index, Err(failure))) => {
                    error!(target_name = %targets[index].name, "{failure}");
                    outcomes[index] = Some(TargetOutcome::Failed(failure));
                }
                Err(join_err) => {
                    let index = task_index.get(&join_err.id()).copied();
                    let message = panic_message(join_err);
                    if let Some(index) = index {
                        error!(target_name = %targets[index].name, "target task panicked: {message}");
                        outcomes[index] = Some(TargetOutcome::Failed(TargetFailure::Panicked(message)));
                    }
                }
            }
        }

        let (diagnostics, suppressed) = stream.finish();
        let mut report = BuildReport {
            targets: IndexMap::with_capacity(targets.len()),
            diagnostics,
            suppressed,
            assets: assets.snapshot(),
            asset_writes: assets.write_count(),
        };
        for (target, outcome) in targets.iter().zip(outcomes) {
            let outcome = outcome
                .unwrap_or_else(|| TargetOutcome::Failed(TargetFailure::Panicked("task produced no result".into())));
            report.targets.insert(target.name.clone(), outcome);
        }

        info!(
            built = report.bundles().count(),
            failed = report.failures().count(),
            diagnostics = report.diagnostics.len(),
            suppressed = report.suppressed_total(),
            "build finished"
        );
        Ok(report)
    }
}

/// Emit every asset an owner is designated for before the targets start.
fn register_owned_assets(assets: &AssetRegistry, targets: &[Target], flags: &BuildFlags, graph: &ModuleGraph) {
    for target in targets {
        for transform in target.transforms.iter().filter(|t| t.is_enabled(flags)) {
            for asset in transform
                .transform
                .owned_assets(graph, &target.name, &transform.config, assets.plan())
            {
                assets.emit(asset);
            }
        }
    }
    debug!(assets = assets.write_count(), "owned assets registered");
}

/// The enabled chain starts on a graph, lines up kind by kind and ends in a bundle.
fn check_chain(target: &Target, flags: &BuildFlags) -> Result<(), ConfigurationError> {
    let mut current = ArtifactKind::Graph;
    for transform in target.transforms.iter().filter(|t| t.is_enabled(flags)) {
        let expected = transform.transform.input_kind();
        if expected != current {
            return Err(ConfigurationError::KindMismatch {
                target: target.name.clone(),
                transform: transform.name().to_string(),
                expected,
                found: current,
            });
        }
        current = transform.transform.output_kind();
    }

    if current == ArtifactKind::Bundle {
        Ok(())
    } else {
        Err(ConfigurationError::ChainDoesNotEndInBundle {
            target: target.name.clone(),
        })
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Gate;
    use crate::target::RuntimeEnvironment;
    use crate::transform::{BundleTransform, JsonTransform, MinifyTransform, TransformRef};

    fn bundled(name: &str) -> Target {
        Target::new(name).entry("src/app.js").transform(TransformRef::new(BundleTransform))
    }

    #[test]
    fn entry_points_are_unioned_in_order() {
        let targets = [
            Target::new("client").entry("./src/client.js"),
            Target::new("server").entries(["src/server.js", "src/client.js"]),
        ];
        assert_eq!(Orchestrator::entry_points(&targets), ["src/client.js", "src/server.js"]);
    }

    #[test]
    fn resolution_fields_are_unioned_in_order() {
        let targets = [
            Target::new("server").environment(RuntimeEnvironment::Node),
            Target::new("client"),
            Target::new("legacy").main_fields(["main"]),
        ];
        assert_eq!(Orchestrator::resolution_fields(&targets), ["module", "main", "browser"]);
    }

    #[test]
    fn plan_rejects_inconsistent_targets() {
        let orchestrator = Orchestrator::default();
        let flags = BuildFlags::production();

        let err = orchestrator.plan(&[bundled("client"), bundled("client")], &flags).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateTarget { name: "client".into() });

        let err = orchestrator.plan(&[bundled(" ")], &flags).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyTargetName { index: 0 });

        let no_entries = Target::new("client").transform(TransformRef::new(BundleTransform));
        assert!(matches!(
            orchestrator.plan(&[no_entries], &flags),
            Err(ConfigurationError::NoEntries { .. })
        ));

        let bad_token = bundled("client").define("process.env[0]", crate::SubstitutionValue::Bool(true));
        assert!(matches!(
            orchestrator.plan(&[bad_token], &flags),
            Err(ConfigurationError::InvalidToken { .. })
        ));
    }

    #[test]
    fn plan_checks_enabled_chain_kinds() {
        let orchestrator = Orchestrator::default();
        let flags = BuildFlags::production();

        let minify_first = Target::new("client")
            .entry("src/app.js")
            .transform(TransformRef::new(MinifyTransform))
            .transform(TransformRef::new(BundleTransform));
        assert!(matches!(
            orchestrator.plan(&[minify_first], &flags),
            Err(ConfigurationError::KindMismatch { ref transform, .. }) if transform == "minify"
        ));

        let no_bundle = Target::new("client")
            .entry("src/app.js")
            .transform(TransformRef::new(JsonTransform));
        assert!(matches!(
            orchestrator.plan(&[no_bundle], &flags),
            Err(ConfigurationError::ChainDoesNotEndInBundle { .. })
        ));

        // A bundle step that is disabled in this mode leaves the chain without a bundle.
        let gated = Target::new("client")
            .entry("src/app.js")
            .transform(TransformRef::new(BundleTransform).enabled_when(Gate::parse("dev").unwrap()));
        assert!(orchestrator.plan(&[gated.clone()], &BuildFlags::development()).is_ok());
        assert!(orchestrator.plan(&[gated], &flags).is_err());
    }
}
