//! One target's run: substitution, transforms, policy and asset hand-off.

use std::sync::Arc;

use manifold_graph::ModuleGraph;
use tracing::{debug, error, info, warn};

use crate::TargetFailure;
use crate::artifact::{Artifact, ArtifactKind, Bundle};
use crate::assets::AssetRegistry;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticContext, DiagnosticSeverity};
use crate::mode::BuildFlags;
use crate::policy;
use crate::router::{DiagnosticRouter, RouteDecision};
use crate::stream::DiagnosticStream;
use crate::substitution::SubstitutionTable;
use crate::target::Target;
use crate::transform::{TransformContext, TransformError};

/// Shared state one target task reads.
pub(crate) struct ChainRun {
    pub target: Arc<Target>,
    pub index: usize,
    pub flags: BuildFlags,
    pub router: Arc<DiagnosticRouter>,
    pub stream: Arc<DiagnosticStream>,
    pub assets: Arc<AssetRegistry>,
}

/// Error diagnostics reported so far by one routing call.
#[derive(Default)]
struct Fatal {
    errors: usize,
    first: Option<String>,
}

impl Fatal {
    fn check(self) -> Result<(), TargetFailure> {
        match self.first {
            Some(first) => Err(TargetFailure::Diagnostics {
                errors: self.errors,
                first,
            }),
            None => Ok(()),
        }
    }
}

impl ChainRun {
    /// Run the target's enabled chain over `graph`.
    pub(crate) async fn run(self, graph: ModuleGraph) -> Result<Bundle, TargetFailure> {
        let target = Arc::clone(&self.target);
        let guard = self.assets.guard(&target.name);
        let access = self.assets.access(&target.name);
        info!(target_name = %target.name, mode = %self.flags.mode, legacy = self.flags.legacy, "building target");

        let substitutions = SubstitutionTable::resolve(&target, &self.flags)?;

        let (graph, diagnostics) = policy::scope_to_target(graph, &target);
        self.route_all(diagnostics, None).check()?;
        let mut artifact = Artifact::Graph(substitutions.apply_graph(&graph));

        let mut enforced = false;
        for transform in target.transforms.iter().filter(|t| t.is_enabled(&self.flags)) {
            if !enforced && transform.transform.output_kind() == ArtifactKind::Bundle {
                artifact = match artifact {
                    Artifact::Graph(graph) => {
                        let (graph, diagnostics) = policy::enforce(graph, &target)?;
                        self.route_all(diagnostics, None).check()?;
                        Artifact::Graph(graph)
                    }
                    bundle => bundle,
                };
                enforced = true;
            }

            let ctx = TransformContext {
                target: &target,
                flags: &self.flags,
                config: &transform.config,
                substitutions: &substitutions,
                assets: &access,
            };
            let output = transform.transform.apply(artifact, &ctx).await?;
            debug!(
                target_name = %target.name,
                transform = transform.name(),
                produced = %output.artifact.kind(),
                diagnostics = output.diagnostics.len(),
                "transform applied"
            );
            artifact = output.artifact;
            self.route_all(output.diagnostics, Some(transform.name())).check()?;
        }

        // Everything this target owns is emitted by now.
        guard.settle();

        let mut bundle = artifact
            .into_bundle()
            .ok_or_else(|| TransformError::failed("chain", "the enabled transforms did not produce a bundle"))?;

        let mut fatal = Fatal::default();
        for pending in access.take_pending() {
            if !bundle.code.contains(&pending.placeholder) {
                continue;
            }
            match self.assets.wait_for(&pending.asset_id, &pending.owner).await {
                Ok(asset) => {
                    let quoted = serde_json::Value::String(asset.public_url).to_string();
                    let url = &quoted[1..quoted.len() - 1];
                    bundle.code = bundle.code.replace(&pending.placeholder, url);
                    debug!(target_name = %target.name, asset = %pending.asset_id, owner = %pending.owner, "asset reference resolved");
                }
                Err(err) => {
                    let diagnostic = Diagnostic::error(DiagnosticCode::AssetMissing, err.to_string()).with_context(
                        DiagnosticContext::Asset {
                            asset_id: pending.asset_id.clone(),
                        },
                    );
                    self.route(diagnostic, None, &mut fatal);
                }
            }
        }
        fatal.check()?;

        info!(target_name = %target.name, bytes = bundle.size(), modules = bundle.modules.len(), "target built");
        Ok(bundle)
    }

    fn route_all(&self, diagnostics: Vec<Diagnostic>, origin: Option<&str>) -> Fatal {
        let mut fatal = Fatal::default();
        for diagnostic in diagnostics {
            self.route(diagnostic, origin, &mut fatal);
        }
        fatal
    }

    /// Stamp, route and record one diagnostic.
    fn route(&self, diagnostic: Diagnostic, origin: Option<&str>, fatal: &mut Fatal) {
        let mut diagnostic = diagnostic.with_target(self.target.name.as_str());
        if diagnostic.origin.is_none() {
            diagnostic.origin = origin.map(str::to_string);
        }

        match self.router.route(&diagnostic) {
            RouteDecision::Suppressed { rule } => {
                debug!(target_name = %diagnostic.target, code = %diagnostic.code, rule = %rule, "diagnostic suppressed");
                self.stream.suppress(&rule);
            }
            RouteDecision::Reported(severity) => {
                diagnostic.severity = severity;
                match severity {
                    DiagnosticSeverity::Error => {
                        error!(target_name = %diagnostic.target, code = %diagnostic.code, "{}", diagnostic.message);
                        fatal.errors += 1;
                        if fatal.first.is_none() {
                            fatal.first = Some(diagnostic.message.clone());
                        }
                    }
                    DiagnosticSeverity::Warning => {
                        warn!(target_name = %diagnostic.target, code = %diagnostic.code, "{}", diagnostic.message);
                    }
                    DiagnosticSeverity::Info => {
                        info!(target_name = %diagnostic.target, code = %diagnostic.code, "{}", diagnostic.message);
                    }
                }
                self.stream.report(self.index, diagnostic);
            }
        }
    }
}
