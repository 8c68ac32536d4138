//! Declarative configuration to bundler types.

use manifold_bundler::{
    DiagnosticCode, DiagnosticRouter, EntrySignatures, ExternalSpec, FieldMatcher, Gate, OutputFormat, OutputSpec,
    RuntimeEnvironment, SubstitutionValue, SuppressionRule, Target, TransformRegistry,
};
use manifold_config::{
    DefineValue, DiagnosticsConfig, EnvironmentKind, FormatKind, GateConfig, SuppressionConfig, TargetConfig,
};

use crate::error::{CliError, Result};

/// Build the bundler target for one `[[targets]]` table.
pub fn target_from_config(config: &TargetConfig, registry: &TransformRegistry) -> Result<Target> {
    let mut target = Target::new(config.name.as_str())
        .environment(environment(config.environment))
        .entries(config.entries.iter().cloned());

    if !config.runtime.is_empty() {
        target = target.runtime_assumed(config.runtime.iter().cloned());
    }
    if !config.main_fields.is_empty() {
        target = target.main_fields(config.main_fields.iter().cloned());
    }
    for package in &config.dedupe {
        target = target.dedupe(package.as_str());
    }
    for external in &config.externals {
        target = target.external(ExternalSpec::new(external.id()).requiring(external.requires().iter().cloned()));
    }
    if config.node_builtins {
        target = target.node_builtins();
    }

    let mut output = OutputSpec::new(config.output_file());
    output.format = match config.output.format {
        FormatKind::Esm => OutputFormat::Esm,
        FormatKind::Cjs => OutputFormat::Cjs,
    };
    output.preserve_entry_signatures = match config.output.preserve_entry_signatures {
        manifold_config::EntrySignatures::Strict => EntrySignatures::Strict,
        manifold_config::EntrySignatures::False => EntrySignatures::False,
    };
    output.dir = config.output.dir.clone();
    target = target.output(output);

    for (token, value) in &config.define {
        target = target.define(token.as_str(), substitution_value(value));
    }

    for transform in &config.transforms {
        let gate = match &transform.enabled {
            GateConfig::Flag(enabled) => Gate::constant(*enabled),
            GateConfig::Condition(expression) => {
                Gate::parse(expression).map_err(|source| CliError::InvalidGate {
                    target: config.name.clone(),
                    transform: transform.name.clone(),
                    source,
                })?
            }
        };
        let transform = registry
            .instantiate(&transform.name, transform.options.clone(), gate)
            .map_err(|source| CliError::Transform {
                target: config.name.clone(),
                source,
            })?;
        target = target.transform(transform);
    }

    Ok(target)
}

fn environment(kind: EnvironmentKind) -> RuntimeEnvironment {
    match kind {
        EnvironmentKind::Browser => RuntimeEnvironment::Browser,
        EnvironmentKind::Node => RuntimeEnvironment::Node,
        EnvironmentKind::Worker => RuntimeEnvironment::Worker,
    }
}

fn substitution_value(value: &DefineValue) -> SubstitutionValue {
    match value {
        DefineValue::Bool(value) => SubstitutionValue::Bool(*value),
        DefineValue::Number(number) => SubstitutionValue::Number(number.to_string()),
        DefineValue::String(value) => SubstitutionValue::string(value.as_str()),
        DefineValue::Raw { raw } => SubstitutionValue::raw(raw.as_str()),
    }
}

/// Build the run's single router from `[diagnostics]`.
///
/// `{ code = "MISSING_EXPORT", export = "x" }` and
/// `{ code = "CIRCULAR_DEPENDENCY", within = "pkg" }` become the dedicated
/// rules; anything else matches field by field.
pub fn router_from_config(config: &DiagnosticsConfig) -> DiagnosticRouter {
    let mut router = DiagnosticRouter::new().warnings_as_errors(config.warnings_as_errors);

    for rule in &config.suppress {
        let mut suppression = suppression_rule(rule);
        if let Some(name) = &rule.name {
            suppression = suppression.named(name.as_str());
        }
        router = router.with_rule(suppression);
    }
    for code in &config.escalate {
        router = router.escalate(DiagnosticCode::from(code.clone()));
    }
    router
}

fn suppression_rule(rule: &SuppressionConfig) -> SuppressionRule {
    let code = rule.code.as_deref().map(|code| DiagnosticCode::from(code.to_string()));
    let untargeted = rule.target.is_none() && rule.origin.is_none();

    match (&code, &rule.export, &rule.within) {
        (Some(DiagnosticCode::MissingExport), Some(export), None) if untargeted => {
            SuppressionRule::missing_export(export.as_str())
        }
        (Some(DiagnosticCode::CircularDependency), None, Some(package)) if untargeted => {
            SuppressionRule::circular_within(package.as_str())
        }
        _ => {
            let matcher = FieldMatcher {
                code: code.clone(),
                export: rule.export.clone(),
                within: rule.within.clone(),
                target: rule.target.clone(),
                origin: rule.origin.clone(),
            };
            SuppressionRule::fields(field_rule_name(rule), matcher)
        }
    }
}

/// `code(export=x, within=y)` style name from the set matchers.
fn field_rule_name(rule: &SuppressionConfig) -> String {
    let fields: Vec<String> = [
        ("export", &rule.export),
        ("within", &rule.within),
        ("target", &rule.target),
        ("origin", &rule.origin),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.as_ref().map(|value| format!("{key}={value}")))
    .collect();

    let head = rule.code.as_deref().unwrap_or("any").to_lowercase();
    format!("{head}({})", fields.join(", "))
}
