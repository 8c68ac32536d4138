//! Terminal output: status messages and the rendered build report.
//!
//! Everything goes to stderr so stdout stays free for piping.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use manifold_bundler::{BuildPlan, BuildReport, DiagnosticSeverity, Target, TargetOutcome};
use owo_colors::{OwoColorize, Style};

use crate::writer::WriteSummary;

static COLORS: AtomicBool = AtomicBool::new(true);

/// Whether the environment wants colors: `NO_COLOR` beats `FORCE_COLOR`,
/// otherwise stderr must be a terminal.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::user_attended_stderr()
}

/// Decide once, early in `main`, whether output is colored.
pub fn init_colors(no_color: bool) {
    COLORS.store(!no_color && should_use_color(), Ordering::Relaxed);
}

fn paint(style: Style) -> Style {
    if COLORS.load(Ordering::Relaxed) {
        style
    } else {
        Style::new()
    }
}

pub fn success(message: &str) {
    eprintln!("{} {}", "✓".style(paint(Style::new().green().bold())), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", "ℹ".style(paint(Style::new().blue().bold())), message);
}

pub fn warning(message: &str) {
    eprintln!(
        "{} {}",
        "⚠".style(paint(Style::new().yellow().bold())),
        message.style(paint(Style::new().yellow()))
    );
}

pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        "✗".style(paint(Style::new().red().bold())),
        message.style(paint(Style::new().red()))
    );
}

/// Human-readable size (`512 B`, `1.50 KB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Render one line per target, then diagnostics, suppressions and assets.
pub fn print_report(report: &BuildReport, written: &WriteSummary, elapsed: Duration) {
    eprintln!();
    for (name, outcome) in &report.targets {
        match outcome {
            TargetOutcome::Built(bundle) => {
                let path = written
                    .bundle_path(name)
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| bundle.file_name.clone());
                eprintln!(
                    "  {} {:<16} {}  {}  {}",
                    "✓".style(paint(Style::new().green().bold())),
                    name.style(paint(Style::new().bold())),
                    path,
                    format_size(bundle.size() as u64).style(paint(Style::new().dimmed())),
                    format!("{} modules", bundle.modules.len()).style(paint(Style::new().dimmed())),
                );
            }
            TargetOutcome::Failed(failure) => {
                eprintln!(
                    "  {} {:<16} {} {}",
                    "✗".style(paint(Style::new().red().bold())),
                    name.style(paint(Style::new().bold())),
                    format!("[{}]", failure.code()).style(paint(Style::new().red())),
                    failure,
                );
            }
        }
    }

    if !report.diagnostics.is_empty() {
        eprintln!();
        for diagnostic in &report.diagnostics {
            let severity = match diagnostic.severity {
                DiagnosticSeverity::Error => diagnostic.severity.style(paint(Style::new().red().bold())).to_string(),
                DiagnosticSeverity::Warning => {
                    diagnostic.severity.style(paint(Style::new().yellow().bold())).to_string()
                }
                DiagnosticSeverity::Info => diagnostic.severity.style(paint(Style::new().blue())).to_string(),
            };
            eprintln!(
                "  {severity} {} {} {}",
                format!("[{}]", diagnostic.target).style(paint(Style::new().dimmed())),
                diagnostic.code,
                diagnostic.message,
            );
        }
    }

    if report.suppressed_total() > 0 {
        let rules: Vec<String> = report
            .suppressed
            .iter()
            .map(|(rule, count)| format!("{rule} x{count}"))
            .collect();
        eprintln!(
            "  {}",
            format!("{} suppressed ({})", report.suppressed_total(), rules.join(", ")).style(paint(Style::new().dimmed()))
        );
    }

    if !report.assets.is_empty() {
        eprintln!(
            "  {}",
            format!(
                "{} assets emitted in {} writes",
                report.assets.len(),
                report.asset_writes
            )
            .style(paint(Style::new().dimmed()))
        );
    }
    if let Some(manifest) = &written.manifest {
        eprintln!("  {}", format!("manifest {}", manifest.display()).style(paint(Style::new().dimmed())));
    }

    eprintln!();
    let built = report.bundles().count();
    let summary = format!(
        "{built}/{} targets built in {} ({} errors, {} warnings)",
        report.targets.len(),
        format_duration(elapsed),
        report.count(DiagnosticSeverity::Error),
        report.count(DiagnosticSeverity::Warning),
    );
    if report.is_success() {
        success(&summary);
    } else {
        error(&summary);
    }
}

/// Render what `check` found: each target's enabled chain and the asset owners.
pub fn print_plan(targets: &[Target], plan: &BuildPlan, root: &Path, flags: &manifold_bundler::BuildFlags) {
    eprintln!();
    for target in targets {
        let chain: Vec<&str> = target
            .transforms
            .iter()
            .filter(|transform| transform.is_enabled(flags))
            .map(|transform| transform.name())
            .collect();
        eprintln!(
            "  {:<16} {:<8} {}  {}",
            target.name.style(paint(Style::new().bold())),
            target.environment.as_str(),
            target.output.relative_path().display(),
            chain.join(" → ").style(paint(Style::new().dimmed())),
        );
    }
    for (dir, owner) in plan.emission.owners() {
        eprintln!(
            "  {}",
            format!("assets in {} are emitted by '{owner}'", root.join(dir).display()).style(paint(Style::new().dimmed()))
        );
    }
    eprintln!();
}
