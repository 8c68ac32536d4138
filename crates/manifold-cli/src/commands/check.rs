//! `manifold check`: validate configuration, files and the build plan.

use manifold_bundler::{Orchestrator, TransformRegistry};
use manifold_config::validate_fs;

use crate::cli::CheckArgs;
use crate::config::Project;
use crate::error::Result;
use crate::ui;

/// Everything `build` would reject before starting work is reported here,
/// plus entries and asset directories missing on disk.
pub async fn execute(args: CheckArgs) -> Result<()> {
    let project = Project::load(&args.project, None)?;
    ui::info(&format!("Checking {}", project.config_path.display()));

    validate_fs(&project.config, &project.root)?;
    ui::success("Entries and asset directories exist");

    let flags = project.options.flags();
    let targets = project.targets(&TransformRegistry::with_builtins(), &args.project.targets)?;
    let plan = Orchestrator::new(project.router()).plan(&targets, &flags)?;

    ui::print_plan(&targets, &plan, &project.root, &flags);
    ui::success(&format!(
        "{} targets are consistent for {}{}",
        targets.len(),
        flags.mode,
        if flags.legacy { " (legacy)" } else { "" }
    ));
    Ok(())
}
