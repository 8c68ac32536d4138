//! Build mode, invocation flags and transform gates.
//!
//! `BuildFlags` is read once per invocation and handed to every target by
//! value. Transforms never look at the process environment themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable selecting the build mode.
pub const MODE_VAR: &str = "NODE_ENV";
/// Environment variable enabling legacy output.
pub const LEGACY_VAR: &str = "MANIFOLD_LEGACY_BUILD";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    #[default]
    Production,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, BuildMode::Development)
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            other => Err(format!("Invalid build mode: {other}")),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-invocation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFlags {
    pub mode: BuildMode,
    pub legacy: bool,
}

impl BuildFlags {
    pub fn new(mode: BuildMode, legacy: bool) -> Self {
        Self { mode, legacy }
    }

    pub fn development() -> Self {
        Self::new(BuildMode::Development, false)
    }

    pub fn production() -> Self {
        Self::new(BuildMode::Production, false)
    }

    /// Read `NODE_ENV` and `MANIFOLD_LEGACY_BUILD` from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(MODE_VAR).ok().as_deref(),
            std::env::var(LEGACY_VAR).ok().as_deref(),
        )
    }

    /// Only `development` (or `dev`) selects development mode; any other
    /// value, or none, builds for production. Legacy output is on when the
    /// variable is set to anything but an empty string, `0` or `false`.
    pub fn from_vars(mode: Option<&str>, legacy: Option<&str>) -> Self {
        let mode = match mode.map(str::parse::<BuildMode>) {
            Some(Ok(BuildMode::Development)) => BuildMode::Development,
            _ => BuildMode::Production,
        };
        let legacy = legacy
            .map(|value| !matches!(value.trim(), "" | "0" | "false"))
            .unwrap_or(false);
        Self { mode, legacy }
    }
}

/// Condition deciding whether a transform takes part in a build.
///
/// Grammar: `expr := term ('||' term)*`, `term := factor ('&&' factor)*`,
/// `factor := '!'* atom`, with atoms `production`/`prod`,
/// `development`/`dev`, `legacy`, `true`/`always` and `false`/`never`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    source: String,
    any_of: Vec<Vec<Literal>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Literal {
    negated: bool,
    atom: Atom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Atom {
    Production,
    Development,
    Legacy,
    True,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid condition '{expression}': unknown term '{term}'")]
pub struct GateError {
    pub expression: String,
    pub term: String,
}

impl Gate {
    pub fn always() -> Self {
        Self::constant(true)
    }

    pub fn never() -> Self {
        Self::constant(false)
    }

    pub fn constant(enabled: bool) -> Self {
        Self {
            source: enabled.to_string(),
            any_of: vec![vec![Literal {
                negated: !enabled,
                atom: Atom::True,
            }]],
        }
    }

    pub fn parse(expression: &str) -> Result<Self, GateError> {
        let error = |term: &str| GateError {
            expression: expression.to_string(),
            term: term.to_string(),
        };

        let mut any_of = Vec::new();
        for clause in expression.split("||") {
            let mut all_of = Vec::new();
            for factor in clause.split("&&") {
                let mut text = factor.trim();
                let mut negated = false;
                while let Some(rest) = text.strip_prefix('!') {
                    negated = !negated;
                    text = rest.trim_start();
                }
                let atom = match text {
                    "production" | "prod" => Atom::Production,
                    "development" | "dev" => Atom::Development,
                    "legacy" => Atom::Legacy,
                    "true" | "always" => Atom::True,
                    "false" | "never" => {
                        negated = !negated;
                        Atom::True
                    }
                    other => return Err(error(other)),
                };
                all_of.push(Literal { negated, atom });
            }
            any_of.push(all_of);
        }

        Ok(Self {
            source: expression.trim().to_string(),
            any_of,
        })
    }

    pub fn evaluate(&self, flags: &BuildFlags) -> bool {
        self.any_of.iter().any(|all_of| {
            all_of.iter().all(|literal| {
                let value = match literal.atom {
                    Atom::Production => !flags.mode.is_dev(),
                    Atom::Development => flags.mode.is_dev(),
                    Atom::Legacy => flags.legacy,
                    Atom::True => true,
                };
                value != literal.negated
            })
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::always()
    }
}

impl FromStr for Gate {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gate::parse(s)
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: BuildFlags = BuildFlags {
        mode: BuildMode::Development,
        legacy: false,
    };
    const PROD: BuildFlags = BuildFlags {
        mode: BuildMode::Production,
        legacy: false,
    };
    const PROD_LEGACY: BuildFlags = BuildFlags {
        mode: BuildMode::Production,
        legacy: true,
    };

    #[test]
    fn flags_from_vars() {
        assert_eq!(BuildFlags::from_vars(None, None), PROD);
        assert_eq!(BuildFlags::from_vars(Some("development"), None), DEV);
        assert_eq!(BuildFlags::from_vars(Some("test"), None), PROD);
        assert_eq!(BuildFlags::from_vars(Some("production"), Some("1")), PROD_LEGACY);
        assert!(!BuildFlags::from_vars(None, Some("0")).legacy);
        assert!(!BuildFlags::from_vars(None, Some("")).legacy);
    }

    #[test]
    fn simple_gates() {
        let gate = Gate::parse("!dev").unwrap();
        assert!(gate.evaluate(&PROD));
        assert!(!gate.evaluate(&DEV));

        let legacy = Gate::parse("legacy").unwrap();
        assert!(legacy.evaluate(&PROD_LEGACY));
        assert!(!legacy.evaluate(&PROD));

        assert!(Gate::always().evaluate(&DEV));
        assert!(!Gate::never().evaluate(&PROD));
        assert!(!Gate::parse("never").unwrap().evaluate(&PROD));
    }

    #[test]
    fn compound_gates() {
        let gate = Gate::parse("production && legacy").unwrap();
        assert!(gate.evaluate(&PROD_LEGACY));
        assert!(!gate.evaluate(&PROD));

        let either = Gate::parse("dev || legacy").unwrap();
        assert!(either.evaluate(&DEV));
        assert!(either.evaluate(&PROD_LEGACY));
        assert!(!either.evaluate(&PROD));

        let double = Gate::parse("!!prod").unwrap();
        assert!(double.evaluate(&PROD));
    }

    #[test]
    fn unknown_terms_are_rejected() {
        let err = Gate::parse("production && staging").unwrap_err();
        assert_eq!(err.term, "staging");
        assert!(Gate::parse("").is_err());
    }
}
