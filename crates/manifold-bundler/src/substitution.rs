//! Environment substitution table.
//!
//! Static tokens such as `process.env.NODE_ENV` are replaced by literals in
//! every text module before the first transform runs, which lets later
//! transforms drop dead branches for the current mode.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use manifold_graph::{Module, ModuleGraph};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::BuildFlags;
use crate::target::Target;

/// Token replaced with the build mode.
pub const NODE_ENV_TOKEN: &str = "process.env.NODE_ENV";
/// Token replaced with whether the target runs in a browser-like environment.
pub const BROWSER_TOKEN: &str = "process.browser";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*)*$").expect("token regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstitutionError {
    #[error("'{token}' is not a static dotted identifier")]
    InvalidToken { token: String },
}

/// Value a token is replaced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SubstitutionValue {
    Bool(bool),
    /// Number in its source spelling
    Number(String),
    /// Text, emitted as a JSON string literal
    String(String),
    /// Inserted verbatim
    Raw(String),
}

impl SubstitutionValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn raw(value: impl Into<String>) -> Self {
        Self::Raw(value.into())
    }

    /// Source text inserted in place of the token.
    pub fn literal(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Number(value) | Self::Raw(value) => value.clone(),
            Self::String(value) => serde_json::Value::String(value.clone()).to_string(),
        }
    }
}

impl fmt::Display for SubstitutionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal())
    }
}

pub fn validate_token(token: &str) -> Result<(), SubstitutionError> {
    if TOKEN_RE.is_match(token) {
        Ok(())
    } else {
        Err(SubstitutionError::InvalidToken {
            token: token.to_string(),
        })
    }
}

/// Token to literal mapping for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    literals: IndexMap<String, String>,
    /// Tokens, longest first
    order: Vec<String>,
}

impl SubstitutionTable {
    /// Base table for the build flags, environment defaults for the target,
    /// then the target's own defines.
    pub fn resolve(target: &Target, flags: &BuildFlags) -> Result<Self, SubstitutionError> {
        let mut values: IndexMap<String, SubstitutionValue> = IndexMap::new();
        values.insert(
            NODE_ENV_TOKEN.to_string(),
            SubstitutionValue::string(flags.mode.as_str()),
        );
        values.insert(
            BROWSER_TOKEN.to_string(),
            SubstitutionValue::Bool(target.environment.is_browser_like()),
        );
        for (token, value) in &target.defines {
            values.insert(token.clone(), value.clone());
        }
        Self::from_values(values)
    }

    pub fn from_values<I, S>(values: I) -> Result<Self, SubstitutionError>
    where
        I: IntoIterator<Item = (S, SubstitutionValue)>,
        S: Into<String>,
    {
        let mut literals = IndexMap::new();
        for (token, value) in values {
            let token = token.into();
            validate_token(&token)?;
            literals.insert(token, value.literal());
        }

        let mut order: Vec<String> = literals.keys().cloned().collect();
        order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Ok(Self { literals, order })
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.literals.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.literals.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace whole-token occurrences in `code`.
    ///
    /// A match counts only when it is neither preceded nor followed by an
    /// identifier character or `.`, so `process.env.NODE_ENV_X` and
    /// `foo.process.browser` are left alone.
    pub fn apply(&self, code: &str) -> String {
        if self.order.is_empty() {
            return code.to_string();
        }

        let bytes = code.as_bytes();
        let mut out = String::with_capacity(code.len());
        let mut copied = 0;
        let mut pos = 0;

        while pos < bytes.len() {
            if !is_token_start(bytes[pos]) || (pos > 0 && is_token_byte(bytes[pos - 1])) {
                pos += 1;
                continue;
            }

            let found = self.order.iter().find(|token| {
                code[pos..].starts_with(token.as_str())
                    && bytes
                        .get(pos + token.len())
                        .is_none_or(|next| !is_token_byte(*next))
            });

            match found {
                Some(token) => {
                    out.push_str(&code[copied..pos]);
                    out.push_str(&self.literals[token]);
                    pos += token.len();
                    copied = pos;
                }
                None => pos += 1,
            }
        }

        out.push_str(&code[copied..]);
        out
    }

    /// Apply the table to a module, returning `None` when nothing changed.
    pub fn apply_module(&self, module: &Module) -> Option<Module> {
        let code = module.code()?;
        let replaced = self.apply(code);
        (replaced != code).then(|| module.with_code(replaced))
    }

    /// Apply the table to every text module of the graph.
    pub fn apply_graph(&self, graph: &ModuleGraph) -> ModuleGraph {
        let mut out = graph.clone();
        for module in graph.modules() {
            if let Some(updated) = self.apply_module(module) {
                out.add_module(updated);
            }
        }
        out
    }
}

fn is_token_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$'
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::BuildMode;
    use crate::target::RuntimeEnvironment;
    use proptest::prelude::*;

    fn table(pairs: &[(&str, SubstitutionValue)]) -> SubstitutionTable {
        SubstitutionTable::from_values(pairs.iter().cloned()).unwrap()
    }

    #[test]
    fn base_table_follows_mode_and_environment() {
        let client = Target::new("client");
        let server = Target::new("server").environment(RuntimeEnvironment::Node);
        let flags = BuildFlags::new(BuildMode::Development, false);

        let client_table = SubstitutionTable::resolve(&client, &flags).unwrap();
        assert_eq!(client_table.get(NODE_ENV_TOKEN), Some("\"development\""));
        assert_eq!(client_table.get(BROWSER_TOKEN), Some("true"));

        let server_table = SubstitutionTable::resolve(&server, &flags).unwrap();
        assert_eq!(server_table.get(BROWSER_TOKEN), Some("false"));
    }

    #[test]
    fn target_defines_override_defaults() {
        let worker = Target::new("serviceworker")
            .environment(RuntimeEnvironment::Worker)
            .define(BROWSER_TOKEN, SubstitutionValue::Bool(false))
            .define("process.env.CACHE", SubstitutionValue::string("app-\"v1\""));
        let table = SubstitutionTable::resolve(&worker, &BuildFlags::production()).unwrap();
        assert_eq!(table.get(BROWSER_TOKEN), Some("false"));
        assert_eq!(table.get("process.env.CACHE"), Some(r#""app-\"v1\"""#));
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        let target = Target::new("client").define("process.env[KEY]", SubstitutionValue::Bool(true));
        assert!(SubstitutionTable::resolve(&target, &BuildFlags::production()).is_err());
        assert!(validate_token("a..b").is_err());
        assert!(validate_token("$app.env").is_ok());
    }

    #[test]
    fn replaces_whole_tokens_only() {
        let table = table(&[
            ("process.env.NODE_ENV", SubstitutionValue::string("production")),
            ("process.env", SubstitutionValue::raw("{}")),
        ]);

        let code = "if (process.env.NODE_ENV === 'production') x(process.env, process.env.NODE_ENV_X, my.process.env);";
        assert_eq!(
            table.apply(code),
            "if (\"production\" === 'production') x({}, process.env.NODE_ENV_X, my.process.env);"
        );
    }

    #[test]
    fn applies_to_graph_modules() {
        use manifold_graph::{ModuleId, SourceType};

        let id = ModuleId::new("src/main.js").unwrap();
        let graph = ModuleGraph::from_modules([Module::from_source(
            id.clone(),
            SourceType::JavaScript,
            "export const dev = process.env.NODE_ENV === \"development\";\n",
        )])
        .with_entries([id.clone()]);

        let table = table(&[("process.env.NODE_ENV", SubstitutionValue::string("development"))]);
        let replaced = table.apply_graph(&graph);
        assert_eq!(
            replaced.module(&id).unwrap().code(),
            Some("export const dev = \"development\" === \"development\";\n")
        );
        assert_eq!(replaced.module(&id).unwrap().exports, vec!["dev".to_string()]);
    }

    proptest! {
        #[test]
        fn text_without_tokens_is_unchanged(code in "[a-z0-9 ;(){}=]*") {
            let table = table(&[("process.browser", SubstitutionValue::Bool(true))]);
            prop_assert_eq!(table.apply(&code), code);
        }

        #[test]
        fn standalone_tokens_are_always_replaced(prefix in "[ ;(]{0,3}", suffix in "[ ;)]{0,3}") {
            let table = table(&[("process.browser", SubstitutionValue::Bool(true))]);
            let code = format!("{prefix}process.browser{suffix}");
            prop_assert_eq!(table.apply(&code), format!("{prefix}true{suffix}"));
        }
    }
}
