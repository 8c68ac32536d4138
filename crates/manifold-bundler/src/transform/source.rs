//! Lexical view of JavaScript source for the built-in text rewrites.
//!
//! Splits code into identifiers, numbers, punctuation, string and template
//! literals, comments and whitespace. Template substitutions (`${...}`) are
//! tokenized as code. Regular expression literals are not recognized.

use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Number,
    Punct,
    /// String literal or template chunk, delimiters included
    Literal,
    Comment,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, code: &'a str) -> &'a str {
        &code[self.start..self.end]
    }

    fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Space | TokenKind::Comment)
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn literal_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of a template chunk starting at `start`: after the closing backtick
/// or after the `${` opening a substitution.
fn template_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => return i + 2,
            _ => i += 1,
        }
    }
    bytes.len()
}

pub(crate) fn tokenize(code: &str) -> Vec<Token> {
    let bytes = code.as_bytes();
    let mut tokens = Vec::new();
    // One entry per open brace; `true` marks a template substitution.
    let mut braces: Vec<bool> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let (kind, end) = match b {
            b'"' | b'\'' => (TokenKind::Literal, literal_end(bytes, i)),
            b'`' | b'}' if b == b'`' || braces.last() == Some(&true) => {
                if b == b'}' {
                    braces.pop();
                }
                let end = template_end(bytes, i + 1).min(bytes.len());
                if end > i + 1 && bytes[end - 1] == b'{' {
                    braces.push(true);
                }
                (TokenKind::Literal, end)
            }
            b'{' => {
                braces.push(false);
                (TokenKind::Punct, i + 1)
            }
            b'}' => {
                braces.pop();
                (TokenKind::Punct, i + 1)
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = bytes[i..].iter().position(|&c| c == b'\n').map_or(bytes.len(), |p| i + p);
                (TokenKind::Comment, end)
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = code[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                (TokenKind::Comment, end)
            }
            _ if b.is_ascii_whitespace() => {
                let len = bytes[i..].iter().take_while(|c| c.is_ascii_whitespace()).count();
                (TokenKind::Space, i + len)
            }
            _ if b.is_ascii_digit() => {
                let len = bytes[i..]
                    .iter()
                    .take_while(|&&c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.')
                    .count();
                (TokenKind::Number, i + len)
            }
            _ if is_ident_byte(b) => {
                let len = bytes[i..].iter().take_while(|&&c| is_ident_byte(c)).count();
                (TokenKind::Ident, i + len)
            }
            _ => (TokenKind::Punct, i + 1),
        };
        tokens.push(Token { kind, start: i, end });
        i = end;
    }

    tokens
}

/// Token stream with lookups that skip whitespace and comments.
struct Tokens<'a> {
    code: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Tokens<'a> {
    fn new(code: &'a str) -> Self {
        Self {
            code,
            tokens: tokenize(code),
        }
    }

    fn text(&self, index: usize) -> &'a str {
        self.tokens[index].text(self.code)
    }

    fn prev(&self, index: usize) -> Option<usize> {
        (0..index).rev().find(|&i| !self.tokens[i].is_trivia())
    }

    fn next(&self, index: usize) -> Option<usize> {
        (index + 1..self.tokens.len()).find(|&i| !self.tokens[i].is_trivia())
    }

    fn is_punct(&self, index: Option<usize>, punct: &str) -> bool {
        index.is_some_and(|i| self.tokens[i].kind == TokenKind::Punct && self.text(i) == punct)
    }

    fn is_word(&self, index: Option<usize>, words: &[&str]) -> bool {
        index.is_some_and(|i| self.tokens[i].kind == TokenKind::Ident && words.contains(&self.text(i)))
    }

    /// A line break separates the tokens at `from` and `to`.
    fn newline_between(&self, from: usize, to: usize) -> bool {
        self.tokens[from + 1..to]
            .iter()
            .any(|t| t.is_trivia() && t.text(self.code).contains('\n'))
    }

    /// `.name` or `?.name`, but not `...name`.
    fn is_member_access(&self, index: usize) -> bool {
        let Some(dot) = self.prev(index) else { return false };
        if !self.is_punct(Some(dot), ".") {
            return false;
        }
        !(dot > 0 && self.is_punct(Some(dot - 1), "."))
    }

    /// The token at `index` can start a statement.
    fn at_statement_start(&self, index: usize) -> bool {
        match self.prev(index) {
            None => true,
            Some(prev) => {
                let token = self.tokens[prev];
                match token.kind {
                    TokenKind::Punct => matches!(self.text(prev), ";" | "}" | "{"),
                    TokenKind::Ident if self.text(prev) == "async" => true,
                    TokenKind::Ident | TokenKind::Number | TokenKind::Literal => self.newline_between(prev, index),
                    _ => false,
                }
            }
        }
    }
}

/// Rewrite every code token through `rewrite`; literals, comments and
/// whitespace are kept as written.
fn rewrite_tokens(tokens: &Tokens<'_>, mut rewrite: impl FnMut(usize) -> Option<String>) -> String {
    let mut out = String::with_capacity(tokens.code.len());
    for (index, token) in tokens.tokens.iter().enumerate() {
        match rewrite(index) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(token.text(tokens.code)),
        }
    }
    out
}

/// `const`/`let` declarations become `var`.
pub(crate) fn lower_declarations(code: &str) -> String {
    let tokens = Tokens::new(code);
    rewrite_tokens(&tokens, |index| {
        if !tokens.is_word(Some(index), &["const", "let"]) || tokens.is_member_access(index) {
            return None;
        }
        let spaced = tokens
            .tokens
            .get(index + 1)
            .is_some_and(|t| t.kind == TokenKind::Space);
        let binding = tokens.tokens.get(index + 2).is_some_and(|t| {
            t.kind == TokenKind::Ident || (t.kind == TokenKind::Punct && matches!(t.text(code), "[" | "{"))
        });
        (spaced && binding).then(|| "var".to_string())
    })
}

/// Drop comments, trim whitespace around lines and remove blank lines.
/// String and template literal contents are never touched.
pub(crate) fn strip_comments_and_blank_lines(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut pending_space = String::new();
    let mut line_start = true;

    fn newline(out: &mut String, pending_space: &mut String, line_start: &mut bool) {
        pending_space.clear();
        if !*line_start {
            out.push('\n');
            *line_start = true;
        }
    }

    for token in tokenize(code) {
        let text = token.text(code);
        match token.kind {
            TokenKind::Comment if text.contains('\n') => newline(&mut out, &mut pending_space, &mut line_start),
            TokenKind::Comment => {
                if !line_start {
                    pending_space.push(' ');
                }
            }
            TokenKind::Space => {
                for c in text.chars() {
                    if c == '\n' {
                        newline(&mut out, &mut pending_space, &mut line_start);
                    } else if !line_start {
                        pending_space.push(c);
                    }
                }
            }
            _ => {
                out.push_str(&pending_space);
                pending_space.clear();
                out.push_str(text);
                line_start = false;
            }
        }
    }
    if !line_start {
        out.push('\n');
    }
    out
}

/// Names declared at the top level of a module body: `const`, `let` and
/// `var` bindings (destructuring included), function and class declarations.
pub(crate) fn top_level_declarations(code: &str) -> Vec<String> {
    let tokens = Tokens::new(code);
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str, names: &mut Vec<String>| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };

    let mut depth = 0usize;
    let mut declaring = false;
    let mut index = 0;
    while index < tokens.tokens.len() {
        let token = tokens.tokens[index];
        if token.is_trivia() {
            if declaring && depth == 0 && token.text(code).contains('\n') {
                let continues = tokens.is_punct(tokens.prev(index), ",") || tokens.is_punct(tokens.next(index), ",");
                declaring = continues;
            }
            index += 1;
            continue;
        }

        match (token.kind, token.text(code)) {
            (TokenKind::Punct, "{" | "(" | "[") => depth += 1,
            (TokenKind::Punct, "}" | ")" | "]") => depth = depth.saturating_sub(1),
            (TokenKind::Punct, ";") if depth == 0 => declaring = false,
            (TokenKind::Punct, ",") if depth == 0 && declaring => {
                if let Some(next) = tokens.next(index) {
                    index = binding_names(&tokens, next, &mut names);
                    continue;
                }
            }
            (TokenKind::Ident, "const" | "let" | "var") if depth == 0 && !tokens.is_member_access(index) => {
                if let Some(next) = tokens.next(index) {
                    declaring = true;
                    index = binding_names(&tokens, next, &mut names);
                    continue;
                }
            }
            (TokenKind::Ident, "function" | "class") if depth == 0 && tokens.at_statement_start(index) => {
                let mut next = tokens.next(index);
                if tokens.is_punct(next, "*") {
                    next = next.and_then(|n| tokens.next(n));
                }
                if let Some(name) = next.filter(|&n| tokens.tokens[n].kind == TokenKind::Ident) {
                    push(tokens.text(name), &mut names);
                }
            }
            _ => {}
        }
        index += 1;
    }

    names
}

/// Collect the names bound by the declarator starting at `index`; returns
/// the index after the binding target.
fn binding_names(tokens: &Tokens<'_>, index: usize, names: &mut Vec<String>) -> usize {
    let mut add = |name: &str| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };

    let first = tokens.tokens[index];
    if first.kind == TokenKind::Ident {
        add(tokens.text(index));
        return index + 1;
    }
    if !tokens.is_punct(Some(index), "{") && !tokens.is_punct(Some(index), "[") {
        return index + 1;
    }

    let mut depth = 0usize;
    let mut defaults = 0usize;
    let mut in_default = false;
    let mut i = index;
    while i < tokens.tokens.len() {
        let token = tokens.tokens[i];
        if token.is_trivia() {
            i += 1;
            continue;
        }
        match (token.kind, tokens.text(i)) {
            (TokenKind::Punct, "{" | "[") if !in_default => depth += 1,
            (TokenKind::Punct, "}" | "]") if !in_default || defaults == 0 => {
                in_default = false;
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            (TokenKind::Punct, "(" | "{" | "[") => defaults += 1,
            (TokenKind::Punct, ")" | "}" | "]") => defaults = defaults.saturating_sub(1),
            (TokenKind::Punct, ",") if defaults == 0 => in_default = false,
            (TokenKind::Punct, "=") if defaults == 0 => in_default = true,
            (TokenKind::Ident, name) if !in_default => {
                let next = tokens.next(i);
                let ends = [",", "}", "]", "="].iter().any(|p| tokens.is_punct(next, p));
                if ends && !tokens.is_member_access(i) {
                    add(name);
                }
            }
            _ => {}
        }
        i += 1;
    }
    tokens.tokens.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Object,
    Class,
    Block,
    Group,
}

const OBJECT_AFTER_WORDS: &[&str] = &[
    "return", "yield", "await", "typeof", "case", "in", "of", "new", "throw", "void", "delete", "instanceof", "const",
    "let", "var", "default",
];

/// Rename identifiers per `renames`, leaving property names, object keys and
/// class members alone. Shorthand properties keep their key (`{ x: x$1 }`).
pub(crate) fn rename_identifiers(code: &str, renames: &FxHashMap<String, String>) -> String {
    if renames.is_empty() {
        return code.to_string();
    }
    let tokens = Tokens::new(code);
    let mut scopes: Vec<Scope> = Vec::new();
    let mut class_pending = false;
    let mut out = String::with_capacity(code.len());

    for (index, token) in tokens.tokens.iter().enumerate() {
        let text = token.text(code);
        match token.kind {
            TokenKind::Punct => match text {
                "{" => {
                    let scope = if class_pending {
                        Scope::Class
                    } else {
                        brace_scope(&tokens, index)
                    };
                    class_pending = false;
                    scopes.push(scope);
                }
                "(" | "[" => scopes.push(Scope::Group),
                "}" | ")" | "]" => {
                    scopes.pop();
                }
                _ => {}
            },
            TokenKind::Ident if text == "class" && !tokens.is_member_access(index) => class_pending = true,
            TokenKind::Ident => {
                if let Some(renamed) = renames.get(text) {
                    if let Some(replacement) = renamed_reference(&tokens, index, scopes.last().copied(), text, renamed) {
                        out.push_str(&replacement);
                        continue;
                    }
                }
            }
            _ => {}
        }
        out.push_str(text);
    }
    out
}

fn brace_scope(tokens: &Tokens<'_>, index: usize) -> Scope {
    let Some(prev) = tokens.prev(index) else {
        return Scope::Block;
    };
    let token = tokens.tokens[prev];
    match token.kind {
        TokenKind::Punct => match tokens.text(prev) {
            ")" | "}" | "{" | ";" | ">" => Scope::Block,
            _ => Scope::Object,
        },
        TokenKind::Ident if OBJECT_AFTER_WORDS.contains(&tokens.text(prev)) => Scope::Object,
        _ => Scope::Block,
    }
}

/// Replacement text for a renamed identifier, or `None` when the token is
/// not a reference to the binding.
fn renamed_reference(tokens: &Tokens<'_>, index: usize, scope: Option<Scope>, name: &str, renamed: &str) -> Option<String> {
    if tokens.is_member_access(index) {
        return None;
    }
    let prev = tokens.prev(index);
    let next = tokens.next(index);

    match scope {
        Some(Scope::Class) => {
            let member = match prev {
                None => true,
                Some(p) => {
                    ["{", "}", ";", "*"].iter().any(|s| tokens.is_punct(Some(p), s))
                        || tokens.is_word(Some(p), &["static", "get", "set", "async", "accessor"])
                        || (matches!(tokens.tokens[p].kind, TokenKind::Ident | TokenKind::Number | TokenKind::Literal)
                            || [")", "]"].iter().any(|s| tokens.is_punct(Some(p), s)))
                            && tokens.newline_between(p, index)
                }
            };
            (!member).then(|| renamed.to_string())
        }
        Some(Scope::Object) if tokens.is_punct(prev, "{") || tokens.is_punct(prev, ",") => {
            if tokens.is_punct(next, ":") || tokens.is_punct(next, "(") {
                None
            } else if ["}", ",", "="].iter().any(|p| tokens.is_punct(next, p)) {
                Some(format!("{name}: {renamed}"))
            } else {
                Some(renamed.to_string())
            }
        }
        _ => Some(renamed.to_string()),
    }
}

/// A `require("specifier")` call with a plain string argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequireCall {
    /// Byte range of the whole call
    pub start: usize,
    pub end: usize,
    pub specifier: String,
}

/// CommonJS constructs found in a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommonJsUsage {
    /// `module.exports` or a free `exports` appears
    pub uses_exports: bool,
    /// Names assigned through `exports.name =` or `module.exports.name =`
    pub named_exports: Vec<String>,
    pub requires: Vec<RequireCall>,
}

impl CommonJsUsage {
    pub fn is_commonjs(&self) -> bool {
        self.uses_exports || !self.requires.is_empty()
    }
}

pub(crate) fn commonjs_usage(code: &str) -> CommonJsUsage {
    let tokens = Tokens::new(code);
    let mut usage = CommonJsUsage::default();

    for index in 0..tokens.tokens.len() {
        if tokens.tokens[index].kind != TokenKind::Ident || tokens.is_member_access(index) {
            continue;
        }
        match tokens.text(index) {
            "require" => {
                if let Some(call) = require_call(&tokens, index) {
                    usage.requires.push(call);
                }
            }
            "module" => {
                let dot = tokens.next(index);
                let field = dot.and_then(|d| tokens.next(d));
                if tokens.is_punct(dot, ".") && tokens.is_word(field, &["exports"]) {
                    usage.uses_exports = true;
                    if let Some(name) = field.and_then(|f| assigned_property(&tokens, f)) {
                        push_unique(&mut usage.named_exports, name);
                    }
                }
            }
            "exports" => {
                if tokens.is_punct(tokens.next(index), ":") {
                    continue;
                }
                usage.uses_exports = true;
                if let Some(name) = assigned_property(&tokens, index) {
                    push_unique(&mut usage.named_exports, name);
                }
            }
            _ => {}
        }
    }

    usage
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// `require ( "x" )` starting at the `require` token.
fn require_call(tokens: &Tokens<'_>, index: usize) -> Option<RequireCall> {
    let open = tokens.next(index).filter(|&i| tokens.is_punct(Some(i), "("))?;
    let literal = tokens.next(open)?;
    let text = tokens.text(literal);
    let quoted = tokens.tokens[literal].kind == TokenKind::Literal
        && text.len() >= 2
        && (text.starts_with('"') || text.starts_with('\''))
        && text.ends_with(&text[..1]);
    if !quoted {
        return None;
    }
    let close = tokens.next(literal).filter(|&i| tokens.is_punct(Some(i), ")"))?;
    Some(RequireCall {
        start: tokens.tokens[index].start,
        end: tokens.tokens[close].end,
        specifier: text[1..text.len() - 1].to_string(),
    })
}

/// `.name =` after the token at `index`, excluding `==`.
fn assigned_property<'a>(tokens: &Tokens<'a>, index: usize) -> Option<&'a str> {
    let dot = tokens.next(index).filter(|&i| tokens.is_punct(Some(i), "."))?;
    let name = tokens.next(dot).filter(|&i| tokens.tokens[i].kind == TokenKind::Ident)?;
    let eq = tokens.next(name).filter(|&i| tokens.is_punct(Some(i), "="))?;
    let compares = tokens
        .tokens
        .get(eq + 1)
        .is_some_and(|t| t.kind == TokenKind::Punct && matches!(t.text(tokens.code), "=" | ">"));
    (!compares).then(|| tokens.text(name))
}

/// First free name among `name`, `name$1`, `name$2`, ...
pub(crate) fn claim(taken: &mut FxHashSet<String>, name: &str) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{name}${n}"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}
