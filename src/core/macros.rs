/// Macro expansion — definitions, calls, conditionals, and the two-level
/// macro store (a committed table shared by reference plus a staged overlay).

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::convenient::{parse_dict, parse_pair, ConvError};
use super::modules::{resolve, PathError};
use super::tokenizer::tokenize;
use crate::schema::token::{Token, TokenKind};
use crate::schema::value::Value;

pub type MacroMap = FxHashMap<String, Value>;

pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Debug, Error, PartialEq)]
pub enum MacroError {
    #[error("macro '{0}' is not defined")]
    Undefined(String),
    #[error("macro expansion exceeded the maximum depth of {depth}")]
    RecursionLimit { depth: usize },
    #[error(transparent)]
    Conv(#[from] ConvError),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// The macro bindings visible at one point of expansion.
///
/// Reads fall through the staged overlay to the committed table. Writes and
/// removals only touch the overlay until the owner merges it into a
/// [`SharedMacros`]. When the scope is rooted at a module, names are resolved
/// against it first, so `.choice` inside `dlg.ask` addresses `dlg.choice`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroScope {
    base: Option<String>,
    committed: Arc<MacroMap>,
    stage: MacroMap,
    removed: FxHashSet<String>,
}

impl MacroScope {
    /// An unrooted scope over a fixed table.
    pub fn from_map(map: MacroMap) -> Self {
        Self {
            committed: Arc::new(map),
            ..Self::default()
        }
    }

    /// A scope rooted at module `base`, reading through `committed`.
    pub fn rooted(base: impl Into<String>, committed: Arc<MacroMap>) -> Self {
        Self {
            base: Some(base.into()),
            committed,
            ..Self::default()
        }
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// The same bindings seen from another module.
    #[must_use]
    pub fn rebased(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Resolve a macro name to the key it is stored under.
    pub fn key(&self, name: &str) -> Result<String, PathError> {
        match &self.base {
            Some(base) => resolve(base, name),
            None => Ok(name.to_string()),
        }
    }

    fn get_key(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.stage.get(key) {
            return Some(value);
        }
        if self.removed.contains(key) {
            return None;
        }
        self.committed.get(key)
    }

    pub fn get(&self, name: &str) -> Result<Option<&Value>, PathError> {
        let key = self.key(name)?;
        Ok(self.get_key(&key))
    }

    pub fn contains(&self, name: &str) -> Result<bool, PathError> {
        Ok(self.get(name)?.is_some())
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), PathError> {
        let key = self.key(name)?;
        self.removed.remove(&key);
        self.stage.insert(key, value);
        Ok(())
    }

    /// Remove a binding, returning what it held.
    pub fn remove(&mut self, name: &str) -> Result<Option<Value>, PathError> {
        let key = self.key(name)?;
        let previous = self.get_key(&key).cloned();
        self.stage.remove(&key);
        if self.committed.contains_key(&key) {
            self.removed.insert(key);
        }
        Ok(previous)
    }

    /// Make the binding for `name` match the one in `other`.
    pub fn restore_from(&mut self, other: &MacroScope, name: &str) -> Result<(), PathError> {
        let key = self.key(name)?;
        match other.stage.get(&key) {
            Some(value) => {
                self.stage.insert(key.clone(), value.clone());
            }
            None => {
                self.stage.remove(&key);
            }
        }
        if other.removed.contains(&key) {
            self.removed.insert(key);
        } else {
            self.removed.remove(&key);
        }
        Ok(())
    }

    /// Writes not yet merged into the committed table.
    pub fn staged(&self) -> &MacroMap {
        &self.stage
    }

    /// Take the overlay out of this scope, leaving it empty. Useful for
    /// carrying uncommitted writes into a fresh scope.
    pub fn take_stage(&mut self) -> (MacroMap, FxHashSet<String>) {
        (
            std::mem::take(&mut self.stage),
            std::mem::take(&mut self.removed),
        )
    }

    /// Seed the overlay, e.g. with writes carried over from a caller.
    pub fn extend_stage(&mut self, stage: MacroMap, removed: FxHashSet<String>) {
        for key in removed {
            self.stage.remove(&key);
            self.removed.insert(key);
        }
        for (key, value) in stage {
            self.removed.remove(&key);
            self.stage.insert(key, value);
        }
    }

    /// Apply the overlay to `target`.
    pub fn commit_into(&self, target: &mut MacroMap) {
        for key in &self.removed {
            target.remove(key);
        }
        for (key, value) in &self.stage {
            target.insert(key.clone(), value.clone());
        }
    }

    /// Every visible binding, keyed by absolute name.
    pub fn flatten(&self) -> MacroMap {
        let mut all = (*self.committed).clone();
        self.commit_into(&mut all);
        all
    }
}

/// The global committed macro table. Clones share the same table.
///
/// Readers take an `Arc` snapshot, so scopes built from it never hold the lock.
#[derive(Debug, Clone, Default)]
pub struct SharedMacros(Arc<RwLock<Arc<MacroMap>>>);

impl SharedMacros {
    pub fn new(map: MacroMap) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(map))))
    }

    pub fn snapshot(&self) -> Arc<MacroMap> {
        Arc::clone(&self.0.read())
    }

    /// A scope rooted at `base` reading through the current table.
    pub fn scope(&self, base: &str) -> MacroScope {
        MacroScope::rooted(base, self.snapshot())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut table = self.0.write();
        Arc::make_mut(&mut *table).insert(key.into(), value);
    }

    /// Commit a scope's staged writes and removals.
    pub fn merge(&self, scope: &MacroScope) {
        if scope.stage.is_empty() && scope.removed.is_empty() {
            return;
        }
        let mut table = self.0.write();
        scope.commit_into(Arc::make_mut(&mut *table));
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

static PARAM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%(.*?)%").expect("Invalid macro parameter regex"));

/// Substitute `%name%` placeholders. `%%` produces a literal `%`; unknown
/// parameters produce nothing.
fn substitute(template: &str, params: &MacroMap) -> String {
    PARAM_PATTERN
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            if name.is_empty() {
                return "%".to_string();
            }
            params.get(name).map(Value::to_string).unwrap_or_default()
        })
        .into_owned()
}

/// Expands macro commands in a token stream.
///
/// Recognized commands are consumed: `def`, `defexp`, `undef`, `!name`
/// calls, `ifelse` and `debug_print_macros`. Commands listed as scoped pass
/// through carrying a snapshot of the scope. Everything else passes through
/// untouched.
#[derive(Debug, Clone)]
pub struct MacroExpander {
    max_depth: usize,
    scoped_commands: FxHashSet<String>,
}

impl Default for MacroExpander {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            scoped_commands: FxHashSet::default(),
        }
    }
}

impl MacroExpander {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Commands that need the macro scope downstream.
    #[must_use]
    pub fn with_scoped_commands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scoped_commands.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn expand(&self, tokens: &[Token], scope: MacroScope) -> Result<(Vec<Token>, MacroScope), MacroError> {
        let mut scope = scope;
        let mut out = Vec::with_capacity(tokens.len());
        self.expand_into(tokens, &mut scope, &mut out, 0)?;
        Ok((out, scope))
    }

    fn expand_into(
        &self,
        tokens: &[Token],
        scope: &mut MacroScope,
        out: &mut Vec<Token>,
        depth: usize,
    ) -> Result<(), MacroError> {
        if depth > self.max_depth {
            return Err(MacroError::RecursionLimit {
                depth: self.max_depth,
            });
        }
        for token in tokens {
            let TokenKind::Command { name, argument } = &token.kind else {
                out.push(token.clone());
                continue;
            };
            let argument = argument.as_deref().unwrap_or("");
            match name.as_str() {
                "def" => {
                    let (key, value) = parse_pair(argument, scope)?;
                    scope.set(&key, value.unwrap_or(Value::Null))?;
                }
                "defexp" => {
                    let (key, value) = parse_pair(argument, scope)?;
                    let expanded = match value {
                        Some(value) => {
                            let mut inner = scope.clone();
                            let mut body = Vec::new();
                            self.expand_into(&template_tokens(&value), &mut inner, &mut body, depth + 1)?;
                            Value::Tokens(body)
                        }
                        None => Value::Null,
                    };
                    scope.set(&key, expanded)?;
                }
                "undef" => {
                    let key = argument.trim();
                    if scope.remove(key)?.is_none() {
                        return Err(MacroError::Undefined(key.to_string()));
                    }
                }
                "ifelse" => {
                    let args = parse_dict(argument, scope)?;
                    let equal = match (args.get("a"), args.get("b")) {
                        (None | Some(Value::Null), None | Some(Value::Null)) => true,
                        (Some(a), Some(b)) => a.loosely_equals(b),
                        _ => false,
                    };
                    let branch = if equal { "then" } else { "else" };
                    if let Some(body) = args.get(branch) {
                        self.call(body, &MacroMap::default(), scope, out, depth)?;
                    }
                }
                "debug_print_macros" => {
                    tracing::debug!(base = ?scope.base(), macros = ?scope.flatten(), "macro scope");
                }
                call if call.starts_with('!') => {
                    let macro_name = &call[1..];
                    let template = scope
                        .get(macro_name)?
                        .cloned()
                        .ok_or_else(|| MacroError::Undefined(macro_name.to_string()))?;
                    let params = parse_dict(argument, scope)?;
                    self.call(&template, &params, scope, out, depth)?;
                }
                scoped if self.scoped_commands.contains(scoped) => {
                    out.push(token.clone().with_macros(scope.clone()));
                }
                _ => out.push(token.clone()),
            }
        }
        Ok(())
    }

    /// Expand a macro body into `out`. Parameters are visible as macros while
    /// the body expands and are unbound afterwards. Other definitions made by
    /// the body stay in `scope`.
    fn call(
        &self,
        template: &Value,
        params: &MacroMap,
        scope: &mut MacroScope,
        out: &mut Vec<Token>,
        depth: usize,
    ) -> Result<(), MacroError> {
        if let Value::Tokens(expanded) = template {
            out.extend(expanded.iter().cloned());
            return Ok(());
        }
        let text = substitute(&template.to_string(), params);
        let body = tokenize(&text, true);

        let mut inner = scope.clone();
        for (name, value) in params {
            inner.set(name, value.clone())?;
        }
        self.expand_into(&body, &mut inner, out, depth + 1)?;
        for name in params.keys() {
            inner.restore_from(scope, name)?;
        }
        *scope = inner;
        Ok(())
    }
}

fn template_tokens(value: &Value) -> Vec<Token> {
    match value {
        Value::Tokens(tokens) => tokens.clone(),
        other => tokenize(&other.to_string(), true),
    }
}
