/// Regional dialogue — a sentence graph rendered into screen regions, with
/// transitions resolved lazily from macros and an explicit call stack.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::animation::AnimationExt;
use crate::core::convenient::{parse_value, ConvError};
use crate::core::glyph::GlyphsetExt;
use crate::core::layout::{AffineTransformExt, LineWrapExt};
use crate::core::macros::{MacroError, MacroExpander, MacroMap, MacroScope, SharedMacros, DEFAULT_MAX_DEPTH};
use crate::core::modules::{resolve, PathError};
use crate::core::pipeline::{argument_scope, Extension, RenderError, ReturnCharExt, StyleMLPipeline};
use crate::core::portal::PortalExt;
use crate::core::style::StyleExt;
use crate::core::tokenizer::tokenize;
use crate::schema::region::ScreenRegion;
use crate::schema::sentence::{ConvField, Sentence};
use crate::schema::token::{Token, TokenKind};
use crate::schema::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum DialogueError {
    #[error("sentence not found: {0}")]
    SentenceNotFound(String),
    #[error("screen region not found: {0}")]
    RegionNotFound(String),
    #[error("return requested with an empty call stack")]
    EmptyCallStack,
    #[error("the dialogue has no next sentence")]
    Exhausted,
    #[error("{field} of '{sentence}' evaluated to unusable value {value:?}")]
    InvalidConv {
        sentence: String,
        field: ConvField,
        value: Value,
    },
    #[error("macro error: {0}")]
    Macro(#[from] MacroError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("module path error: {0}")]
    Path(#[from] PathError),
    #[error("conv error: {0}")]
    Conv(#[from] ConvError),
}

/// Turns `\stcall[target]` and `\stcallsync[target]` into inter-sentence call
/// tokens. The target is a value expression evaluated under the command's
/// macro snapshot, or a literal module path.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterSentenceCallExt;

impl Extension for InterSentenceCallExt {
    fn name(&self) -> &'static str {
        "inter_sentence_call"
    }

    fn scoped_commands(&self) -> &[&'static str] {
        &["stcall", "stcallsync"]
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut transformed = Vec::with_capacity(tokens.len());
        for token in tokens {
            let is_sync = match token.command_name() {
                Some("stcall") => false,
                Some("stcallsync") => true,
                _ => {
                    transformed.push(token);
                    continue;
                }
            };
            let argument = token
                .command_argument()
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| RenderError::InvalidArgument {
                    command: token.command_name().unwrap_or_default().to_string(),
                    argument: None,
                })?;
            let target = match parse_value(argument, &argument_scope(&token))? {
                Some(value) => value.to_string(),
                None => argument.trim().to_string(),
            };
            transformed.push(token.with_kind(TokenKind::InterSentenceCall { is_sync, target }));
        }
        Ok(transformed)
    }
}

/// The extension set sentences are rendered with: inter-sentence calls,
/// portal, glyphset, animation, style, return characters. Macro expansion is
/// left to the dialogue manager.
pub fn dialogue_pipeline(initial_tick: f64, tick_multiplier: f64) -> StyleMLPipeline {
    StyleMLPipeline::builder()
        .extension(InterSentenceCallExt)
        .extension(PortalExt)
        .extension(GlyphsetExt::default())
        .extension(AnimationExt::new(initial_tick, tick_multiplier))
        .extension(StyleExt::default())
        .extension(ReturnCharExt)
        .build()
}

/// Everything sentences are evaluated against. Cloning shares the sentence
/// graph, the regions and the committed macro table.
#[derive(Debug, Clone)]
pub struct DialogueWorld {
    sentences: Arc<FxHashMap<String, Sentence>>,
    regions: Arc<FxHashMap<String, ScreenRegion>>,
    macros: SharedMacros,
    pipeline: Arc<StyleMLPipeline>,
    expander: Arc<MacroExpander>,
}

/// Builder for constructing a `DialogueWorld`.
#[derive(Debug)]
pub struct DialogueWorldBuilder {
    sentences: FxHashMap<String, Sentence>,
    regions: FxHashMap<String, ScreenRegion>,
    macros: MacroMap,
    predefined: Vec<String>,
    pipeline: Option<StyleMLPipeline>,
    initial_tick: f64,
    tick_multiplier: f64,
    max_macro_depth: usize,
}

impl DialogueWorld {
    pub fn builder() -> DialogueWorldBuilder {
        DialogueWorldBuilder {
            sentences: FxHashMap::default(),
            regions: FxHashMap::default(),
            macros: MacroMap::default(),
            predefined: Vec::new(),
            pipeline: None,
            initial_tick: 0.0,
            tick_multiplier: 1.0,
            max_macro_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn sentence(&self, name: &str) -> Result<&Sentence, DialogueError> {
        self.sentences
            .get(name)
            .ok_or_else(|| DialogueError::SentenceNotFound(name.to_string()))
    }

    pub fn has_sentence(&self, name: &str) -> bool {
        self.sentences.contains_key(name)
    }

    pub fn region(&self, name: &str) -> Result<&ScreenRegion, DialogueError> {
        self.regions
            .get(name)
            .ok_or_else(|| DialogueError::RegionNotFound(name.to_string()))
    }

    pub fn sentences(&self) -> &FxHashMap<String, Sentence> {
        &self.sentences
    }

    pub fn regions(&self) -> &FxHashMap<String, ScreenRegion> {
        &self.regions
    }

    pub fn macros(&self) -> &SharedMacros {
        &self.macros
    }

    pub fn pipeline(&self) -> &StyleMLPipeline {
        &self.pipeline
    }

    pub fn expander(&self) -> &MacroExpander {
        &self.expander
    }
}

impl DialogueWorldBuilder {
    pub fn sentence(mut self, name: impl Into<String>, sentence: Sentence) -> Self {
        self.sentences.insert(name.into(), sentence);
        self
    }

    pub fn sentences(mut self, sentences: impl IntoIterator<Item = (String, Sentence)>) -> Self {
        self.sentences.extend(sentences);
        self
    }

    pub fn region(mut self, name: impl Into<String>, region: ScreenRegion) -> Self {
        self.regions.insert(name.into(), region);
        self
    }

    pub fn regions(mut self, regions: impl IntoIterator<Item = (String, ScreenRegion)>) -> Self {
        self.regions.extend(regions);
        self
    }

    pub fn macro_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.macros.insert(name.into(), value);
        self
    }

    /// StyleML source whose definitions are committed before the first
    /// sentence runs.
    pub fn predefined_macros(mut self, source: impl Into<String>) -> Self {
        self.predefined.push(source.into());
        self
    }

    /// Base reveal delay per character and its multiplier, used when no
    /// pipeline is supplied.
    pub fn tick(mut self, initial_tick: f64, tick_multiplier: f64) -> Self {
        self.initial_tick = initial_tick;
        self.tick_multiplier = tick_multiplier;
        self
    }

    /// Replace the default sentence pipeline. It should not expand macros.
    pub fn pipeline(mut self, pipeline: StyleMLPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn max_macro_depth(mut self, depth: usize) -> Self {
        self.max_macro_depth = depth;
        self
    }

    pub fn build(self) -> Result<DialogueWorld, DialogueError> {
        let pipeline = self
            .pipeline
            .unwrap_or_else(|| dialogue_pipeline(self.initial_tick, self.tick_multiplier));
        let expander = MacroExpander::new()
            .with_max_depth(self.max_macro_depth)
            .with_scoped_commands(pipeline.scoped_commands());

        let macros = SharedMacros::new(self.macros);
        for source in &self.predefined {
            let (_, scope) = expander.expand(&tokenize(source, false), macros.scope(""))?;
            macros.merge(&scope);
        }
        tracing::debug!(
            sentences = self.sentences.len(),
            regions = self.regions.len(),
            macros = macros.len(),
            "dialogue world built"
        );

        Ok(DialogueWorld {
            sentences: Arc::new(self.sentences),
            regions: Arc::new(self.regions),
            macros,
            pipeline: Arc::new(pipeline),
            expander: Arc::new(expander),
        })
    }
}

/// Walks the sentence graph. The state is the current sentence, the call
/// stack, and the transition staged by the last `eval_sentence`.
#[derive(Debug, Clone)]
pub struct RegionalDialogueManager {
    world: DialogueWorld,
    current: Option<String>,
    next: Option<String>,
    is_call: bool,
    is_return: bool,
    call_stack: Vec<String>,
    /// Uncommitted bindings handed over by an inter-sentence call; applied to
    /// the first evaluation only.
    carried: Option<MacroScope>,
}

impl RegionalDialogueManager {
    pub fn new(world: DialogueWorld, start: impl Into<String>) -> Self {
        Self {
            world,
            current: Some(start.into()),
            next: None,
            is_call: false,
            is_return: false,
            call_stack: Vec::new(),
            carried: None,
        }
    }

    /// An independent manager over the same world, starting at `target`.
    /// `macros` is the caller's snapshot at the call site.
    pub fn fork(&self, target: impl Into<String>, macros: Option<MacroScope>) -> Self {
        Self {
            carried: macros,
            ..Self::new(self.world.clone(), target)
        }
    }

    pub fn world(&self) -> &DialogueWorld {
        &self.world
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn call_stack(&self) -> &[String] {
        &self.call_stack
    }

    /// The transition staged by the last evaluation.
    pub fn staged_next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn is_call(&self) -> bool {
        self.is_call
    }

    pub fn is_return(&self) -> bool {
        self.is_return
    }

    /// Move to `name` directly, discarding any staged transition.
    pub fn jump_to(&mut self, name: impl Into<String>) {
        self.current = Some(name.into());
        self.next = None;
        self.is_call = false;
        self.is_return = false;
    }

    fn current_or_exhausted(&self) -> Result<&str, DialogueError> {
        self.current.as_deref().ok_or(DialogueError::Exhausted)
    }

    pub fn current_sentence(&self) -> Result<&Sentence, DialogueError> {
        self.world.sentence(self.current_or_exhausted()?)
    }

    /// Evaluate one conv of sentence `name` against the committed macros.
    pub fn eval_conv(&self, name: &str, field: ConvField) -> Result<Option<Value>, DialogueError> {
        let sentence = self.world.sentence(name)?;
        let scope = self.world.macros.scope(name);
        conv_value(sentence, field, &scope)
    }

    pub fn current_conv(&self, field: ConvField) -> Result<Option<Value>, DialogueError> {
        self.eval_conv(self.current_or_exhausted()?, field)
    }

    /// A flag-like conv of the current sentence; absent counts as false.
    pub fn current_flag(&self, field: ConvField) -> Result<bool, DialogueError> {
        Ok(self.current_conv(field)?.is_some_and(|v| v.is_truthy()))
    }

    /// How many choices the current sentence offers, if it offers any.
    pub fn choice_amount(&self) -> Result<Option<i64>, DialogueError> {
        let name = self.current_or_exhausted()?;
        match self.eval_conv(name, ConvField::ChoiceAmount)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| DialogueError::InvalidConv {
                sentence: name.to_string(),
                field: ConvField::ChoiceAmount,
                value,
            }),
        }
    }

    /// The region the current sentence renders into, if any.
    pub fn current_region(&self) -> Result<Option<ScreenRegion>, DialogueError> {
        match region_name(self.current_conv(ConvField::Region)?) {
            Some(name) => Ok(Some(*self.world.region(&name)?)),
            None => Ok(None),
        }
    }

    /// Evaluate the current sentence.
    ///
    /// Binds `.choice` for sentences that offer choices, expands macros,
    /// stages the next transition, commits the macro writes, and renders the
    /// content into its region. A sentence without a region renders nothing.
    pub fn eval_sentence(&mut self, choice: Option<i64>) -> Result<Vec<Token>, DialogueError> {
        let name = self.current_or_exhausted()?.to_string();
        let sentence = self.world.sentence(&name)?;

        let mut scope = self.world.macros.scope(&name);
        if let Some(mut carried) = self.carried.take() {
            let (stage, removed) = carried.take_stage();
            scope.extend_stage(stage, removed);
        }
        if sentence.has_choices() {
            scope.set(".choice", choice.map_or(Value::Null, Value::Int))?;
        }

        let (expanded, scope) = self.world.expander.expand(&sentence.content, scope)?;

        self.next = match conv_value(sentence, ConvField::Next, &scope)? {
            None | Some(Value::Null) => None,
            Some(target) => Some(resolve(&name, &target.to_string())?),
        };
        self.is_call = conv_value(sentence, ConvField::Call, &scope)?.is_some_and(|v| v.is_truthy());
        self.is_return = conv_value(sentence, ConvField::Return, &scope)?.is_some_and(|v| v.is_truthy());
        let region = region_name(conv_value(sentence, ConvField::Region, &scope)?);

        self.world.macros.merge(&scope);
        tracing::debug!(
            sentence = %name,
            next = ?self.next,
            call = self.is_call,
            ret = self.is_return,
            region = ?region,
            "sentence evaluated"
        );

        let Some(region) = region else {
            return Ok(Vec::new());
        };
        let region = *self.world.region(&region)?;
        let pipeline = &self.world.pipeline;
        let rendered = pipeline.render(pipeline.transform_expanded(expanded)?)?;
        let wrapped = LineWrapExt::for_region(&region).post_render(rendered)?;
        Ok(AffineTransformExt::for_region(&region).post_render(wrapped)?)
    }

    /// Commit the staged transition: push on call, pop on return, otherwise
    /// move to the staged next sentence.
    pub fn next_sentence(&mut self) -> Result<(), DialogueError> {
        let current = self.current_or_exhausted()?.to_string();
        let target = if self.is_return {
            if self.call_stack.is_empty() && !self.is_call {
                return Err(DialogueError::EmptyCallStack);
            }
            None
        } else {
            let next = self.next.clone().ok_or(DialogueError::Exhausted)?;
            if !self.world.has_sentence(&next) {
                return Err(DialogueError::SentenceNotFound(next));
            }
            Some(next)
        };

        if self.is_call {
            self.call_stack.push(current.clone());
        }
        let target = match target {
            Some(target) => target,
            None => self.call_stack.pop().ok_or(DialogueError::EmptyCallStack)?,
        };
        tracing::debug!(from = %current, to = %target, depth = self.call_stack.len(), "sentence transition");
        self.current = Some(target);
        self.next = None;
        self.is_call = false;
        self.is_return = false;
        Ok(())
    }
}

fn conv_value(sentence: &Sentence, field: ConvField, scope: &MacroScope) -> Result<Option<Value>, DialogueError> {
    match sentence.conv(field) {
        Some(conv) => Ok(parse_value(conv, scope)?),
        None => Ok(None),
    }
}

fn region_name(value: Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.to_string()),
    }
}
