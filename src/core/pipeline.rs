/// The StyleML pipeline: Text → Tokens → Transformed tokens → Positioned tokens.
///
/// Wires together the tokenizer, optional macro expansion, the registered
/// extensions, the core position renderer, and post-render stages.

use std::fmt::Debug;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::animation::AnimationExt;
use crate::core::convenient::ConvError;
use crate::core::glyph::GlyphsetExt;
use crate::core::macros::{MacroError, MacroExpander, MacroMap, MacroScope};
use crate::core::portal::PortalExt;
use crate::core::style::StyleExt;
use crate::core::tokenizer::tokenize;
use crate::schema::geometry::Vector2D;
use crate::schema::token::{Bracket, Glyph, Token, TokenKind};

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("unbalanced '}}' at token {index}")]
    UnbalancedBracket { index: usize },
    #[error("cursor left the coordinate range at token {index}")]
    PositionOverflow { index: usize },
    #[error("anchor '{0}' does not exist")]
    MissingAnchor(String),
    #[error("invalid argument {argument:?} for command '{command}'")]
    InvalidArgument {
        command: String,
        argument: Option<String>,
    },
    #[error("macro error: {0}")]
    Macro(#[from] MacroError),
    #[error("argument error: {0}")]
    Conv(#[from] ConvError),
}

/// A pipeline stage. `transform` runs before positions exist; `post_render`
/// runs after the core renderer has attached `pos` to every token.
pub trait Extension: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Commands that must carry a macro scope snapshot out of macro expansion.
    fn scoped_commands(&self) -> &[&'static str] {
        &[]
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        Ok(tokens)
    }

    fn post_render(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        Ok(tokens)
    }
}

/// A value stack mirroring `{`/`}` nesting. `{` duplicates the top frame,
/// `}` drops it, and commands edit the top frame in place.
#[derive(Debug, Clone)]
pub struct ScopeStack<T: Clone> {
    frames: Vec<T>,
}

impl<T: Clone> ScopeStack<T> {
    pub fn new(initial: T) -> Self {
        Self {
            frames: vec![initial],
        }
    }

    pub fn top(&self) -> &T {
        // the bottom frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    pub fn top_mut(&mut self) -> &mut T {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Track a bracket token. `index` is reported when a `}` has no match.
    pub fn track(&mut self, bracket: Bracket, index: usize) -> Result<(), RenderError> {
        match bracket {
            Bracket::Open => {
                let top = self.top().clone();
                self.frames.push(top);
                Ok(())
            }
            Bracket::Close if self.frames.len() > 1 => {
                self.frames.pop();
                Ok(())
            }
            Bracket::Close => Err(RenderError::UnbalancedBracket { index }),
        }
    }
}

/// The macro scope a command's argument is evaluated under: the snapshot
/// attached during expansion, or an empty scope.
pub fn argument_scope(token: &Token) -> MacroScope {
    token.meta.macros.clone().unwrap_or_default()
}

/// Literal `\n` and `\r` characters become line tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnCharExt;

impl Extension for ReturnCharExt {
    fn name(&self) -> &'static str {
        "return_char"
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        Ok(tokens
            .into_iter()
            .map(|t| match t.kind {
                TokenKind::Character(Glyph::Char('\n')) => t.with_kind(TokenKind::NewLine(1)),
                TokenKind::Character(Glyph::Char('\r')) => t.with_kind(TokenKind::NewLine(0)),
                _ => t,
            })
            .collect())
    }
}

/// Assign a `pos` to every token by walking a cursor over the stream.
///
/// Each token records the cursor before it acts. Printable tokens then move
/// the cursor one column right; repositioning tokens move it as they say.
pub fn render_positions(tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
    let mut cursor = Vector2D::ZERO;
    let mut anchors: FxHashMap<String, Vector2D> = FxHashMap::default();
    let mut rendered = Vec::with_capacity(tokens.len());

    for (index, token) in tokens.into_iter().enumerate() {
        let overflow = || RenderError::PositionOverflow { index };
        let token = token.with_pos(cursor);
        match &token.kind {
            TokenKind::ReposAbsolute { col, row } => {
                cursor = Vector2D::new(col.unwrap_or(cursor.x), row.unwrap_or(cursor.y));
            }
            TokenKind::ReposRelative { dcol, drow } => {
                cursor = cursor
                    .checked_add(Vector2D::new(dcol.unwrap_or(0), drow.unwrap_or(0)))
                    .ok_or_else(overflow)?;
            }
            TokenKind::NewLine(count) => {
                cursor = Vector2D::new(0, cursor.y.checked_add(*count).ok_or_else(overflow)?);
            }
            TokenKind::Anchor(label) => {
                anchors.insert(label.clone(), cursor);
            }
            TokenKind::AnchorRemove(label) => {
                if anchors.remove(label).is_none() {
                    return Err(RenderError::MissingAnchor(label.clone()));
                }
            }
            TokenKind::Chain(label) => {
                cursor = *anchors
                    .get(label)
                    .ok_or_else(|| RenderError::MissingAnchor(label.clone()))?;
            }
            TokenKind::Command { name, .. } => {
                tracing::debug!(command = %name, pos = %cursor, "command reached the renderer unhandled");
            }
            TokenKind::Character(_)
            | TokenKind::Bracket(_)
            | TokenKind::Delay
            | TokenKind::InterSentenceCall { .. } => {}
        }
        if token.is_printable() {
            cursor = cursor.checked_add(Vector2D::new(1, 0)).ok_or_else(overflow)?;
        }
        rendered.push(token);
    }
    Ok(rendered)
}

/// A configured StyleML processor. Built via `StyleMLPipeline::builder()`.
#[derive(Debug)]
pub struct StyleMLPipeline {
    expander: Option<MacroExpander>,
    initial_macros: MacroMap,
    extensions: Vec<Box<dyn Extension>>,
}

/// Builder for constructing a `StyleMLPipeline`.
#[derive(Debug, Default)]
pub struct StyleMLPipelineBuilder {
    expander: Option<MacroExpander>,
    initial_macros: MacroMap,
    extensions: Vec<Box<dyn Extension>>,
}

impl StyleMLPipeline {
    pub fn builder() -> StyleMLPipelineBuilder {
        StyleMLPipelineBuilder::default()
    }

    /// Macro expansion followed by the portal, glyphset, animation, style and
    /// return-character extensions.
    pub fn standard() -> Self {
        Self::builder()
            .with_macros(MacroExpander::new())
            .extensions_standard()
            .build()
    }

    /// Tokenize in full mode.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        tokenize(text, false)
    }

    pub fn expander(&self) -> Option<&MacroExpander> {
        self.expander.as_ref()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.iter().map(|e| e.as_ref())
    }

    /// Every command some extension wants a macro snapshot on.
    pub fn scoped_commands(&self) -> Vec<&'static str> {
        self.extensions
            .iter()
            .flat_map(|e| e.scoped_commands().iter().copied())
            .collect()
    }

    /// Expand macros (when enabled) and run every extension's transform.
    pub fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let tokens = match &self.expander {
            Some(expander) => {
                let scope = MacroScope::from_map(self.initial_macros.clone());
                expander.expand(&tokens, scope)?.0
            }
            None => tokens,
        };
        self.transform_expanded(tokens)
    }

    /// Run the extensions' transforms over tokens whose macros were already
    /// expanded elsewhere.
    pub fn transform_expanded(&self, mut tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        for ext in &self.extensions {
            tokens = ext.transform(tokens)?;
        }
        Ok(tokens)
    }

    /// Assign positions, then run every extension's post-render stage.
    pub fn render(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut tokens = render_positions(tokens)?;
        for ext in &self.extensions {
            tokens = ext.post_render(tokens)?;
        }
        Ok(tokens)
    }

    /// Tokenize, transform and render `text`.
    pub fn process(&self, text: &str) -> Result<Vec<Token>, RenderError> {
        let tokens = self.transform(self.tokenize(text))?;
        self.render(tokens)
    }
}

impl StyleMLPipelineBuilder {
    pub fn with_macros(mut self, expander: MacroExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Bindings visible to every `transform` call.
    pub fn initial_macros(mut self, macros: MacroMap) -> Self {
        self.initial_macros = macros;
        self
    }

    pub fn extension(mut self, ext: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(ext));
        self
    }

    pub fn extensions_standard(self) -> Self {
        self.extension(PortalExt)
            .extension(GlyphsetExt::default())
            .extension(AnimationExt::default())
            .extension(StyleExt::default())
            .extension(ReturnCharExt)
    }

    pub fn build(self) -> StyleMLPipeline {
        let expander = self.expander.map(|expander| {
            let scoped: Vec<&'static str> = self
                .extensions
                .iter()
                .flat_map(|e| e.scoped_commands().iter().copied())
                .collect();
            expander.with_scoped_commands(scoped)
        });
        StyleMLPipeline {
            expander,
            initial_macros: self.initial_macros,
            extensions: self.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::token::plain_text;

    fn positions(tokens: &[Token]) -> Vec<(char, Vector2D)> {
        tokens
            .iter()
            .filter_map(|t| Some((t.as_char()?, t.pos()?)))
            .collect()
    }

    #[test]
    fn plain_text_is_laid_out_left_to_right() {
        let pipeline = StyleMLPipeline::standard();
        let tokens = pipeline.process("hello").unwrap();
        let expected: Vec<_> = "hello"
            .chars()
            .enumerate()
            .map(|(i, ch)| (ch, Vector2D::new(i as i32, 0)))
            .collect();
        assert_eq!(positions(&tokens), expected);
    }

    #[test]
    fn newline_characters_start_new_rows() {
        let pipeline = StyleMLPipeline::standard();
        let tokens = pipeline.process("ab\ncd").unwrap();
        assert_eq!(
            positions(&tokens),
            vec![
                ('a', Vector2D::new(0, 0)),
                ('b', Vector2D::new(1, 0)),
                ('c', Vector2D::new(0, 1)),
                ('d', Vector2D::new(1, 1)),
            ]
        );
    }

    #[test]
    fn anchor_and_chain() {
        let tokens = vec![
            Token::character('a'),
            Token::new(TokenKind::Anchor("m".into())),
            Token::character('b'),
            Token::new(TokenKind::NewLine(2)),
            Token::new(TokenKind::Chain("m".into())),
            Token::character('c'),
        ];
        let rendered = render_positions(tokens).unwrap();
        assert_eq!(rendered[1].pos(), Some(Vector2D::new(1, 0)));
        assert_eq!(rendered[5].pos(), Some(Vector2D::new(1, 0)));
    }

    #[test]
    fn missing_anchor_is_an_error() {
        let chain = vec![Token::new(TokenKind::Chain("x".into()))];
        assert_eq!(
            render_positions(chain),
            Err(RenderError::MissingAnchor("x".into()))
        );
        let remove = vec![Token::new(TokenKind::AnchorRemove("x".into()))];
        assert!(render_positions(remove).is_err());
    }

    #[test]
    fn repositioning_keeps_absent_components() {
        let tokens = vec![
            Token::character('a'),
            Token::new(TokenKind::ReposAbsolute {
                col: None,
                row: Some(3),
            }),
            Token::character('b'),
            Token::new(TokenKind::ReposRelative {
                dcol: Some(2),
                drow: None,
            }),
            Token::character('c'),
        ];
        let rendered = render_positions(tokens).unwrap();
        assert_eq!(rendered[2].pos(), Some(Vector2D::new(1, 3)));
        assert_eq!(rendered[4].pos(), Some(Vector2D::new(4, 3)));
    }

    #[test]
    fn cursor_overflow_is_an_error() {
        let pipeline = StyleMLPipeline::standard();
        assert_eq!(
            pipeline.process(r"\repos[col;2147483647]ab"),
            Err(RenderError::PositionOverflow { index: 1 })
        );
        assert!(matches!(
            pipeline.process(r"\offset[row;2000000000]\offset[row;2000000000]a"),
            Err(RenderError::PositionOverflow { .. })
        ));

        let tokens = vec![
            Token::new(TokenKind::ReposAbsolute {
                col: None,
                row: Some(i32::MAX),
            }),
            Token::new(TokenKind::NewLine(1)),
        ];
        assert_eq!(render_positions(tokens), Err(RenderError::PositionOverflow { index: 1 }));
    }

    #[test]
    fn control_tokens_take_no_width() {
        let tokens = vec![
            Token::character('a'),
            Token::bracket(Bracket::Open),
            Token::delay(1.0),
            Token::character('b'),
        ];
        let rendered = render_positions(tokens).unwrap();
        assert_eq!(rendered[3].pos(), Some(Vector2D::new(1, 0)));
    }

    #[test]
    fn scope_stack_rejects_unmatched_close() {
        let mut stack = ScopeStack::new(0);
        stack.track(Bracket::Open, 0).unwrap();
        *stack.top_mut() = 5;
        stack.track(Bracket::Close, 1).unwrap();
        assert_eq!(*stack.top(), 0);
        assert_eq!(
            stack.track(Bracket::Close, 2),
            Err(RenderError::UnbalancedBracket { index: 2 })
        );
    }

    #[test]
    fn pipeline_without_macros_leaves_def_alone() {
        let pipeline = StyleMLPipeline::builder().extension(ReturnCharExt).build();
        let tokens = pipeline.transform(pipeline.tokenize(r"\def[x=;1]a")).unwrap();
        assert_eq!(tokens[0].command_name(), Some("def"));
        assert_eq!(plain_text(&tokens), "a");
    }

    #[test]
    fn initial_macros_are_visible() {
        let mut macros = MacroMap::default();
        macros.insert("who".into(), "Mika".into());
        let pipeline = StyleMLPipeline::builder()
            .with_macros(MacroExpander::new())
            .initial_macros(macros)
            .build();
        let tokens = pipeline.process(r"hi \!who ").unwrap();
        assert_eq!(plain_text(&tokens), "hi Mika");
    }
}
