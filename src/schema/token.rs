/// StyleML token model — a closed set of token kinds plus growable metadata.

use rustc_hash::FxHashMap;

use super::geometry::Vector2D;
use super::value::{StyleMap, Value};
use crate::core::macros::MacroScope;

/// A custom glyph, rendered by whatever renderer is registered for `glyphset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomGlyph {
    pub glyphset: Option<String>,
    pub spec: String,
}

/// What a printable token draws into its cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Glyph {
    Char(char),
    Custom(CustomGlyph),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Open,
    Close,
}

/// The kind of a token. Only `Character` occupies a grid cell; everything
/// else is a zero-width control token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Character(Glyph),
    Bracket(Bracket),
    /// `\name[argument]` or `\name `.
    Command {
        name: String,
        argument: Option<String>,
    },
    Anchor(String),
    AnchorRemove(String),
    Chain(String),
    /// Jump to an absolute cell. `None` keeps that component.
    ReposAbsolute {
        col: Option<i32>,
        row: Option<i32>,
    },
    /// Move by an offset. `None` leaves that component unchanged.
    ReposRelative {
        dcol: Option<i32>,
        drow: Option<i32>,
    },
    /// Return to column 0 and move down `count` rows.
    NewLine(i32),
    /// A pause that is not tied to a character; carries only `post_delay`.
    Delay,
    /// Start another sentence as a sub-flow when playback reaches this token.
    InterSentenceCall { is_sync: bool, target: String },
}

/// Metadata attached progressively by pipeline stages. The tokenizer leaves
/// it empty. Stages only ever add fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenMeta {
    /// Written by the renderer, remapped by post-render stages.
    pub pos: Option<Vector2D>,
    /// Written by the style extension on characters.
    pub style: Option<StyleMap>,
    /// Seconds to wait after this token is printed. Written by the animation extension.
    pub post_delay: Option<f64>,
    /// Macro scope snapshot for commands that resolve values lazily.
    pub macros: Option<MacroScope>,
    /// Extension-specific payload.
    pub data: FxHashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub meta: TokenMeta,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            meta: TokenMeta::default(),
        }
    }

    pub fn character(ch: char) -> Self {
        Self::new(TokenKind::Character(Glyph::Char(ch)))
    }

    pub fn bracket(bracket: Bracket) -> Self {
        Self::new(TokenKind::Bracket(bracket))
    }

    pub fn command(name: impl Into<String>, argument: Option<String>) -> Self {
        Self::new(TokenKind::Command {
            name: name.into(),
            argument,
        })
    }

    /// A zero-width pause token.
    pub fn delay(seconds: f64) -> Self {
        Self::new(TokenKind::Delay).with_post_delay(seconds)
    }

    /// Printable tokens occupy a cell and advance the cursor by one column.
    pub fn is_printable(&self) -> bool {
        matches!(self.kind, TokenKind::Character(_))
    }

    pub fn as_char(&self) -> Option<char> {
        match self.kind {
            TokenKind::Character(Glyph::Char(ch)) => Some(ch),
            _ => None,
        }
    }

    pub fn command_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Command { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn command_argument(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Command { argument, .. } => argument.as_deref(),
            _ => None,
        }
    }

    pub fn is_bracket(&self, bracket: Bracket) -> bool {
        self.kind == TokenKind::Bracket(bracket)
    }

    pub fn pos(&self) -> Option<Vector2D> {
        self.meta.pos
    }

    /// Post-delay in seconds, zero when the animation stage never ran.
    pub fn post_delay(&self) -> f64 {
        self.meta.post_delay.unwrap_or(0.0)
    }

    #[must_use]
    pub fn with_pos(mut self, pos: Vector2D) -> Self {
        self.meta.pos = Some(pos);
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: StyleMap) -> Self {
        self.meta.style = Some(style);
        self
    }

    #[must_use]
    pub fn with_post_delay(mut self, seconds: f64) -> Self {
        self.meta.post_delay = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_macros(mut self, macros: MacroScope) -> Self {
        self.meta.macros = Some(macros);
        self
    }

    /// Replace the kind while carrying every metadata field over.
    #[must_use]
    pub fn with_kind(self, kind: TokenKind) -> Self {
        Self {
            kind,
            meta: self.meta,
        }
    }
}

/// Concatenate the plain characters of a token run, skipping control tokens.
pub fn plain_text(tokens: &[Token]) -> String {
    tokens.iter().filter_map(Token::as_char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_characters_are_printable() {
        assert!(Token::character('a').is_printable());
        assert!(!Token::bracket(Bracket::Open).is_printable());
        assert!(!Token::command("n", None).is_printable());
        assert!(!Token::delay(1.0).is_printable());
    }

    #[test]
    fn with_kind_keeps_metadata() {
        let t = Token::character('a')
            .with_pos(Vector2D::new(1, 2))
            .with_post_delay(0.5)
            .with_kind(TokenKind::NewLine(1));
        assert_eq!(t.pos(), Some(Vector2D::new(1, 2)));
        assert_eq!(t.post_delay(), 0.5);
    }

    #[test]
    fn plain_text_skips_control_tokens() {
        let tokens = vec![
            Token::character('h'),
            Token::bracket(Bracket::Open),
            Token::character('i'),
            Token::delay(1.0),
        ];
        assert_eq!(plain_text(&tokens), "hi");
    }
}
