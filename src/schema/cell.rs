use serde::{Deserialize, Serialize};

use super::token::{Glyph, Token, TokenKind};
use super::value::{StyleMap, Value};

/// One painted cell of the grid display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenCell {
    /// Plain character, or `None` for custom glyphs and blank cells.
    pub ch: Option<char>,
    /// `(glyphset, spec)` of a custom glyph.
    #[serde(default)]
    pub custom: Option<(Option<String>, String)>,
    pub fg: String,
    pub bg: String,
    pub hlit: bool,
    pub bold: bool,
    pub emph: bool,
    pub undl: bool,
    pub midl: bool,
    pub topl: bool,
}

impl Default for ScreenCell {
    fn default() -> Self {
        Self {
            ch: None,
            custom: None,
            fg: "white".to_string(),
            bg: "black".to_string(),
            hlit: false,
            bold: false,
            emph: false,
            undl: false,
            midl: false,
            topl: false,
        }
    }
}

impl ScreenCell {
    pub fn from_char(ch: char) -> Self {
        Self {
            ch: Some(ch),
            ..Self::default()
        }
    }

    /// Cell for a printable token, styled by its `style` metadata.
    /// Returns `None` for control tokens.
    pub fn from_token(token: &Token) -> Option<Self> {
        let TokenKind::Character(glyph) = &token.kind else {
            return None;
        };
        let mut cell = match glyph {
            Glyph::Char(ch) => Self::from_char(*ch),
            Glyph::Custom(custom) => Self {
                custom: Some((custom.glyphset.clone(), custom.spec.clone())),
                ..Self::default()
            },
        };
        if let Some(style) = &token.meta.style {
            cell.apply_style(style);
        }
        Some(cell)
    }

    /// Overwrite the attributes named in `style`. Unknown keys and values of
    /// the wrong type are ignored.
    pub fn apply_style(&mut self, style: &StyleMap) {
        for (key, value) in style {
            match (key.as_str(), value) {
                ("fg", Value::String(s)) => self.fg = s.clone(),
                ("bg", Value::String(s)) => self.bg = s.clone(),
                ("hlit", Value::Bool(b)) => self.hlit = *b,
                ("bold", Value::Bool(b)) => self.bold = *b,
                ("emph", Value::Bool(b)) => self.emph = *b,
                ("undl", Value::Bool(b)) => self.undl = *b,
                ("midl", Value::Bool(b)) => self.midl = *b,
                ("topl", Value::Bool(b)) => self.topl = *b,
                _ => tracing::debug!(key = %key, value = ?value, "ignoring style attribute"),
            }
        }
    }

    /// The character shown in a plain-text dump of the screen.
    pub fn display_char(&self) -> char {
        match (&self.ch, &self.custom) {
            (Some(ch), _) => *ch,
            (None, Some(_)) => '?',
            (None, None) => ' ',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::token::CustomGlyph;

    #[test]
    fn styled_character_cell() {
        let mut style = StyleMap::default();
        style.insert("fg".to_string(), Value::from("red"));
        style.insert("bold".to_string(), Value::Bool(true));
        let t = Token::character('x').with_style(style);
        let cell = ScreenCell::from_token(&t).unwrap();
        assert_eq!(cell.ch, Some('x'));
        assert_eq!(cell.fg, "red");
        assert!(cell.bold);
        assert_eq!(cell.bg, "black");
    }

    #[test]
    fn control_tokens_have_no_cell() {
        assert!(ScreenCell::from_token(&Token::delay(1.0)).is_none());
    }

    #[test]
    fn custom_glyph_cell() {
        let t = Token::new(TokenKind::Character(Glyph::Custom(CustomGlyph {
            glyphset: Some("c_hz".to_string()),
            spec: "-ab".to_string(),
        })));
        let cell = ScreenCell::from_token(&t).unwrap();
        assert_eq!(cell.ch, None);
        assert_eq!(cell.display_char(), '?');
        assert_eq!(cell.custom, Some((Some("c_hz".to_string()), "-ab".to_string())));
    }
}
