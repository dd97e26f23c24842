/// Glyphset extension — custom glyphs drawn by a named glyph renderer.

use crate::core::pipeline::{Extension, RenderError, ScopeStack};
use crate::schema::token::{CustomGlyph, Glyph, Token, TokenKind};

/// `\g[spec]` emits a custom glyph of the active glyphset; `\glyphset[name]`
/// switches the glyphset of the innermost brace scope (no argument clears it).
#[derive(Debug, Clone, Default)]
pub struct GlyphsetExt {
    initial: Option<String>,
}

impl GlyphsetExt {
    pub fn new(initial: Option<String>) -> Self {
        Self { initial }
    }
}

impl Extension for GlyphsetExt {
    fn name(&self) -> &'static str {
        "glyphset"
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut glyphsets = ScopeStack::new(self.initial.clone());
        let mut transformed = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.into_iter().enumerate() {
            match &token.kind {
                TokenKind::Bracket(bracket) => {
                    glyphsets.track(*bracket, index)?;
                    transformed.push(token);
                }
                TokenKind::Command { name, argument } if name == "g" => {
                    let glyph = CustomGlyph {
                        glyphset: glyphsets.top().clone(),
                        spec: argument.clone().unwrap_or_default(),
                    };
                    transformed.push(token.with_kind(TokenKind::Character(Glyph::Custom(glyph))));
                }
                TokenKind::Command { name, argument } if name == "glyphset" => {
                    *glyphsets.top_mut() = argument.clone().filter(|a| !a.is_empty());
                }
                _ => transformed.push(token),
            }
        }
        Ok(transformed)
    }
}
