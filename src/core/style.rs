/// Style extension — `\s[key=value,...]` attributes scoped by braces.

use crate::core::convenient::parse_dict;
use crate::core::pipeline::{argument_scope, Extension, RenderError, ScopeStack};
use crate::schema::token::{Token, TokenKind};
use crate::schema::value::StyleMap;

/// Attaches the active style map to every character.
///
/// `\s[...]` merges its entries into the innermost brace scope, shadowing
/// earlier values; closing the brace restores the enclosing style.
#[derive(Debug, Clone, Default)]
pub struct StyleExt {
    initial: StyleMap,
}

impl StyleExt {
    pub fn new(initial: StyleMap) -> Self {
        Self { initial }
    }
}

impl Extension for StyleExt {
    fn name(&self) -> &'static str {
        "style"
    }

    fn scoped_commands(&self) -> &[&'static str] {
        &["s"]
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut styles = ScopeStack::new(self.initial.clone());
        let mut transformed = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.into_iter().enumerate() {
            match &token.kind {
                TokenKind::Character(_) => {
                    let style = styles.top().clone();
                    transformed.push(token.with_style(style));
                }
                TokenKind::Bracket(bracket) => {
                    styles.track(*bracket, index)?;
                    transformed.push(token);
                }
                TokenKind::Command { name, argument } if name == "s" => {
                    if let Some(argument) = argument {
                        let entries = parse_dict(argument, &argument_scope(&token))?;
                        styles.top_mut().extend(entries);
                    }
                }
                _ => transformed.push(token),
            }
        }
        Ok(transformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokenizer::tokenize;
    use crate::schema::value::Value;

    fn styled(text: &str) -> Vec<(char, StyleMap)> {
        StyleExt::default()
            .transform(tokenize(text, true))
            .unwrap()
            .into_iter()
            .filter_map(|t| Some((t.as_char()?, t.meta.style?)))
            .collect()
    }

    #[test]
    fn style_applies_until_the_scope_closes() {
        let chars = styled(r"a{\s[bold+,fg=red]b}c");
        assert!(chars[0].1.is_empty());
        assert_eq!(chars[1].1.get("bold"), Some(&Value::Bool(true)));
        assert_eq!(chars[1].1.get("fg"), Some(&Value::from("red")));
        assert!(chars[2].1.is_empty());
    }

    #[test]
    fn later_settings_shadow_earlier_ones() {
        let chars = styled(r"\s[fg=red]a{\s[fg=blue]b}c");
        assert_eq!(chars[0].1["fg"], Value::from("red"));
        assert_eq!(chars[1].1["fg"], Value::from("blue"));
        assert_eq!(chars[2].1["fg"], Value::from("red"));
    }

    #[test]
    fn initial_style_is_the_base() {
        let mut base = StyleMap::default();
        base.insert("bg".into(), Value::from("navy"));
        let tokens = StyleExt::new(base).transform(tokenize("x", true)).unwrap();
        assert_eq!(tokens[0].meta.style.as_ref().unwrap()["bg"], Value::from("navy"));
    }

    #[test]
    fn unmatched_close_is_an_error() {
        assert_eq!(
            StyleExt::default().transform(tokenize("a}", true)),
            Err(RenderError::UnbalancedBracket { index: 1 })
        );
    }
}
