/// Animation extension — per-character reveal delays and explicit pauses.

use crate::core::convenient::parse_value;
use crate::core::pipeline::{argument_scope, Extension, RenderError, ScopeStack};
use crate::schema::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Timing {
    tick: f64,
    multiplier: f64,
}

/// Attaches `post_delay = tick * multiplier` to every character.
///
/// `\tick[v]` and `\tickm[v]` set the tick and multiplier of the innermost
/// brace scope. `\delay[v]`, `\delaym[v]` and `\delayc[v]` emit a zero-width
/// delay token of `v`, `v * tick` and `v * tick * multiplier` seconds. A delay
/// does not reset the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationExt {
    initial_tick: f64,
    initial_multiplier: f64,
}

impl Default for AnimationExt {
    fn default() -> Self {
        Self {
            initial_tick: 0.0,
            initial_multiplier: 1.0,
        }
    }
}

impl AnimationExt {
    pub fn new(initial_tick: f64, initial_multiplier: f64) -> Self {
        Self {
            initial_tick,
            initial_multiplier,
        }
    }
}

fn number(token: &Token) -> Result<f64, RenderError> {
    let invalid = || RenderError::InvalidArgument {
        command: token.command_name().unwrap_or_default().to_string(),
        argument: token.command_argument().map(str::to_string),
    };
    let argument = token.command_argument().ok_or_else(invalid)?;
    match parse_value(argument, &argument_scope(token))? {
        Some(value) => value.as_f64().ok_or_else(invalid),
        None => argument.trim().parse().map_err(|_| invalid()),
    }
}

impl Extension for AnimationExt {
    fn name(&self) -> &'static str {
        "animation"
    }

    fn scoped_commands(&self) -> &[&'static str] {
        &["tick", "tickm", "delay", "delaym", "delayc"]
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut timing = ScopeStack::new(Timing {
            tick: self.initial_tick,
            multiplier: self.initial_multiplier,
        });
        let mut transformed = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.into_iter().enumerate() {
            let current = *timing.top();
            match &token.kind {
                TokenKind::Character(_) => {
                    transformed.push(token.with_post_delay(current.tick * current.multiplier));
                }
                TokenKind::Bracket(bracket) => {
                    timing.track(*bracket, index)?;
                    transformed.push(token);
                }
                TokenKind::Command { name, .. } => match name.as_str() {
                    "tick" => timing.top_mut().tick = number(&token)?,
                    "tickm" => timing.top_mut().multiplier = number(&token)?,
                    "delay" | "delaym" | "delayc" => {
                        let scale = match name.as_str() {
                            "delay" => 1.0,
                            "delaym" => current.tick,
                            _ => current.tick * current.multiplier,
                        };
                        let seconds = number(&token)? * scale;
                        transformed.push(token.with_kind(TokenKind::Delay).with_post_delay(seconds));
                    }
                    _ => transformed.push(token),
                },
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

    fn delays(text: &str) -> Vec<(Option<char>, f64)> {
        AnimationExt::default()
            .transform(tokenize(text, true))
            .unwrap()
            .into_iter()
            .filter(|t| t.is_printable() || t.kind == TokenKind::Delay)
            .map(|t| (t.as_char(), t.post_delay()))
            .collect()
    }

    #[test]
    fn tick_persists_across_a_delay() {
        assert_eq!(
            delays(r"\tick[;1]ab\delay[;2]cd"),
            vec![
                (Some('a'), 1.0),
                (Some('b'), 1.0),
                (None, 2.0),
                (Some('c'), 1.0),
                (Some('d'), 1.0),
            ]
        );
    }

    #[test]
    fn multiplier_scales_characters_and_delayc() {
        assert_eq!(
            delays(r"\tick[:0.5]\tickm[;4]a\delaym[;2]\delayc[;1]"),
            vec![(Some('a'), 2.0), (None, 1.0), (None, 2.0)]
        );
    }

    #[test]
    fn braces_restore_timing() {
        assert_eq!(
            delays(r"\tick[;1]a{\tick[;3]b}c"),
            vec![(Some('a'), 1.0), (Some('b'), 3.0), (Some('c'), 1.0)]
        );
    }

    #[test]
    fn bare_numbers_are_accepted() {
        assert_eq!(delays(r"\tick[0.25]a"), vec![(Some('a'), 0.25)]);
    }

    #[test]
    fn missing_argument_is_an_error() {
        assert!(matches!(
            AnimationExt::default().transform(tokenize(r"\tick x", true)),
            Err(RenderError::InvalidArgument { .. })
        ));
    }
}
