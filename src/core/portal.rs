/// Portal extension — line breaks, anchors, chains, and cursor repositioning.

use crate::core::convenient::{parse_dict, parse_value};
use crate::core::pipeline::{argument_scope, Extension, RenderError};
use crate::schema::token::{Token, TokenKind};
use crate::schema::value::Value;

/// Handles `\n`, `\r`, `\anchor`, `\anchorrm`, `\chain`, `\repos` and `\offset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalExt;

fn invalid(token: &Token) -> RenderError {
    RenderError::InvalidArgument {
        command: token.command_name().unwrap_or_default().to_string(),
        argument: token.command_argument().map(str::to_string),
    }
}

fn as_i32(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|v| i32::try_from(v).ok())
}

/// Line count for `\n`/`\r`: a value expression, a bare integer, or the default.
fn line_count(token: &Token, default: i32) -> Result<i32, RenderError> {
    let Some(argument) = token.command_argument() else {
        return Ok(default);
    };
    if argument.trim().is_empty() {
        return Ok(default);
    }
    match parse_value(argument, &argument_scope(token))? {
        Some(value) => as_i32(&value).ok_or_else(|| invalid(token)),
        None => argument.trim().parse().map_err(|_| invalid(token)),
    }
}

/// `(col, row)` components for `\repos`/`\offset`; missing ones stay `None`.
fn components(token: &Token) -> Result<(Option<i32>, Option<i32>), RenderError> {
    let args = parse_dict(token.command_argument().unwrap_or_default(), &argument_scope(token))?;
    let component = |key: &str| -> Result<Option<i32>, RenderError> {
        match args.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => as_i32(value).map(Some).ok_or_else(|| invalid(token)),
        }
    };
    Ok((component("col")?, component("row")?))
}

fn label(token: &Token) -> Result<String, RenderError> {
    match token.command_argument() {
        Some(label) if !label.is_empty() => Ok(label.to_string()),
        _ => Err(invalid(token)),
    }
}

impl Extension for PortalExt {
    fn name(&self) -> &'static str {
        "portal"
    }

    fn scoped_commands(&self) -> &[&'static str] {
        &["n", "r", "repos", "offset"]
    }

    fn transform(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut transformed = Vec::with_capacity(tokens.len());
        for token in tokens {
            let kind = match token.command_name() {
                Some("n") => TokenKind::NewLine(line_count(&token, 1)?),
                Some("r") => TokenKind::NewLine(line_count(&token, 0)?),
                Some("anchor") => TokenKind::Anchor(label(&token)?),
                Some("anchorrm") => TokenKind::AnchorRemove(label(&token)?),
                Some("chain") => TokenKind::Chain(label(&token)?),
                Some("repos") => {
                    let (col, row) = components(&token)?;
                    TokenKind::ReposAbsolute { col, row }
                }
                Some("offset") => {
                    let (dcol, drow) = components(&token)?;
                    TokenKind::ReposRelative { dcol, drow }
                }
                _ => {
                    transformed.push(token);
                    continue;
                }
            };
            transformed.push(token.with_kind(kind));
        }
        Ok(transformed)
    }
}
