/// Post-render layout — wrapping into a bounded area and mapping local
/// positions onto the screen.

use std::collections::BTreeMap;

use crate::core::pipeline::{Extension, RenderError};
use crate::schema::geometry::Vector2D;
use crate::schema::region::ScreenRegion;
use crate::schema::token::Token;

/// Wraps rendered rows at `columns` and drops output past `rows`.
/// Zero means unbounded for either dimension.
///
/// Each original row takes `max_col / columns + 1` wrapped rows, and later
/// rows shift down by however many extra rows earlier ones needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineWrapExt {
    pub columns: i32,
    pub rows: i32,
    /// When false, control tokens take part in the wrap like characters do.
    pub only_printable: bool,
}

impl LineWrapExt {
    pub fn new(columns: i32, rows: i32) -> Self {
        Self {
            columns,
            rows,
            only_printable: true,
        }
    }

    /// Wrap to a region's size, moving control tokens along with characters.
    pub fn for_region(region: &ScreenRegion) -> Self {
        Self {
            columns: region.size.x,
            rows: region.size.y,
            only_printable: false,
        }
    }

    fn participates(&self, token: &Token) -> bool {
        token.pos().is_some() && (token.is_printable() || !self.only_printable)
    }

    /// Wrapped rows an original row needs when its rightmost column is `max`.
    fn rows_needed(&self, max: i32) -> i64 {
        if self.columns > 0 {
            i64::from(max.max(0) / self.columns) + 1
        } else {
            1
        }
    }

    /// First wrapped row of every used row. Unused rows between two used
    /// ones still take one wrapped row each. Rows starting at or past the
    /// row limit are left out.
    fn first_rows(&self, max_col: &BTreeMap<i32, i32>) -> BTreeMap<i32, i64> {
        let mut first_row = BTreeMap::new();
        let mut previous: Option<i32> = None;
        let mut next = 0i64;
        for (&y, &max) in max_col {
            next = match previous {
                Some(prev) => next + i64::from(y) - i64::from(prev) - 1,
                None => i64::from(y),
            };
            if self.rows > 0 && next >= i64::from(self.rows) {
                break;
            }
            first_row.insert(y, next);
            next += self.rows_needed(max);
            previous = Some(y);
        }
        first_row
    }
}

impl Extension for LineWrapExt {
    fn name(&self) -> &'static str {
        "line_wrap"
    }

    fn post_render(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        let mut max_col: BTreeMap<i32, i32> = BTreeMap::new();
        for pos in tokens.iter().filter(|t| self.participates(t)).filter_map(Token::pos) {
            let entry = max_col.entry(pos.y).or_insert(pos.x);
            *entry = (*entry).max(pos.x);
        }
        if max_col.is_empty() {
            return Ok(tokens);
        }
        let first_row = self.first_rows(&max_col);

        let mut wrapped = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.into_iter().enumerate() {
            let Some(pos) = token.pos().filter(|_| self.participates(&token)) else {
                wrapped.push(token);
                continue;
            };
            let Some(&first) = first_row.get(&pos.y) else {
                continue;
            };
            let (col, row) = if self.columns > 0 {
                (pos.x.rem_euclid(self.columns), first + i64::from(pos.x.div_euclid(self.columns)))
            } else {
                (pos.x, first)
            };
            if self.rows > 0 && row >= i64::from(self.rows) {
                continue;
            }
            let row = i32::try_from(row).map_err(|_| RenderError::PositionOverflow { index })?;
            wrapped.push(token.with_pos(Vector2D::new(col, row)));
        }
        Ok(wrapped)
    }
}

/// Maps local (column, row) positions through `row_grow`, `col_grow` and
/// `origin` into screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffineTransformExt {
    pub origin: Vector2D,
    pub row_grow: Vector2D,
    pub col_grow: Vector2D,
}

impl AffineTransformExt {
    pub fn for_region(region: &ScreenRegion) -> Self {
        Self {
            origin: region.origin,
            row_grow: region.row_grow,
            col_grow: region.col_grow,
        }
    }
}

impl Extension for AffineTransformExt {
    fn name(&self) -> &'static str {
        "affine_transform"
    }

    fn post_render(&self, tokens: Vec<Token>) -> Result<Vec<Token>, RenderError> {
        tokens
            .into_iter()
            .enumerate()
            .map(|(index, token)| match token.pos() {
                Some(pos) => pos
                    .checked_affine_transform(self.row_grow, self.col_grow, self.origin)
                    .map(|screen| token.with_pos(screen))
                    .ok_or(RenderError::PositionOverflow { index }),
                None => Ok(token),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::{render_positions, StyleMLPipeline};
    use crate::core::tokenizer::tokenize;
    use crate::schema::geometry::Cardinal;
    use crate::schema::token::TokenKind;

    fn rendered(text: &str) -> Vec<Token> {
        render_positions(tokenize(text, true)).unwrap()
    }

    fn char_positions(tokens: &[Token]) -> Vec<Vector2D> {
        tokens.iter().filter(|t| t.is_printable()).filter_map(Token::pos).collect()
    }

    #[test]
    fn twelve_characters_wrap_into_three_rows() {
        let tokens = LineWrapExt::new(5, 0).post_render(rendered("abcdefghijkl")).unwrap();
        let pos = char_positions(&tokens);
        assert_eq!(pos.len(), 12);
        assert_eq!(pos[0], Vector2D::new(0, 0));
        assert_eq!(pos[4], Vector2D::new(4, 0));
        assert_eq!(pos[5], Vector2D::new(0, 1));
        assert_eq!(pos[9], Vector2D::new(4, 1));
        assert_eq!(pos[10], Vector2D::new(0, 2));
        assert_eq!(pos[11], Vector2D::new(1, 2));
    }

    #[test]
    fn rows_limit_drops_overflow() {
        let tokens = LineWrapExt::new(5, 2).post_render(rendered("abcdefghijkl")).unwrap();
        let pos = char_positions(&tokens);
        assert_eq!(pos.len(), 10);
        assert!(pos.iter().all(|p| p.y < 2));
    }

    #[test]
    fn later_rows_shift_below_wrapped_ones() {
        let mut tokens = tokenize("abcdefg", true);
        tokens.push(Token::new(TokenKind::NewLine(1)));
        tokens.extend(tokenize("xy", true));
        let tokens = LineWrapExt::new(5, 0)
            .post_render(render_positions(tokens).unwrap())
            .unwrap();
        let pos = char_positions(&tokens);
        assert_eq!(pos[7], Vector2D::new(0, 2));
        assert_eq!(pos[8], Vector2D::new(1, 2));
    }

    #[test]
    fn blank_rows_between_used_rows_keep_their_height() {
        let mut tokens = tokenize("ab", true);
        tokens.push(Token::new(TokenKind::NewLine(2)));
        tokens.extend(tokenize("c", true));
        let tokens = LineWrapExt::new(1, 0)
            .post_render(render_positions(tokens).unwrap())
            .unwrap();
        assert_eq!(
            char_positions(&tokens),
            vec![Vector2D::new(0, 0), Vector2D::new(0, 1), Vector2D::new(0, 3)]
        );
    }

    #[test]
    fn distant_rows_are_dropped_without_walking_the_gap() {
        let pipeline = StyleMLPipeline::standard();
        let tokens = LineWrapExt::new(10, 4)
            .post_render(pipeline.process(r"a\repos[row;30000000]b").unwrap())
            .unwrap();
        assert_eq!(char_positions(&tokens), vec![Vector2D::new(0, 0)]);

        let tokens = LineWrapExt::new(0, 0)
            .post_render(pipeline.process(r"a\repos[row;2000000000]b").unwrap())
            .unwrap();
        assert_eq!(
            char_positions(&tokens),
            vec![Vector2D::new(0, 0), Vector2D::new(1, 2_000_000_000)]
        );
    }

    #[test]
    fn extreme_columns_do_not_overflow_the_row_table() {
        let tokens = vec![
            Token::new(TokenKind::ReposAbsolute {
                col: Some(i32::MAX),
                row: None,
            }),
            Token::new(TokenKind::NewLine(1)),
            Token::character('b'),
        ];
        let rendered = render_positions(tokens).unwrap();

        let printable_only = LineWrapExt::new(1, 3).post_render(rendered.clone()).unwrap();
        assert_eq!(char_positions(&printable_only), vec![Vector2D::new(0, 1)]);

        let all = LineWrapExt {
            only_printable: false,
            ..LineWrapExt::new(1, 3)
        }
        .post_render(rendered)
        .unwrap();
        assert!(char_positions(&all).is_empty());
    }

    #[test]
    fn control_tokens_join_the_wrap_when_asked() {
        let mut tokens = tokenize("abcde", true);
        tokens.push(Token::delay(1.0));
        let rendered = render_positions(tokens).unwrap();

        let printable_only = LineWrapExt::new(5, 0).post_render(rendered.clone()).unwrap();
        assert_eq!(printable_only[5].pos(), Some(Vector2D::new(5, 0)));

        let all = LineWrapExt {
            only_printable: false,
            ..LineWrapExt::new(5, 0)
        }
        .post_render(rendered)
        .unwrap();
        assert_eq!(all[5].pos(), Some(Vector2D::new(0, 1)));
    }

    #[test]
    fn unbounded_columns_keep_positions() {
        let tokens = LineWrapExt::new(0, 0).post_render(rendered("abc")).unwrap();
        assert_eq!(char_positions(&tokens)[2], Vector2D::new(2, 0));
    }

    #[test]
    fn affine_overflow_is_an_error() {
        let region = ScreenRegion::new(Vector2D::new(4, 2), Vector2D::new(10, 3));
        let tokens = vec![Token::new(TokenKind::ReposAbsolute {
            col: Some(i32::MAX),
            row: None,
        })];
        let mut rendered = render_positions(tokens).unwrap();
        rendered.push(Token::character('x').with_pos(Vector2D::new(i32::MAX, 0)));
        assert_eq!(
            AffineTransformExt::for_region(&region).post_render(rendered),
            Err(RenderError::PositionOverflow { index: 1 })
        );
    }

    #[test]
    fn affine_places_region_output() {
        let region = ScreenRegion::new(Vector2D::new(4, 2), Vector2D::new(10, 3))
            .with_growth(Cardinal::South.vector(), Cardinal::West.vector());
        let tokens = AffineTransformExt::for_region(&region)
            .post_render(rendered("ab"))
            .unwrap();
        assert_eq!(char_positions(&tokens), vec![Vector2D::new(10, 3), Vector2D::new(10, 4)]);
    }
}
