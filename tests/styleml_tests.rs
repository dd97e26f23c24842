/// StyleML integration tests — markup to positioned, styled, timed tokens.

use mika_engine::core::layout::{AffineTransformExt, LineWrapExt};
use mika_engine::core::macros::{MacroExpander, MacroScope};
use mika_engine::core::pipeline::StyleMLPipeline;
use mika_engine::schema::geometry::{Cardinal, Vector2D};
use mika_engine::schema::region::ScreenRegion;
use mika_engine::schema::token::{plain_text, Token, TokenKind};
use mika_engine::schema::value::Value;

fn chars(tokens: &[Token]) -> Vec<(char, Vector2D, f64)> {
    tokens
        .iter()
        .filter_map(|t| Some((t.as_char()?, t.pos()?, t.post_delay())))
        .collect()
}

#[test]
fn tick_and_delay_flow_through_the_standard_pipeline() {
    let tokens = StyleMLPipeline::standard().process(r"\tick[;1]ab\delay[;2]cd").unwrap();

    assert_eq!(
        chars(&tokens),
        vec![
            ('a', Vector2D::new(0, 0), 1.0),
            ('b', Vector2D::new(1, 0), 1.0),
            ('c', Vector2D::new(2, 0), 1.0),
            ('d', Vector2D::new(3, 0), 1.0),
        ]
    );
    let delays: Vec<f64> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Delay)
        .map(Token::post_delay)
        .collect();
    assert_eq!(delays, vec![2.0]);
}

#[test]
fn escapes_print_literally() {
    let tokens = StyleMLPipeline::standard().process(r"a\\b \[c] \#1").unwrap();
    assert_eq!(plain_text(&tokens), r"a\b [c] #1");
}

#[test]
fn comments_and_indentation_are_dropped() {
    let source = "first line # narrator aside\n        second line";
    let tokens = StyleMLPipeline::standard().process(source).unwrap();
    assert_eq!(plain_text(&tokens), "first line second line");
    let second = tokens.iter().find(|t| t.as_char() == Some('s')).unwrap();
    assert_eq!(second.pos(), Some(Vector2D::new(0, 1)));
}

#[test]
fn macros_styles_and_positions_combine() {
    let tokens = StyleMLPipeline::standard()
        .process(r"\def[who=\\s\[fg=red\]Mika]hi {\!who }!")
        .unwrap();
    assert_eq!(plain_text(&tokens), "hi Mika!");

    let styled: Vec<(char, Option<Value>)> = tokens
        .iter()
        .filter_map(|t| {
            let ch = t.as_char()?;
            Some((ch, t.meta.style.as_ref().and_then(|s| s.get("fg").cloned())))
        })
        .collect();
    assert_eq!(styled[0], ('h', None));
    assert_eq!(styled[3], ('M', Some(Value::from("red"))));
    assert_eq!(styled[7], ('!', None));

    let bang = tokens.iter().find(|t| t.as_char() == Some('!')).unwrap();
    assert_eq!(bang.pos(), Some(Vector2D::new(7, 0)));
}

#[test]
fn ifelse_picks_a_branch() {
    let pipeline = StyleMLPipeline::standard();
    let yes = pipeline.process(r"\def[x=;1]\ifelse[a!x,b;1,then=YES,else=NO]").unwrap();
    assert_eq!(plain_text(&yes), "YES");
    let no = pipeline.process(r"\def[x=;2]\ifelse[a!x,b;1,then=YES,else=NO]").unwrap();
    assert_eq!(plain_text(&no), "NO");
}

#[test]
fn expanded_output_expands_to_itself() {
    let expander = MacroExpander::new();
    let source = StyleMLPipeline::standard().tokenize(r"\def[who=Mika]{\s[bold+]hi} \!who ");
    let (once, scope) = expander.expand(&source, MacroScope::default()).unwrap();
    let (twice, _) = expander.expand(&once, scope).unwrap();
    assert_eq!(once, twice);
    assert_eq!(plain_text(&twice), "hi Mika");
}

#[test]
fn region_layout_wraps_then_places() {
    let region = ScreenRegion::new(Vector2D::new(3, 2), Vector2D::new(10, 4));
    let pipeline = StyleMLPipeline::builder()
        .with_macros(MacroExpander::new())
        .extensions_standard()
        .extension(LineWrapExt::for_region(&region))
        .extension(AffineTransformExt::for_region(&region))
        .build();

    let tokens = pipeline.process("abcdefgh").unwrap();
    let positions: Vec<Vector2D> = chars(&tokens).into_iter().map(|(_, pos, _)| pos).collect();
    assert_eq!(
        positions,
        vec![
            Vector2D::new(10, 4),
            Vector2D::new(11, 4),
            Vector2D::new(12, 4),
            Vector2D::new(10, 5),
            Vector2D::new(11, 5),
            Vector2D::new(12, 5),
        ]
    );
}

#[test]
fn rotated_region_grows_downwards() {
    let region = ScreenRegion::new(Vector2D::new(4, 1), Vector2D::new(2, 0))
        .with_growth(Cardinal::South.vector(), Cardinal::West.vector());
    let pipeline = StyleMLPipeline::builder()
        .extensions_standard()
        .extension(AffineTransformExt::for_region(&region))
        .build();
    let tokens = pipeline.process("ab").unwrap();
    let positions: Vec<Vector2D> = chars(&tokens).into_iter().map(|(_, pos, _)| pos).collect();
    assert_eq!(positions, vec![Vector2D::new(2, 0), Vector2D::new(2, 1)]);
}

#[test]
fn unbalanced_scopes_fail_to_render() {
    assert!(StyleMLPipeline::standard().process("a}b").is_err());
}
