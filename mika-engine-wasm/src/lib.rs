//! WASM bindings for mika-engine — steps the bundled hallway dialogue and
//! renders StyleML for the web demo.
//!
//! Playback timing is left to the page: every evaluation returns the cells
//! to paint together with the delay to wait after each one.

use wasm_bindgen::prelude::*;

use mika_engine::core::config::EngineConfig;
use mika_engine::core::dialogue::{DialogueError, DialogueWorld, RegionalDialogueManager};
use mika_engine::core::loader::{parse_module, CHOICE_MACROS};
use mika_engine::core::modules::resolve;
use mika_engine::core::pipeline::StyleMLPipeline;
use mika_engine::schema::cell::ScreenCell;
use mika_engine::schema::sentence::ConvField;
use mika_engine::schema::token::{Token, TokenKind};

// ---------------------------------------------------------------------------
// Embedded dialogue data — compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const CONFIG: &str = include_str!("../../resources/config.ron");
    pub const PREDEFINED_MACROS: &str = include_str!("../../resources/predefined_macros.txt");
    pub const HALLWAY: &str = include_str!("../../resources/modules/hallway.ron");
}

/// Forked flows stop after this many sentences.
const MAX_FORK_SENTENCES: usize = 64;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct PaintedCell {
    x: i32,
    y: i32,
    /// Seconds to wait after painting this cell.
    delay: f64,
    cell: ScreenCell,
}

/// Everything one evaluation paints and waits for.
#[derive(serde::Serialize)]
struct Frame {
    cells: Vec<PaintedCell>,
    /// Delays of control tokens, as `(index into cells, seconds)`.
    pauses: Vec<(usize, f64)>,
    /// Inter-sentence calls, as `(index into cells, target, sync)`.
    calls: Vec<(usize, String, bool)>,
}

#[derive(serde::Serialize)]
struct SentenceInfo {
    name: Option<String>,
    choice_amount: Option<i64>,
    pause_after: bool,
    clear_region: bool,
    uninterruptable: bool,
    region: Option<RegionInfo>,
}

#[derive(serde::Serialize)]
struct RegionInfo {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------
fn frame(tokens: &[Token]) -> Frame {
    let mut frame = Frame {
        cells: Vec::new(),
        pauses: Vec::new(),
        calls: Vec::new(),
    };
    for token in tokens {
        match (&token.kind, token.pos(), ScreenCell::from_token(token)) {
            (_, Some(pos), Some(cell)) => frame.cells.push(PaintedCell {
                x: pos.x,
                y: pos.y,
                delay: token.post_delay(),
                cell,
            }),
            (TokenKind::InterSentenceCall { is_sync, target }, _, _) => {
                frame.calls.push((frame.cells.len(), target.clone(), *is_sync));
            }
            _ if token.post_delay() > 0.0 => frame.pauses.push((frame.cells.len(), token.post_delay())),
            _ => {}
        }
    }
    frame
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

fn dialogue_error(e: DialogueError) -> JsError {
    JsError::new(&format!("Dialogue error: {e}"))
}

fn hallway_world(config: &EngineConfig) -> Result<DialogueWorld, JsError> {
    let sentences =
        parse_module("hallway", data::HALLWAY).map_err(|e| JsError::new(&format!("Module parse error: {e}")))?;
    DialogueWorld::builder()
        .tick(config.initial_tick, config.tick_multiplier)
        .max_macro_depth(config.max_macro_depth)
        .regions(config.regions.clone())
        .predefined_macros(CHOICE_MACROS)
        .predefined_macros(data::PREDEFINED_MACROS)
        .sentences(sentences)
        .build()
        .map_err(|e| JsError::new(&format!("World build error: {e}")))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Tokenize, expand and lay out a piece of StyleML. Returns a JSON frame.
#[wasm_bindgen]
pub fn render_markup(text: &str) -> Result<String, JsError> {
    let tokens = StyleMLPipeline::standard()
        .process(text)
        .map_err(|e| JsError::new(&format!("Render error: {e}")))?;
    to_json(&frame(&tokens))
}

#[wasm_bindgen]
pub struct MikaDemo {
    manager: RegionalDialogueManager,
    config: EngineConfig,
    start: String,
}

#[wasm_bindgen]
impl MikaDemo {
    /// Load the bundled hallway dialogue, positioned at its start sentence.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<MikaDemo, JsError> {
        let config =
            EngineConfig::parse_ron(data::CONFIG).map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;
        let world = hallway_world(&config)?;
        let start = config
            .start_sentence
            .clone()
            .or_else(|| world.macros().get("start_sentence").map(|v| v.to_string()))
            .ok_or_else(|| JsError::new("No start sentence"))?;
        Ok(MikaDemo {
            manager: RegionalDialogueManager::new(world, start.clone()),
            config,
            start,
        })
    }

    /// Screen size as JSON `[columns, rows]`.
    pub fn screen_size(&self) -> String {
        serde_json::to_string(&[self.config.screen_size.x, self.config.screen_size.y])
            .unwrap_or_else(|_| "[0,0]".to_string())
    }

    /// Describe the current sentence: name, choices, flags and region.
    pub fn current(&self) -> Result<String, JsError> {
        let m = &self.manager;
        let region = m.current_region().map_err(dialogue_error)?.map(|r| RegionInfo {
            x: r.origin.x,
            y: r.origin.y,
            width: r.size.x,
            height: r.size.y,
        });
        let info = SentenceInfo {
            name: m.current_name().map(str::to_string),
            choice_amount: m.choice_amount().map_err(dialogue_error)?,
            pause_after: m.current_flag(ConvField::PauseAfter).map_err(dialogue_error)?,
            clear_region: m.current_flag(ConvField::ClearRegion).map_err(dialogue_error)?,
            uninterruptable: m.current_flag(ConvField::Uninterruptable).map_err(dialogue_error)?,
            region,
        };
        to_json(&info)
    }

    /// Evaluate the current sentence with an optional highlighted choice and
    /// return the JSON frame to play.
    pub fn eval(&mut self, choice: Option<i32>) -> Result<String, JsError> {
        let tokens = self
            .manager
            .eval_sentence(choice.map(i64::from))
            .map_err(dialogue_error)?;
        to_json(&frame(&tokens))
    }

    /// Move to the next sentence. Returns false once the dialogue is over.
    pub fn next(&mut self) -> Result<bool, JsError> {
        match self.manager.next_sentence() {
            Ok(()) => Ok(true),
            Err(DialogueError::Exhausted) => Ok(false),
            Err(e) => Err(dialogue_error(e)),
        }
    }

    /// Evaluate `target` as a forked flow and return its frames until the
    /// fork runs out, for the page to play alongside the main dialogue.
    /// Relative targets are taken from the current sentence.
    pub fn intercall(&self, target: &str) -> Result<String, JsError> {
        let base = self.manager.current_name().unwrap_or_default();
        let target = resolve(base, target).map_err(|e| JsError::new(&format!("Bad call target: {e}")))?;
        let mut fork = self.manager.fork(target, None);
        let mut frames = Vec::new();
        for _ in 0..MAX_FORK_SENTENCES {
            frames.push(frame(&fork.eval_sentence(None).map_err(dialogue_error)?));
            match fork.next_sentence() {
                Ok(()) => {}
                Err(DialogueError::Exhausted) => break,
                Err(e) => return Err(dialogue_error(e)),
            }
        }
        to_json(&frames)
    }

    /// Start over with freshly loaded macros.
    pub fn reset(&mut self) -> Result<(), JsError> {
        let world = hallway_world(&self.config)?;
        self.manager = RegionalDialogueManager::new(world, self.start.clone());
        Ok(())
    }
}
