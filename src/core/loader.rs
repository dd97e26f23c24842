/// Dialogue loader — expands paragraph templates written in RON into the flat
/// sentence map a dialogue world is built from.
///
/// A module file maps paragraph names to paragraphs:
///
/// ```ron
/// {
///     "hall": (
///         c: "A long hallway.",
///         region: "=speech",
///         next: "=.door",
///     ),
///     "door": (
///         c: "Open it?",
///         ch: [
///             (key: "Yes", p: Say("It creaks open.")),
///             (key: "No", p: Para((c: "You wait.", pause: "-"))),
///         ],
///     ),
/// }
/// ```
///
/// Paragraph `p` of module `m` becomes sentence `m.p`. Templates add child
/// sentences below it: `st` plays a sequence, `ch` offers choices,
/// `criteria` with `on_true`/`on_false` branches on a macro, `call_to`
/// calls another paragraph as a subroutine, `alias` adds a second name that
/// jumps here, `imm` makes the paragraph uninterruptable and pause-free, and
/// `sub` nests named paragraphs.
///
/// Conv expressions are relative to the sentence that owns them, so `next:
/// "=.x"` names a sibling. When a template hands its `next` down to child
/// sentences one level deeper it adds a dot to keep the same target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ron::extensions::Extensions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::core::dialogue::{DialogueError, DialogueWorld};
use crate::core::modules::{join, resolve, walk_modules, PathError};
use crate::schema::sentence::{ConvField, Sentence};

/// Markers the choice template draws with. Redefine them after loading to
/// restyle choices.
pub const CHOICE_MACROS: &str = r"\def[choiceanim=]
\def[chosen=\s[hlit+]>]
\def[unchosen=-]
\def[disabledchosen=\s[fg=grey]x]
";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dialogue module '{module}': {source}")]
    Ron {
        module: String,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("module path error: {0}")]
    Path(#[from] PathError),
    #[error("paragraph '{name}': {reason}")]
    InvalidParagraph { name: String, reason: String },
    #[error("dialogue error: {0}")]
    Dialogue(#[from] DialogueError),
    #[error("no start sentence configured or defined as a macro")]
    NoStartSentence,
}

/// Conv expressions shared by a paragraph and the `default` of a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConvs {
    pub region: Option<String>,
    pub next: Option<String>,
    pub call: Option<String>,
    pub ret: Option<String>,
    pub uninterruptable: Option<String>,
    pub pause: Option<String>,
    pub clear: Option<String>,
}

impl RawConvs {
    /// Fill unset fields from `fallback`.
    fn or(self, fallback: &RawConvs) -> RawConvs {
        RawConvs {
            region: self.region.or_else(|| fallback.region.clone()),
            next: self.next.or_else(|| fallback.next.clone()),
            call: self.call.or_else(|| fallback.call.clone()),
            ret: self.ret.or_else(|| fallback.ret.clone()),
            uninterruptable: self.uninterruptable.or_else(|| fallback.uninterruptable.clone()),
            pause: self.pause.or_else(|| fallback.pause.clone()),
            clear: self.clear.or_else(|| fallback.clear.clone()),
        }
    }

    fn apply(&self, mut sentence: Sentence) -> Sentence {
        let fields = [
            (ConvField::Region, &self.region),
            (ConvField::Next, &self.next),
            (ConvField::Call, &self.call),
            (ConvField::Return, &self.ret),
            (ConvField::Uninterruptable, &self.uninterruptable),
            (ConvField::PauseAfter, &self.pause),
            (ConvField::ClearRegion, &self.clear),
        ];
        for (field, conv) in fields {
            if let Some(conv) = conv {
                sentence.set_conv(field, Some(conv.clone()));
            }
        }
        sentence
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawParagraph {
    /// StyleML content.
    pub c: String,
    pub region: Option<String>,
    pub next: Option<String>,
    pub call: Option<String>,
    pub ret: Option<String>,
    pub uninterruptable: Option<String>,
    pub pause: Option<String>,
    pub clear: Option<String>,
    pub imm: bool,
    /// Conv defaults for the entries of `st`.
    pub default: Option<RawConvs>,
    pub st: Vec<RawEntry>,
    pub ch: Vec<RawChoice>,
    pub criteria: Option<String>,
    pub on_true: Option<Box<RawEntry>>,
    pub on_false: Option<Box<RawEntry>>,
    pub alias: Option<String>,
    pub call_to: Option<String>,
    pub sub: BTreeMap<String, RawParagraph>,
}

/// A sequence entry or a branch/choice target: bare content or a full paragraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawEntry {
    Say(String),
    Para(RawParagraph),
}

impl RawEntry {
    fn into_paragraph(self) -> RawParagraph {
        match self {
            RawEntry::Say(c) => RawParagraph {
                c,
                ..RawParagraph::default()
            },
            RawEntry::Para(p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawChoice {
    pub key: String,
    pub p: RawEntry,
    /// Macro that must be true for the choice to be taken.
    #[serde(default)]
    pub criteria: Option<String>,
}

impl RawParagraph {
    fn convs(&self) -> RawConvs {
        RawConvs {
            region: self.region.clone(),
            next: self.next.clone(),
            call: self.call.clone(),
            ret: self.ret.clone(),
            uninterruptable: self.uninterruptable.clone(),
            pause: self.pause.clone(),
            clear: self.clear.clone(),
        }
    }
}

/// Re-express a `next` conv for a sentence one level below its owner.
fn descend(conv: Option<&str>) -> Option<String> {
    conv.map(|conv| match conv.strip_prefix("=.") {
        Some(rest) => format!("=..{rest}"),
        None => conv.to_string(),
    })
}

fn invalid(name: &str, reason: &str) -> LoadError {
    LoadError::InvalidParagraph {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn silent(next: &str) -> Sentence {
    Sentence::new("")
        .with_next(next)
        .with_conv(ConvField::Uninterruptable, "+")
        .with_conv(ConvField::PauseAfter, "-")
}

struct Expansion {
    sentences: BTreeMap<String, Sentence>,
}

impl Expansion {
    fn insert(&mut self, name: String, sentence: Sentence) {
        if self.sentences.insert(name.clone(), sentence).is_some() {
            tracing::warn!(sentence = %name, "sentence defined twice, keeping the later one");
        }
    }

    /// Expand paragraph `raw` named `name`. `inherited` holds conv defaults
    /// handed down by the enclosing template.
    fn paragraph(&mut self, name: &str, raw: RawParagraph, inherited: &RawConvs) -> Result<(), LoadError> {
        let convs = raw.convs().or(inherited);
        let templates = [!raw.st.is_empty(), !raw.ch.is_empty(), raw.criteria.is_some(), raw.call_to.is_some()];
        if templates.iter().filter(|t| **t).count() > 1 {
            return Err(invalid(name, "st, ch, criteria and call_to are mutually exclusive"));
        }

        for (key, sub) in raw.sub {
            self.paragraph(&join(name, &key), sub, &RawConvs::default())?;
        }
        if let Some(alias) = &raw.alias {
            self.insert(resolve(name, alias)?, silent(&format!("={name}")));
        }

        let mut sentence = if !raw.st.is_empty() {
            self.sequence(name, raw.c, raw.st, raw.default.unwrap_or_default(), convs)?
        } else if !raw.ch.is_empty() {
            self.choice(name, raw.c, raw.ch, convs)?
        } else if let Some(criteria) = raw.criteria {
            let (Some(on_true), Some(on_false)) = (raw.on_true, raw.on_false) else {
                return Err(invalid(name, "criteria needs both on_true and on_false"));
            };
            self.branch(name, &criteria, *on_true, *on_false, convs)?
        } else if let Some(target) = raw.call_to {
            self.call(name, raw.c, &target, convs)?
        } else {
            convs.apply(Sentence::new(&raw.c))
        };

        if raw.imm {
            sentence = sentence
                .with_conv(ConvField::Uninterruptable, "+")
                .with_conv(ConvField::PauseAfter, "-");
        }
        self.insert(name.to_string(), sentence);
        Ok(())
    }

    /// `name.0 .. name.{n-1}` play in order, then the silent `name.{n}`
    /// continues with the paragraph's own `next` and `ret`.
    fn sequence(
        &mut self,
        name: &str,
        content: String,
        entries: Vec<RawEntry>,
        default: RawConvs,
        convs: RawConvs,
    ) -> Result<Sentence, LoadError> {
        let count = entries.len();
        let default = default.or(&RawConvs {
            region: convs.region.clone(),
            ..RawConvs::default()
        });
        for (i, entry) in entries.into_iter().enumerate() {
            let inherited = RawConvs {
                next: Some(format!("={}", join(name, &(i + 1).to_string()))),
                ..default.clone()
            };
            self.paragraph(&join(name, &i.to_string()), entry.into_paragraph(), &inherited)?;
        }

        let end = silent(descend(convs.next.as_deref()).as_deref().unwrap_or("?"))
            .with_conv(ConvField::Return, convs.ret.as_deref().unwrap_or("-"));
        self.insert(join(name, &count.to_string()), end);

        let mut head = RawConvs {
            next: Some(format!("={}", join(name, "0"))),
            call: None,
            ret: None,
            uninterruptable: Some("+".to_string()),
            pause: Some("-".to_string()),
            ..convs
        }
        .apply(Sentence::new(&content));
        if content.is_empty() {
            head.set_conv(ConvField::Region, None);
        }
        Ok(head)
    }

    /// One row per choice, highlighted by the `.choice` macro. Choice `i`
    /// leads to `name.i`; choosing a row whose criteria fails, or confirming
    /// without a choice, stays on the paragraph.
    fn choice(&mut self, name: &str, content: String, choices: Vec<RawChoice>, convs: RawConvs) -> Result<Sentence, LoadError> {
        let inherited = RawConvs {
            region: convs.region.clone(),
            next: descend(convs.next.as_deref()),
            ..RawConvs::default()
        };
        let mut text = format!("\\!choiceanim {content}\n");
        let amount = choices.len();
        for (i, choice) in choices.into_iter().enumerate() {
            let child = join(name, &i.to_string());
            text.push('{');
            match &choice.criteria {
                Some(criteria) => text.push_str(&format!(
                    "\\def[.checkcriteria=\\ifelse[a!{criteria},b-,then=\\def[.target={name}]\\!disabledchosen ,else=\\!chosen ]]"
                )),
                None => text.push_str("\\def[.checkcriteria=\\!chosen ]"),
            }
            text.push_str(&format!(
                "\\ifelse[a!.choice,b;{i},then=\\def[.target={child}]\\!.checkcriteria ,else=\\!unchosen ] {}}}\n",
                choice.key
            ));
            self.paragraph(&child, choice.p.into_paragraph(), &inherited)?;
        }
        text.push_str(&format!("\\ifelse[a!.choice,b?,then=\\def[.target={name}]]"));

        Ok(RawConvs {
            next: Some("!.target".to_string()),
            call: Some("-".to_string()),
            ret: Some("-".to_string()),
            ..convs
        }
        .apply(Sentence::new(&text))
        .with_conv(ConvField::ChoiceAmount, &format!(";{amount}")))
    }

    /// Silently jumps to `name.t` when the `criteria` macro is true and to
    /// `name.f` otherwise.
    fn branch(
        &mut self,
        name: &str,
        criteria: &str,
        on_true: RawEntry,
        on_false: RawEntry,
        convs: RawConvs,
    ) -> Result<Sentence, LoadError> {
        let inherited = RawConvs {
            region: convs.region.clone(),
            next: descend(convs.next.as_deref()),
            ..RawConvs::default()
        };
        let (t, f) = (join(name, "t"), join(name, "f"));
        self.paragraph(&t, on_true.into_paragraph(), &inherited)?;
        self.paragraph(&f, on_false.into_paragraph(), &inherited)?;

        let content = format!("\\ifelse[a!{criteria},b+,then=\\def[.target={t}],else=\\def[.target={f}]]");
        Ok(silent("!.target").with_conv(ConvField::Call, "-").with_conv(ConvField::Return, "-").with_content(&content))
    }

    /// Plays the paragraph, then calls `target` through the silent
    /// `name.call`, which continues with the paragraph's `next` once the
    /// callee returns.
    fn call(&mut self, name: &str, content: String, target: &str, convs: RawConvs) -> Result<Sentence, LoadError> {
        if convs.ret.as_deref().is_some_and(|r| r != "-") {
            return Err(invalid(name, "a paragraph with call_to cannot return"));
        }
        let target = resolve(name, target)?;
        let caller = join(name, "call");
        let flag = format!("{name}._calling");
        let after = descend(convs.next.as_deref()).unwrap_or_else(|| "?".to_string());

        let dispatch = format!(
            "\\ifelse[a^{flag},b+,then=\\undef[{flag}]\\def[.target{after}],else=\\def[{flag}+]\\def[.target={target}]]"
        );
        let sentence = silent("!.target")
            .with_conv(ConvField::Call, &format!("^{flag}"))
            .with_content(&dispatch);
        self.insert(caller.clone(), sentence);

        Ok(RawConvs {
            next: Some(format!("={caller}")),
            call: None,
            ..convs
        }
        .apply(Sentence::new(&content)))
    }
}

/// Expand the paragraphs of one module source.
pub fn parse_module(module: &str, source: &str) -> Result<BTreeMap<String, Sentence>, LoadError> {
    let paragraphs: BTreeMap<String, RawParagraph> = ron::Options::default()
        .with_default_extension(Extensions::IMPLICIT_SOME)
        .from_str(source)
        .map_err(|source| LoadError::Ron {
            module: module.to_string(),
            source,
        })?;

    let mut expansion = Expansion {
        sentences: BTreeMap::new(),
    };
    for (key, paragraph) in paragraphs {
        expansion.paragraph(&join(module, &key), paragraph, &RawConvs::default())?;
    }
    tracing::debug!(module, sentences = expansion.sentences.len(), "module expanded");
    Ok(expansion.sentences)
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_module(module: &str, path: &Path) -> Result<BTreeMap<String, Sentence>, LoadError> {
    parse_module(module, &read(path)?)
}

/// Load every `.ron` file below `root` as a module named after its path.
pub fn load_modules_dir(root: &Path, root_package: &str) -> Result<BTreeMap<String, Sentence>, LoadError> {
    let mut sentences = BTreeMap::new();
    for (module, path) in walk_modules(root, root_package)? {
        if path.extension().and_then(|e| e.to_str()) != Some("ron") {
            tracing::debug!(path = %path.display(), "skipping non-module file");
            continue;
        }
        sentences.extend(load_module(&module, &path)?);
    }
    Ok(sentences)
}

/// Assemble the world described by `config`. Relative paths in the config
/// are taken from `base_dir`.
pub fn load_world(config: &EngineConfig, base_dir: &Path) -> Result<DialogueWorld, LoadError> {
    let mut builder = DialogueWorld::builder()
        .tick(config.initial_tick, config.tick_multiplier)
        .max_macro_depth(config.max_macro_depth)
        .regions(config.regions.clone())
        .predefined_macros(CHOICE_MACROS);
    if let Some(file) = &config.predefined_macros_file {
        builder = builder.predefined_macros(read(&base_dir.join(file))?);
    }
    if let Some(source) = &config.predefined_macros {
        builder = builder.predefined_macros(source.clone());
    }
    if let Some(root) = &config.modules_root {
        builder = builder.sentences(load_modules_dir(&base_dir.join(root), &config.root_package)?);
    }
    Ok(builder.build()?)
}

/// The configured start sentence, or the `start_sentence` macro.
pub fn start_sentence(config: &EngineConfig, world: &DialogueWorld) -> Result<String, LoadError> {
    config
        .start_sentence
        .clone()
        .or_else(|| world.macros().get("start_sentence").map(|v| v.to_string()))
        .ok_or(LoadError::NoStartSentence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dialogue::RegionalDialogueManager;
    use crate::schema::geometry::Vector2D;
    use crate::schema::region::ScreenRegion;
    use crate::schema::token::plain_text;
    use crate::schema::value::Value;

    fn world(source: &str) -> DialogueWorld {
        DialogueWorld::builder()
            .predefined_macros(CHOICE_MACROS)
            .region("speech", ScreenRegion::new(Vector2D::new(20, 4), Vector2D::ZERO))
            .sentences(parse_module("m", source).unwrap())
            .build()
            .unwrap()
    }

    /// Follow the graph from `start`, evaluating with no choice, and collect
    /// the visible text of each sentence that rendered something.
    fn walk(world: &DialogueWorld, start: &str, limit: usize) -> Vec<String> {
        let mut manager = RegionalDialogueManager::new(world.clone(), start);
        let mut seen = Vec::new();
        for _ in 0..limit {
            let text = plain_text(&manager.eval_sentence(None).unwrap());
            if !text.is_empty() {
                seen.push(text);
            }
            if manager.next_sentence().is_err() {
                break;
            }
        }
        seen
    }

    #[test]
    fn plain_paragraphs_keep_their_convs() {
        let sentences = parse_module("m", r#"{"a": (c: "hello", region: "=speech", next: "=.b", pause: "-")}"#).unwrap();
        let a = &sentences["m.a"];
        assert_eq!(a.conv(ConvField::Next), Some("=.b"));
        assert_eq!(a.conv(ConvField::PauseAfter), Some("-"));
        assert_eq!(plain_text(&a.content), "hello");
    }

    #[test]
    fn sequence_plays_entries_then_continues() {
        let world = world(
            r#"{
                "a": (region: "=speech", next: "=.b", st: [Say("one"), Para((c: "two", pause: "-")), Say("three")]),
                "b": (c: "after", region: "=speech"),
            }"#,
        );
        assert!(world.has_sentence("m.a.0"));
        assert!(world.has_sentence("m.a.3"));
        assert_eq!(walk(&world, "m.a", 10), vec!["one", "two", "three", "after"]);
    }

    #[test]
    fn sequence_default_applies_to_entries() {
        let sentences = parse_module(
            "m",
            r#"{"a": (default: (pause: "-", clear: "+"), region: "=speech", st: [Say("x"), Para((c: "y", clear: "-"))])}"#,
        )
        .unwrap();
        assert_eq!(sentences["m.a.0"].conv(ConvField::ClearRegion), Some("+"));
        assert_eq!(sentences["m.a.0"].conv(ConvField::Region), Some("=speech"));
        assert_eq!(sentences["m.a.1"].conv(ConvField::ClearRegion), Some("-"));
        assert_eq!(sentences["m.a.1"].conv(ConvField::Next), Some("=m.a.2"));
    }

    #[test]
    fn choice_highlights_and_leads_to_children() {
        let world = world(
            r#"{
                "ask": (c: "Go?", region: "=speech", next: "=.end", ch: [
                    (key: "Yes", p: Say("going")),
                    (key: "No", p: Say("staying")),
                ]),
                "end": (c: "done", region: "=speech"),
            }"#,
        );
        let mut manager = RegionalDialogueManager::new(world.clone(), "m.ask");
        assert_eq!(manager.choice_amount().unwrap(), Some(2));

        let rows = plain_text(&manager.eval_sentence(None).unwrap());
        assert_eq!(rows, "Go?\n- Yes\n- No\n".replace('\n', ""));
        assert_eq!(manager.staged_next(), Some("m.ask"));

        let rows = plain_text(&manager.eval_sentence(Some(1)).unwrap());
        assert_eq!(rows, "Go?- Yes> No");
        assert_eq!(manager.staged_next(), Some("m.ask.1"));

        manager.next_sentence().unwrap();
        assert_eq!(walk(&world, "m.ask.1", 5), vec!["staying", "done"]);
    }

    #[test]
    fn choice_criteria_can_block_a_row() {
        let world = world(
            r#"{
                "ask": (c: "Door", region: "=speech", ch: [
                    (key: "Unlock", p: Say("click"), criteria: "has_key"),
                ]),
            }"#,
        );
        world.macros().insert("has_key", Value::Bool(false));
        let mut manager = RegionalDialogueManager::new(world.clone(), "m.ask");
        let rows = plain_text(&manager.eval_sentence(Some(0)).unwrap());
        assert_eq!(rows, "Doorx Unlock");
        assert_eq!(manager.staged_next(), Some("m.ask"));

        world.macros().insert("has_key", Value::Bool(true));
        manager.eval_sentence(Some(0)).unwrap();
        assert_eq!(manager.staged_next(), Some("m.ask.0"));
    }

    #[test]
    fn branch_follows_the_criteria() {
        let source = r#"{
            "gate": (region: "=speech", next: "=.end", criteria: "open",
                on_true: Say("through"), on_false: Say("blocked")),
            "end": (c: "end", region: "=speech"),
        }"#;
        let closed = world(source);
        assert_eq!(walk(&closed, "m.gate", 5), vec!["blocked", "end"]);

        let open = world(source);
        open.macros().insert("open", Value::Bool(true));
        assert_eq!(walk(&open, "m.gate", 5), vec!["through", "end"]);
    }

    #[test]
    fn call_to_returns_to_the_caller() {
        let world = world(
            r#"{
                "main": (c: "before", region: "=speech", next: "=.after", call_to: ".helper"),
                "helper": (c: "helping", region: "=speech", ret: "+"),
                "after": (c: "after", region: "=speech"),
            }"#,
        );
        assert_eq!(walk(&world, "m.main", 10), vec!["before", "helping", "after"]);
    }

    #[test]
    fn alias_jumps_to_the_paragraph() {
        let world = world(r#"{"real": (c: "here", region: "=speech", alias: ".other")}"#);
        assert!(world.has_sentence("m.other"));
        assert_eq!(walk(&world, "m.other", 3), vec!["here"]);
    }

    #[test]
    fn nested_sub_paragraphs_get_dotted_names() {
        let sentences = parse_module("m", r#"{"a": (c: "x", sub: {"b": (c: "y", imm: true)})}"#).unwrap();
        let b = &sentences["m.a.b"];
        assert_eq!(b.conv(ConvField::PauseAfter), Some("-"));
        assert_eq!(b.conv(ConvField::Uninterruptable), Some("+"));
    }

    #[test]
    fn conflicting_templates_are_rejected() {
        let err = parse_module("m", r#"{"a": (st: [Say("x")], criteria: "c", on_true: Say("t"), on_false: Say("f"))}"#);
        assert!(matches!(err, Err(LoadError::InvalidParagraph { .. })));
        let err = parse_module("m", r#"{"a": (criteria: "c", on_true: Say("t"))}"#);
        assert!(matches!(err, Err(LoadError::InvalidParagraph { .. })));
    }

    #[test]
    fn malformed_ron_names_the_module() {
        let err = parse_module("broken", r#"{"a": (c: 3)}"#).unwrap_err();
        assert!(matches!(&err, LoadError::Ron { module, .. } if module == "broken"));
    }

    #[test]
    fn modules_dir_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("town")).unwrap();
        std::fs::write(dir.path().join("town/inn.ron"), r#"{"hello": (c: "hi")}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a module").unwrap();
        let sentences = load_modules_dir(dir.path(), "game").unwrap();
        assert_eq!(sentences.keys().map(String::as_str).collect::<Vec<_>>(), vec!["game.town.inn.hello"]);
    }
}
