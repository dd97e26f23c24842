/// Sentences — module-addressable units of dialogue with deferred flow control.

use super::token::Token;
use crate::core::tokenizer::tokenize;

/// The deferred conv expressions a sentence carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvField {
    Region,
    Next,
    Call,
    Return,
    ChoiceAmount,
    Uninterruptable,
    PauseAfter,
    ClearRegion,
}

impl ConvField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Next => "next",
            Self::Call => "call",
            Self::Return => "return",
            Self::ChoiceAmount => "choice_amount",
            Self::Uninterruptable => "uninterruptable",
            Self::PauseAfter => "pause_after",
            Self::ClearRegion => "clear_region",
        }
    }
}

impl std::fmt::Display for ConvField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One unit of dialogue: a content template plus conv expressions that are
/// evaluated against the macro scope each time the sentence is evaluated.
/// A missing conv evaluates to nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub content: Vec<Token>,
    pub region: Option<String>,
    pub next: Option<String>,
    pub call: Option<String>,
    pub ret: Option<String>,
    pub choice_amount: Option<String>,
    pub uninterruptable: Option<String>,
    pub pause_after: Option<String>,
    pub clear_region: Option<String>,
}

impl Default for Sentence {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            region: None,
            next: None,
            call: None,
            ret: None,
            choice_amount: None,
            uninterruptable: None,
            pause_after: Some("+".to_string()),
            clear_region: None,
        }
    }
}

impl Sentence {
    /// Build a sentence from StyleML source, tokenized in full mode.
    pub fn new(content: &str) -> Self {
        Self {
            content: tokenize(content, false),
            ..Self::default()
        }
    }

    pub fn conv(&self, field: ConvField) -> Option<&str> {
        match field {
            ConvField::Region => self.region.as_deref(),
            ConvField::Next => self.next.as_deref(),
            ConvField::Call => self.call.as_deref(),
            ConvField::Return => self.ret.as_deref(),
            ConvField::ChoiceAmount => self.choice_amount.as_deref(),
            ConvField::Uninterruptable => self.uninterruptable.as_deref(),
            ConvField::PauseAfter => self.pause_after.as_deref(),
            ConvField::ClearRegion => self.clear_region.as_deref(),
        }
    }

    pub fn set_conv(&mut self, field: ConvField, conv: Option<String>) {
        let slot = match field {
            ConvField::Region => &mut self.region,
            ConvField::Next => &mut self.next,
            ConvField::Call => &mut self.call,
            ConvField::Return => &mut self.ret,
            ConvField::ChoiceAmount => &mut self.choice_amount,
            ConvField::Uninterruptable => &mut self.uninterruptable,
            ConvField::PauseAfter => &mut self.pause_after,
            ConvField::ClearRegion => &mut self.clear_region,
        };
        *slot = conv;
    }

    #[must_use]
    pub fn with_conv(mut self, field: ConvField, conv: &str) -> Self {
        self.set_conv(field, Some(conv.to_string()));
        self
    }

    /// Replace the content with StyleML source, tokenized in full mode.
    #[must_use]
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = tokenize(content, false);
        self
    }

    #[must_use]
    pub fn with_region(self, conv: &str) -> Self {
        self.with_conv(ConvField::Region, conv)
    }

    #[must_use]
    pub fn with_next(self, conv: &str) -> Self {
        self.with_conv(ConvField::Next, conv)
    }

    pub fn has_choices(&self) -> bool {
        self.choice_amount.is_some()
    }
}
