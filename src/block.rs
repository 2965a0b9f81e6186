use crate::color::Color;

/// A styled span of text. The style is fixed when the parser produces it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: Option<String>,
    pub color: Option<Color>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// True when `other` would render identically apart from its text.
    pub fn same_style(&self, other: &TextRun) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.code == other.code
            && self.link == other.link
            && self.color == other.color
    }
}

/// Concatenated text of a run list, as wrapped by the measurer.
pub fn runs_text(runs: &[TextRun]) -> String {
    runs.iter().map(|run| run.text.as_str()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn from_marker(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Some(Self::User),
            "assistant" | "ai" | "model" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Colors snapshotted from a recognizable user bubble. `background: None`
/// means the marker was present without an inline color; the renderer fills
/// in the configured default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BubbleStyle {
    pub background: Option<Color>,
    pub text: Option<Color>,
}

/// One layout unit, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Paragraph {
        runs: Vec<TextRun>,
    },
    Heading {
        level: u8,
        runs: Vec<TextRun>,
    },
    CodeBlock {
        code: String,
        /// Empty when no language could be resolved; disables highlighting.
        language: String,
        background: Option<Color>,
    },
    List {
        ordered: bool,
        items: Vec<ContentBlock>,
    },
    ListItem {
        runs: Vec<TextRun>,
    },
    Image {
        src: String,
        alt: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    Link {
        text: String,
        url: String,
    },
    Blockquote {
        runs: Vec<TextRun>,
    },
    HorizontalRule,
    Message {
        role: MessageRole,
        items: Vec<ContentBlock>,
        bubble: Option<BubbleStyle>,
    },
}

impl ContentBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentBlock::Paragraph {
            runs: vec![TextRun::plain(text)],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Paragraph { .. } => "paragraph",
            ContentBlock::Heading { .. } => "heading",
            ContentBlock::CodeBlock { .. } => "code-block",
            ContentBlock::List { .. } => "list",
            ContentBlock::ListItem { .. } => "list-item",
            ContentBlock::Image { .. } => "image",
            ContentBlock::Link { .. } => "link",
            ContentBlock::Blockquote { .. } => "blockquote",
            ContentBlock::HorizontalRule => "horizontal-rule",
            ContentBlock::Message {
                role: MessageRole::User,
                ..
            } => "user-message",
            ContentBlock::Message {
                role: MessageRole::Assistant,
                ..
            } => "assistant-message",
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, ContentBlock::Heading { .. })
    }

    /// Visit this block and every nested block, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ContentBlock)) {
        visit(self);
        if let ContentBlock::List { items, .. } | ContentBlock::Message { items, .. } = self {
            for item in items {
                item.walk(visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_visits_nested_items_in_order() {
        let block = ContentBlock::Message {
            role: MessageRole::Assistant,
            items: vec![
                ContentBlock::paragraph("a"),
                ContentBlock::List {
                    ordered: false,
                    items: vec![ContentBlock::ListItem {
                        runs: vec![TextRun::plain("b")],
                    }],
                },
            ],
            bubble: None,
        };
        let mut kinds = Vec::new();
        block.walk(&mut |b| kinds.push(b.kind()));
        assert_eq!(
            kinds,
            ["assistant-message", "paragraph", "list", "list-item"]
        );
    }

    #[test]
    fn role_markers() {
        assert_eq!(MessageRole::from_marker(" User "), Some(MessageRole::User));
        assert_eq!(
            MessageRole::from_marker("assistant"),
            Some(MessageRole::Assistant)
        );
        assert_eq!(MessageRole::from_marker("tool"), None);
    }
}
