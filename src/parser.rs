use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::block::{BubbleStyle, ContentBlock, MessageRole, TextRun, runs_text};
use crate::color::Color;
use crate::dom::{MarkupNode, MarkupTree, text_content};
use crate::language;

/// Fallback paragraphs longer than this are dropped as page chrome.
const MAX_FALLBACK_TEXT: usize = 10_000;

const SKIPPED_TAGS: &[&str] = &[
    "audio", "button", "canvas", "head", "iframe", "input", "link", "meta", "noscript",
    "script", "select", "style", "svg", "template", "textarea", "title", "video",
];

const CONTAINER_TAGS: &[&str] = &[
    "article", "aside", "body", "center", "details", "div", "figure", "footer", "header",
    "html", "main", "section", "span", "summary",
];

const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "del", "dfn", "em", "font",
    "i", "ins", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub",
    "sup", "time", "u", "var",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "dd", "div", "dl", "dt",
    "fieldset", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "img", "li", "main", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Attributes that mark a chat turn, checked in order.
const ROLE_ATTRIBUTES: &[&str] = &["data-message-author-role", "data-role", "role", "data-author"];

static COPY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Copy(?: code)?[ \t]*(?:\n|$)").expect("copy prefix pattern is valid")
});

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Base for resolving relative image and link URLs.
    pub base_url: Option<Url>,
}

/// Parse raw markup into blocks.
pub fn parse_html(html: &str, options: &ParseOptions) -> Vec<ContentBlock> {
    let tree = MarkupTree::parse_html(html);
    parse_fragments(&[tree.body()], options)
}

/// Parse an ordered list of fragment roots into one block sequence.
pub fn parse_fragments<N: MarkupNode>(roots: &[N], options: &ParseOptions) -> Vec<ContentBlock> {
    let parser = ContentParser { options };
    let mut blocks = Vec::new();
    for root in roots {
        parser.process_node(*root, None, &mut blocks);
    }
    tracing::debug!(blocks = blocks.len(), fragments = roots.len(), "parsed fragments");
    blocks
}

struct ContentParser<'o> {
    options: &'o ParseOptions,
}

#[derive(Debug, Clone, Default)]
struct RunStyle {
    bold: bool,
    italic: bool,
    code: bool,
    link: Option<String>,
    color: Option<Color>,
    preserve_newlines: bool,
}

impl RunStyle {
    fn run(&self, text: String) -> TextRun {
        TextRun {
            text,
            bold: self.bold,
            italic: self.italic,
            code: self.code,
            link: self.link.clone(),
            color: self.color,
        }
    }
}

impl ContentParser<'_> {
    fn process_node<N: MarkupNode>(
        &self,
        node: N,
        role: Option<MessageRole>,
        out: &mut Vec<ContentBlock>,
    ) {
        if let Some(text) = node.text() {
            let text = collapse_whitespace(text, false);
            let text = text.trim();
            if !text.is_empty() && text.chars().count() < MAX_FALLBACK_TEXT {
                out.push(ContentBlock::paragraph(text));
            }
            return;
        }

        let Some(tag) = node.tag() else {
            self.process_children(node, role, out);
            return;
        };
        if !is_visible(&node) || SKIPPED_TAGS.contains(&tag) {
            return;
        }

        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse().unwrap_or(1);
                let runs = self.runs_of(&[node], false);
                if !runs.is_empty() {
                    out.push(ContentBlock::Heading { level, runs });
                }
            }
            "p" => {
                if node.children().iter().any(|child| child.is_element("img")) {
                    self.process_children(node, role, out);
                } else {
                    let runs = self.runs_of(&[node], false);
                    if !runs.is_empty() {
                        out.push(ContentBlock::Paragraph { runs });
                    }
                }
            }
            "pre" => out.extend(self.code_block(node)),
            "ul" | "ol" => out.extend(self.list(node, tag == "ol")),
            "img" => out.extend(self.image(node)),
            "hr" => out.push(ContentBlock::HorizontalRule),
            "br" => {}
            "blockquote" => {
                let runs = self.runs_of(&[node], false);
                if !runs.is_empty() {
                    out.push(ContentBlock::Blockquote { runs });
                }
            }
            _ if CONTAINER_TAGS.contains(&tag) || INLINE_TAGS.contains(&tag) => {
                self.container(node, role, out);
            }
            _ => self.fallback(node, out),
        }
    }

    fn container<N: MarkupNode>(
        &self,
        node: N,
        role: Option<MessageRole>,
        out: &mut Vec<ContentBlock>,
    ) {
        let marked = role_of(&node).filter(|marked| role != Some(*marked));
        let Some(marked) = marked else {
            self.process_children(node, role, out);
            return;
        };

        let mut items = Vec::new();
        self.process_children(node, Some(marked), &mut items);
        if items.is_empty() {
            return;
        }
        let bubble = match marked {
            MessageRole::User => find_bubble(node),
            MessageRole::Assistant => None,
        };
        out.push(ContentBlock::Message {
            role: marked,
            items,
            bubble,
        });
    }

    /// Recurse into children, gathering runs of inline content into
    /// paragraphs so text is not split at every `<span>`.
    fn process_children<N: MarkupNode>(
        &self,
        node: N,
        role: Option<MessageRole>,
        out: &mut Vec<ContentBlock>,
    ) {
        let mut inline: Vec<N> = Vec::new();
        for child in node.children() {
            if is_inline(&child) {
                inline.push(child);
                continue;
            }
            self.flush_inline(&mut inline, out);
            self.process_node(child, role, out);
        }
        self.flush_inline(&mut inline, out);
    }

    fn flush_inline<N: MarkupNode>(&self, group: &mut Vec<N>, out: &mut Vec<ContentBlock>) {
        if group.is_empty() {
            return;
        }
        let mut meaningful = group
            .iter()
            .copied()
            .filter(|node| node.text().is_none_or(|text| !text.trim().is_empty()));
        let lone = match (meaningful.next(), meaningful.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        };

        if let Some(only) = lone
            && only.is_element("a")
            && let Some(url) = only.attribute("href").and_then(|href| self.resolve_link(href))
        {
            let text = collapse_whitespace(&text_content(only), false).trim().to_string();
            if !text.is_empty() {
                out.push(ContentBlock::Link { text, url });
            }
            group.clear();
            return;
        }

        let runs = self.runs_of(group.as_slice(), false);
        if !runs.is_empty() {
            out.push(ContentBlock::Paragraph { runs });
        }
        group.clear();
    }

    fn fallback<N: MarkupNode>(&self, node: N, out: &mut Vec<ContentBlock>) {
        let runs = self.runs_of(&[node], false);
        let length = runs.iter().map(|run| run.text.chars().count()).sum::<usize>();
        if runs.is_empty() {
            return;
        }
        if length >= MAX_FALLBACK_TEXT {
            tracing::debug!(tag = ?node.tag(), length, "dropping oversized text node");
            return;
        }
        out.push(ContentBlock::Paragraph { runs });
    }

    fn runs_of<N: MarkupNode>(&self, nodes: &[N], exclude_lists: bool) -> Vec<TextRun> {
        let mut runs = Vec::new();
        for node in nodes {
            let parent_style = inherited_style(node);
            self.collect_runs(*node, &parent_style, exclude_lists, &mut runs);
        }
        normalize_runs(runs)
    }

    fn collect_runs<N: MarkupNode>(
        &self,
        node: N,
        style: &RunStyle,
        exclude_lists: bool,
        runs: &mut Vec<TextRun>,
    ) {
        if let Some(text) = node.text() {
            runs.push(style.run(collapse_whitespace(text, style.preserve_newlines)));
            return;
        }
        let Some(tag) = node.tag() else {
            return;
        };
        if !is_visible(&node) || SKIPPED_TAGS.contains(&tag) {
            return;
        }
        if exclude_lists && matches!(tag, "ul" | "ol") {
            return;
        }
        if tag == "br" {
            runs.push(style.run("\n".to_string()));
            return;
        }

        let mut style = style.clone();
        match tag {
            "strong" | "b" => style.bold = true,
            "em" | "i" | "cite" | "dfn" => style.italic = true,
            "code" | "kbd" | "samp" => style.code = true,
            "a" => {
                if let Some(url) = node.attribute("href").and_then(|href| self.resolve_link(href)) {
                    style.link = Some(url);
                }
            }
            _ => {}
        }
        apply_own_style(&node, &mut style);

        let is_block = BLOCK_TAGS.contains(&tag) || matches!(tag, "td" | "th" | "tr");
        for child in node.children() {
            self.collect_runs(child, &style, exclude_lists, runs);
        }
        if is_block {
            runs.push(style.run(" ".to_string()));
        }
    }

    fn code_block<N: MarkupNode>(&self, pre: N) -> Option<ContentBlock> {
        let code_element = find_element(pre, "code");

        let language = code_element
            .and_then(|code| code.attribute("class").and_then(language::from_class_hints))
            .or_else(|| {
                [code_element, Some(pre)].into_iter().flatten().find_map(|node| {
                    ["data-language", "lang", "data-lang"]
                        .iter()
                        .find_map(|attr| node.attribute(attr))
                        .map(|value| value.trim().to_ascii_lowercase())
                        .filter(|value| !value.is_empty())
                })
            })
            .or_else(|| ancestor_class_language(pre))
            .or_else(|| find_label(pre, code_element))
            .unwrap_or_default();

        let mut raw = String::new();
        code_text(code_element.unwrap_or(pre), &mut raw);
        let code = clean_code(&raw, &language);
        if code.trim().is_empty() {
            return None;
        }

        let background = [Some(pre), code_element]
            .into_iter()
            .flatten()
            .find_map(|node| node.style("background-color").as_deref().and_then(Color::parse));

        Some(ContentBlock::CodeBlock {
            code,
            language,
            background,
        })
    }

    fn list<N: MarkupNode>(&self, node: N, ordered: bool) -> Option<ContentBlock> {
        let mut items = Vec::new();
        for child in node.children() {
            if !is_visible(&child) {
                continue;
            }
            match child.tag() {
                Some("li") => {
                    let runs = self.runs_of(&[child], true);
                    if !runs.is_empty() {
                        items.push(ContentBlock::ListItem { runs });
                    }
                    for grandchild in child.children() {
                        match grandchild.tag() {
                            Some(tag @ ("ul" | "ol")) => {
                                items.extend(self.list(grandchild, tag == "ol"))
                            }
                            _ => {}
                        }
                    }
                }
                Some(tag @ ("ul" | "ol")) => items.extend(self.list(child, tag == "ol")),
                _ => {}
            }
        }
        if items.is_empty() {
            return None;
        }
        Some(ContentBlock::List { ordered, items })
    }

    fn image<N: MarkupNode>(&self, node: N) -> Option<ContentBlock> {
        let src = node
            .attribute("src")
            .or_else(|| node.attribute("data-src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())?;
        let dimension = |name: &str| {
            node.attribute(name)
                .and_then(parse_pixels)
                .or_else(|| node.style(name).as_deref().and_then(parse_pixels))
        };
        Some(ContentBlock::Image {
            src: self.resolve_src(src),
            alt: node.attribute("alt").unwrap_or_default().trim().to_string(),
            width: dimension("width"),
            height: dimension("height"),
        })
    }

    /// Absolute form of an image source; left untouched when it cannot be
    /// resolved so local paths still work.
    fn resolve_src(&self, src: &str) -> String {
        if Url::parse(src).is_ok() {
            return src.to_string();
        }
        match &self.options.base_url {
            Some(base) => base.join(src).map_or_else(|_| src.to_string(), String::from),
            None => src.to_string(),
        }
    }

    /// Absolute link target, or `None` for targets a printed page cannot follow.
    fn resolve_link(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") {
            return None;
        }
        if let Ok(url) = Url::parse(href) {
            return Some(url.into());
        }
        let base = self.options.base_url.as_ref()?;
        base.join(href).ok().map(String::from)
    }
}

fn is_visible<N: MarkupNode>(node: &N) -> bool {
    let hidden_display = node
        .style("display")
        .is_some_and(|value| value.eq_ignore_ascii_case("none"));
    let hidden_visibility = node
        .style("visibility")
        .is_some_and(|value| value.eq_ignore_ascii_case("hidden"));
    !(hidden_display || hidden_visibility)
}

fn is_inline<N: MarkupNode>(node: &N) -> bool {
    if node.text().is_some() {
        return true;
    }
    match node.tag() {
        Some(tag) => {
            INLINE_TAGS.contains(&tag) && role_of(node).is_none() && !has_block_descendant(node)
        }
        None => false,
    }
}

fn has_block_descendant<N: MarkupNode>(node: &N) -> bool {
    node.children().iter().any(|child| {
        child.tag().is_some_and(|tag| BLOCK_TAGS.contains(&tag)) || has_block_descendant(child)
    })
}

fn role_of<N: MarkupNode>(node: &N) -> Option<MessageRole> {
    ROLE_ATTRIBUTES
        .iter()
        .filter_map(|attr| node.attribute(attr))
        .find_map(MessageRole::from_marker)
}

/// A user turn's bubble colors, when its markup carries a bubble marker.
fn find_bubble<N: MarkupNode>(node: N) -> Option<BubbleStyle> {
    let marker = if node.has_class("bubble") {
        Some(node)
    } else {
        find_matching(node, &|n: &N| n.has_class("bubble"))
    }?;
    Some(BubbleStyle {
        background: marker.style("background-color").as_deref().and_then(Color::parse),
        text: marker.style("color").as_deref().and_then(Color::parse),
    })
}

fn find_matching<N: MarkupNode>(node: N, predicate: &dyn Fn(&N) -> bool) -> Option<N> {
    for child in node.children() {
        if child.tag().is_some() && predicate(&child) {
            return Some(child);
        }
        if let Some(found) = find_matching(child, predicate) {
            return Some(found);
        }
    }
    None
}

fn find_element<N: MarkupNode>(node: N, tag: &str) -> Option<N> {
    find_matching(node, &|n: &N| n.is_element(tag))
}

fn ancestor_class_language<N: MarkupNode>(pre: N) -> Option<String> {
    let mut current = Some(pre);
    for _ in 0..4 {
        let node = current?;
        if let Some(found) = node.attribute("class").and_then(language::from_class_hints) {
            return Some(found);
        }
        current = node.parent();
    }
    None
}

/// A caption inside the `<pre>` (outside the code element) or just before it.
fn find_label<N: MarkupNode>(pre: N, code: Option<N>) -> Option<String> {
    fn search<N: MarkupNode>(node: N, code: Option<N>, depth: usize) -> Option<String> {
        for child in node.children() {
            if child.tag().is_none() || code.is_some_and(|code| code.is_same(&child)) {
                continue;
            }
            let leaf = child.children().iter().all(|grandchild| grandchild.tag().is_none());
            if leaf && let Some(found) = language::from_label(&text_content(child)) {
                return Some(found);
            }
            if depth < 4
                && let Some(found) = search(child, code, depth + 1)
            {
                return Some(found);
            }
        }
        None
    }

    if let Some(found) = search(pre, code, 0) {
        return Some(found);
    }

    let parent = pre.parent()?;
    let siblings = parent.children();
    let position = siblings.iter().position(|sibling| sibling.is_same(&pre))?;
    siblings[..position]
        .iter()
        .rev()
        .find(|sibling| sibling.tag().is_some())
        .and_then(|sibling| language::from_label(&text_content(*sibling)))
}

/// Text of a code container without toolbar or copy-button chrome. Block
/// children end their line, as they would on screen.
fn code_text<N: MarkupNode>(node: N, out: &mut String) {
    if let Some(text) = node.text() {
        out.push_str(text);
        return;
    }
    let Some(tag) = node.tag() else {
        return;
    };
    let is_chrome = tag == "button"
        || node.has_class("copy")
        || node.has_class("toolbar")
        || node
            .attribute("aria-label")
            .is_some_and(|label| label.to_ascii_lowercase().contains("copy"));
    if is_chrome || SKIPPED_TAGS.contains(&tag) || !is_visible(&node) {
        return;
    }
    if tag == "br" {
        out.push('\n');
        return;
    }
    for child in node.children() {
        code_text(child, out);
    }
    if matches!(tag, "div" | "p") && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn clean_code(raw: &str, language: &str) -> String {
    let mut code = raw.replace("\r\n", "\n").replace('\t', "    ");
    for _ in 0..3 {
        let before = code.len();
        code = COPY_PREFIX.replace(&code, "").into_owned();
        code = strip_language_line(&code, language);
        if code.len() == before {
            break;
        }
    }
    let code = code.trim_start_matches('\n').trim_end();
    code.to_string()
}

fn strip_language_line(code: &str, language: &str) -> String {
    let Some((first, rest)) = code.split_once('\n') else {
        return code.to_string();
    };
    let first = first.trim();
    let is_artifact = !first.is_empty()
        && (first.eq_ignore_ascii_case(language) || language::is_known_language(first))
        && !rest.trim().is_empty();
    if is_artifact {
        rest.to_string()
    } else {
        code.to_string()
    }
}

/// Style inherited from ancestors of a run root: color and pre-wrap only.
fn inherited_style<N: MarkupNode>(node: &N) -> RunStyle {
    let mut style = RunStyle::default();
    let mut ancestors = Vec::new();
    let mut current = node.parent();
    while let Some(ancestor) = current {
        ancestors.push(ancestor);
        current = ancestor.parent();
    }
    for ancestor in ancestors.iter().rev() {
        if ancestor.tag().is_some() {
            apply_own_style(ancestor, &mut style);
        }
    }
    style
}

/// Apply a node's own resolved style on top of what it inherited. A color
/// only replaces the inherited one when it is set and not transparent.
fn apply_own_style<N: MarkupNode>(node: &N, style: &mut RunStyle) {
    if let Some(color) = node.style("color").as_deref().and_then(Color::parse) {
        style.color = Some(color);
    }
    if let Some(weight) = node.style("font-weight") {
        let weight = weight.trim();
        if weight == "bold" || weight == "bolder" || weight.parse::<u16>().is_ok_and(|w| w >= 600) {
            style.bold = true;
        }
    }
    if node.style("font-style").is_some_and(|value| value.trim() == "italic") {
        style.italic = true;
    }
    let pre_wrap = node
        .style("white-space")
        .is_some_and(|value| value.trim().starts_with("pre"))
        || node.has_class("whitespace-pre");
    if pre_wrap {
        style.preserve_newlines = true;
    }
}

fn collapse_whitespace(text: &str, preserve_newlines: bool) -> String {
    text.chars()
        .map(|ch| match ch {
            '\n' if preserve_newlines => '\n',
            c if c.is_whitespace() && c != '\u{a0}' => ' ',
            c => c,
        })
        .collect()
}

/// Merge same-style neighbours, collapse spaces across run boundaries and
/// trim the edges of the sequence.
fn normalize_runs(runs: Vec<TextRun>) -> Vec<TextRun> {
    let mut merged: Vec<TextRun> = Vec::new();
    let mut at_break = true;

    for run in runs {
        let mut text = String::with_capacity(run.text.len());
        for ch in run.text.chars() {
            match ch {
                ' ' if at_break => {}
                '\n' => {
                    trim_trailing_spaces(&mut text, &mut merged);
                    text.push('\n');
                    at_break = true;
                }
                ' ' => {
                    text.push(' ');
                    at_break = true;
                }
                c => {
                    text.push(c);
                    at_break = false;
                }
            }
        }
        if text.is_empty() {
            continue;
        }
        let continues_last = merged.last().is_some_and(|last| last.same_style(&run));
        if continues_last {
            if let Some(last) = merged.last_mut() {
                last.text.push_str(&text);
            }
        } else {
            merged.push(TextRun { text, ..run });
        }
    }

    while let Some(last) = merged.last_mut() {
        let trimmed = last.text.trim_end_matches([' ', '\n']).len();
        last.text.truncate(trimmed);
        if !last.text.is_empty() {
            break;
        }
        merged.pop();
    }
    while let Some(first) = merged.first_mut() {
        let trimmed = first.text.trim_start_matches([' ', '\n']).to_string();
        first.text = trimmed;
        if !first.text.is_empty() {
            break;
        }
        merged.remove(0);
    }
    merged.retain(|run| !run.text.is_empty());

    if runs_text(&merged).trim().is_empty() {
        return Vec::new();
    }
    merged
}

/// Drop spaces right before a line break, which may sit at the end of the
/// previous run.
fn trim_trailing_spaces(text: &mut String, merged: &mut [TextRun]) {
    if text.is_empty() {
        if let Some(last) = merged.last_mut() {
            let trimmed = last.text.trim_end_matches(' ').len();
            last.text.truncate(trimmed);
        }
    } else {
        let trimmed = text.trim_end_matches(' ').len();
        text.truncate(trimmed);
    }
}

fn parse_pixels(value: &str) -> Option<u32> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    let parsed: f64 = number.parse().ok()?;
    (parsed.is_finite() && parsed >= 1.0).then(|| parsed.round() as u32)
}
