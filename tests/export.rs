use chatpdf::geometry::{CONTENT_HEIGHT, PAGE_BOTTOM};
use chatpdf::images::LoadError;
use chatpdf::{
    Config, ContentBlock, DrawOp, ExportError, Exporter, ImageSource, LoadedImage, MessageRole,
    NoHighlight, Progress, Stage,
};
use pretty_assertions::assert_eq;

/// Serves a 1x1 PNG for `ok.png` and fails everything else.
struct StubImages;

impl ImageSource for StubImages {
    async fn load(&self, src: &str) -> Result<LoadedImage, LoadError> {
        if src.ends_with("ok.png") {
            Ok(LoadedImage {
                png: vec![0x89, b'P', b'N', b'G'],
                width: 400,
                height: 200,
            })
        } else {
            Err(LoadError::RemoteDisabled)
        }
    }
}

fn config() -> Config {
    let mut config = Config::compiled_default();
    config.page.numbers = false;
    config.images.fetch_remote = false;
    config
}

const CONVERSATION: &str = r#"
<div data-message-author-role="user">
  <div class="bubble" style="background-color: #e8f0fe">How do I print in Python?</div>
</div>
<div data-message-author-role="assistant">
  <h2>Printing</h2>
  <p>Use the <code>print</code> function, see <a href="https://docs.python.org/3/">the docs</a>.</p>
  <pre><code class="language-python">print("hello")</code></pre>
  <ul><li>one</li><li>two<ol><li>nested</li></ol></li></ul>
  <img src="ok.png" alt="diagram">
  <img src="missing.png" alt="lost">
</div>
"#;

fn texts(doc: &chatpdf::Document) -> Vec<String> {
    doc.pages
        .iter()
        .flat_map(|page| page.ops.iter())
        .filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn conversation_renders_every_block_kind() {
    let mut exporter = Exporter::new(config()).highlighter(NoHighlight);
    let blocks = exporter.parse(&[CONVERSATION]);
    assert_eq!(blocks.len(), 2);
    assert!(matches!(
        blocks[0],
        ContentBlock::Message {
            role: MessageRole::User,
            bubble: Some(_),
            ..
        }
    ));

    let doc = exporter.render_blocks(blocks, &StubImages).await.unwrap();
    let texts = texts(&doc);
    let expected = [
        "How do I print in Python?",
        "Printing",
        "print(\"hello\")",
        "-",
        "1.",
        "nested",
        "[Image: lost]",
    ];
    for expected in expected {
        assert!(texts.iter().any(|t| t == expected), "missing {expected:?} in {texts:?}");
    }
    assert_eq!(doc.images.len(), 1);

    let links: Vec<_> = doc.links().collect();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "https://docs.python.org/3/");
    assert_eq!(links[0].page, 1);
}

#[tokio::test]
async fn typst_output_contains_pages_and_links() {
    let mut exporter = Exporter::new(config());
    let doc = exporter.render(&[CONVERSATION], &StubImages).await.unwrap();
    let markup = exporter.to_typst(&doc);
    assert!(markup.contains("#set page(width: 210.000mm, height: 297.000mm, margin: 0mm)"));
    assert!(markup.contains("link(\"https://docs.python.org/3/\""));
    assert!(markup.contains("#let image-0 = bytes(("));
}

#[tokio::test]
async fn empty_input_is_nothing_to_export() {
    let mut exporter = Exporter::new(config());
    let err = exporter
        .render(&["<div style=\"display:none\"><p>hidden</p></div>", "   "], &StubImages)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NothingToExport));
}

#[tokio::test]
async fn long_conversation_stays_inside_the_pages() {
    let paragraph = "<p>Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
        tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam.</p>";
    let code: String = (0..80).map(|i| format!("let value_{i} = compute({i});\n")).collect();
    let html = format!(
        "<div data-message-author-role=\"assistant\">{}<h3>Code</h3>\
         <pre><code class=\"language-rust\">{code}</code></pre>{}</div>",
        paragraph.repeat(20),
        paragraph.repeat(10)
    );

    let mut exporter = Exporter::new(config()).highlighter(NoHighlight);
    let doc = exporter.render(&[html.as_str()], &StubImages).await.unwrap();
    assert!(doc.page_count() >= 3);

    for page in &doc.pages {
        for op in &page.ops {
            if let DrawOp::Text { y, line_height, .. } = op {
                assert!(y + line_height <= PAGE_BOTTOM + 1e-6, "text below the margin at {y}");
            }
        }
    }

    let code_lines = texts(&doc)
        .into_iter()
        .filter(|t| t.starts_with("let value_"))
        .count();
    assert_eq!(code_lines, 80);
}

#[tokio::test]
async fn progress_moves_through_every_stage() {
    let mut events: Vec<Progress> = Vec::new();
    let mut sink = |progress: Progress| events.push(progress);
    {
        let mut exporter = Exporter::new(config()).on_progress(&mut sink);
        exporter
            .render(&["<p>one</p>", "<p><img src=\"ok.png\"></p>"], &StubImages)
            .await
            .unwrap();
    }

    let mut stages: Vec<Stage> = events.iter().map(|event| event.stage).collect();
    stages.dedup();
    assert_eq!(
        stages,
        vec![Stage::Parsing, Stage::LoadingImages, Stage::Rendering, Stage::Links]
    );
    let last_render = events.iter().rev().find(|event| event.stage == Stage::Rendering).unwrap();
    assert_eq!(last_render.completed, last_render.total);
}

#[tokio::test]
async fn placements_follow_document_order() {
    let html = "<h1>Title</h1><p>first</p><p>second</p>";
    let mut exporter = Exporter::new(config());
    let doc = exporter.render(&[html], &StubImages).await.unwrap();
    let indices: Vec<usize> = doc.placements.iter().map(|p| p.block_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    for pair in doc.placements.windows(2) {
        assert!(pair[0].end_y <= pair[1].start_y + 1e-6);
        assert!(pair[1].start_y - pair[0].start_y < CONTENT_HEIGHT);
    }
}

#[tokio::test]
async fn pdf_is_produced() {
    let output = chatpdf::html_to_pdf(
        &["<div data-message-author-role=\"user\"><p>Hi</p></div>\
           <p>See <a href=\"https://example.com\">this</a>.</p>"],
        &config(),
    )
    .await
    .unwrap();
    assert!(output.pdf.starts_with(b"%PDF"));
    assert_eq!(output.page_count, 1);
    assert_eq!(output.links.len(), 1);
}
