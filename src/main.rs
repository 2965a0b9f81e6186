use std::fs;
use std::path::{Path, PathBuf};

use chatpdf::{Config, DefaultImageSource, Exporter, NoHighlight};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "chatpdf")]
#[command(about = "Convert saved chat conversations (HTML) to PDF")]
struct Cli {
    /// Input HTML files, one fragment each, in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (defaults to the first input name with .pdf or .typ extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (defaults to chatpdf.toml next to the first input)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL for relative image and link URLs (defaults to the input's directory)
    #[arg(long)]
    base_url: Option<Url>,

    /// Leave code blocks uncolored
    #[arg(long)]
    no_highlight: bool,

    /// Write the generated Typst markup instead of a PDF
    #[arg(long)]
    typst: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("chatpdf=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn input_base_url(input: &Path) -> Option<Url> {
    let dir = fs::canonicalize(input).ok()?.parent()?.to_path_buf();
    Url::from_directory_path(dir).ok()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let first = &cli.inputs[0];

    let config = match &cli.config {
        Some(path) => Config::read(path).unwrap_or_else(|e| fail(e)),
        None => Config::load(&first.with_file_name("chatpdf.toml")),
    };

    // Read input files
    let mut fragments = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        match fs::read_to_string(input) {
            Ok(content) => fragments.push(content),
            Err(e) => fail(format_args!("reading {}: {}", input.display(), e)),
        }
    }
    let fragments: Vec<&str> = fragments.iter().map(String::as_str).collect();

    let source = DefaultImageSource::new(config.images.fetch_remote);
    let mut exporter = Exporter::new(config);
    if let Some(url) = cli.base_url.clone().or_else(|| input_base_url(first)) {
        exporter = exporter.base_url(url);
    }
    if cli.no_highlight {
        exporter = exporter.highlighter(NoHighlight);
    }

    let doc = match exporter.render(&fragments, &source).await {
        Ok(doc) => doc,
        Err(e) => fail(e),
    };

    let extension = if cli.typst { "typ" } else { "pdf" };
    let output = cli
        .output
        .unwrap_or_else(|| first.with_extension(extension));

    let bytes = if cli.typst {
        exporter.to_typst(&doc).into_bytes()
    } else {
        match exporter.to_pdf(&doc) {
            Ok(export) => export.pdf,
            Err(e) => fail(e),
        }
    };

    if let Err(e) = fs::write(&output, bytes) {
        fail(format_args!("writing {}: {}", output.display(), e));
    }

    println!("Created {} ({} pages)", output.display(), doc.page_count());
}
