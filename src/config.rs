use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::color::Color;
use crate::error::ExportError;

static DEFAULT_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub links: LinksConfig,
    pub page: PageConfig,
    pub font: FontConfig,
    pub code: CodeConfig,
    pub images: ImagesConfig,
    pub bubble: BubbleConfig,
    pub document: DocumentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    pub color: String,
    pub underline: bool,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            color: "#1a4f8b".to_string(),
            underline: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PageConfig {
    /// Draw "N / M" in the bottom margin once every page exists.
    pub numbers: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub body: String,
    pub mono: String,
    pub system_fonts: bool,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            body: "Libertinus Serif".to_string(),
            mono: "DejaVu Sans Mono".to_string(),
            system_fonts: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    pub background: String,
    pub highlight: bool,
    pub theme: String,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            background: "#f6f8fa".to_string(),
            highlight: true,
            theme: "InspiredGitHub".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub timeout_secs: u64,
    pub fetch_remote: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            fetch_remote: true,
        }
    }
}

impl ImagesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BubbleConfig {
    pub background: String,
    pub text: String,
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            background: "#f4f4f4".to_string(),
            text: "#0d0d0d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DocumentConfig {
    pub title: Option<String>,
}

impl Config {
    /// Load config from a TOML file, or return the compiled defaults if not found.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring invalid config: {e}");
                Self::compiled_default()
            }),
            Err(_) => Self::compiled_default(),
        }
    }

    /// Load a config file the user named explicitly. Unlike [`Config::load`],
    /// a missing or malformed file is an error.
    pub fn read(path: &Path) -> Result<Self, ExportError> {
        let content = fs::read_to_string(path).map_err(|e| ExportError::io(path, e))?;
        toml::from_str(&content).map_err(|e| ExportError::Config {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// The defaults shipped in `default_config.toml`.
    pub fn compiled_default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_default()
    }

    pub fn link_color(&self) -> Color {
        Color::parse(&self.links.color).unwrap_or(Color::LINK)
    }

    pub fn code_background(&self) -> Color {
        Color::parse(&self.code.background).unwrap_or(Color::CODE_BACKGROUND)
    }

    pub fn bubble_background(&self) -> Color {
        Color::parse(&self.bubble.background).unwrap_or(Color::BUBBLE_BACKGROUND)
    }

    pub fn bubble_text(&self) -> Color {
        Color::parse(&self.bubble.text).unwrap_or(Color::TEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compiled_default_parses() {
        let config = Config::compiled_default();
        assert!(config.page.numbers);
        assert_eq!(config.code.theme, "InspiredGitHub");
        assert_eq!(config.document.title.as_deref(), Some("Conversation"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str("[links]\nunderline = false\n").unwrap();
        assert!(!config.links.underline);
        assert_eq!(config.links.color, "#1a4f8b");
        assert_eq!(config.images.timeout_secs, 10);
    }

    #[test]
    fn missing_file_falls_back() {
        let config = Config::load(Path::new("/nonexistent/chatpdf.toml"));
        assert!(config.code.highlight);
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = Config::read(Path::new("/nonexistent/chatpdf.toml")).unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }

    #[test]
    fn bad_colors_use_builtins() {
        let config: Config = toml::from_str("[code]\nbackground = \"not a color\"\n").unwrap();
        assert_eq!(config.code_background(), Color::CODE_BACKGROUND);
    }
}
