//! Code-block language hints.

const KNOWN_LANGUAGES: &[&str] = &[
    "bash", "c", "c#", "c++", "clojure", "cpp", "csharp", "css", "dart", "diff", "dockerfile",
    "elixir", "erlang", "go", "golang", "graphql", "haskell", "html", "ini", "java",
    "javascript", "js", "json", "jsx", "kotlin", "latex", "lua", "makefile", "markdown", "md",
    "nginx", "objective-c", "ocaml", "perl", "php", "plaintext", "powershell", "python", "py",
    "r", "ruby", "rust", "scala", "scss", "shell", "sh", "sql", "swift", "text", "toml", "ts",
    "tsx", "typescript", "vue", "xml", "yaml", "yml", "zsh",
];

/// Longest label text still considered a language caption.
pub const MAX_LABEL_LEN: usize = 20;

pub fn is_known_language(name: &str) -> bool {
    let name = name.trim().to_ascii_lowercase();
    KNOWN_LANGUAGES.contains(&name.as_str())
}

/// `language-rust` or `lang-rust` class tokens.
pub fn from_class_hints(class: &str) -> Option<String> {
    class.split_whitespace().find_map(|token| {
        ["language-", "lang-"]
            .iter()
            .find_map(|prefix| token.strip_prefix(prefix))
            .filter(|name| !name.is_empty())
            .map(str::to_ascii_lowercase)
    })
}

/// A short caption such as "python" shown above a code block.
pub fn from_label(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_LABEL_LEN {
        return None;
    }
    is_known_language(text).then(|| text.to_ascii_lowercase())
}
