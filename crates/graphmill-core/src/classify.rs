//! Content-type classification.
//!
//! Selects the chunking strategy for a document by inspecting its filename
//! extension first, then falling back to content sniffing: a JSON parse
//! attempt, an XML shape check, and marker heuristics for markdown and code.
//! Pure and deterministic; no side effects.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Document;

/// The chunking strategy a document resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Markdown,
    Code,
    Json,
    Xml,
    PlainText,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Markdown => "markdown",
            ContentType::Code => "code",
            ContentType::Json => "json",
            ContentType::Xml => "xml",
            ContentType::PlainText => "text",
        }
    }

    /// Parse a content-type hint (e.g. from document metadata).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(ContentType::Markdown),
            "code" => Some(ContentType::Code),
            "json" => Some(ContentType::Json),
            "xml" | "html" => Some(ContentType::Xml),
            "text" | "plain" | "plaintext" | "txt" => Some(ContentType::PlainText),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known source-code file extensions.
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "java", "go", "c", "h", "cpp", "hpp", "cc", "cs", "rb",
    "php", "swift", "kt", "scala", "sh", "bash", "sql", "lua", "pl", "r",
];

static MD_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S").expect("valid regex"));
static MD_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[^*\n]+\*\*|(?m)^\s*_[^_\n]+_").expect("valid regex"));
static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]\n]+\]\([^)\n]+\)").expect("valid regex"));
static MD_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+\.)\s+\S").expect("valid regex"));
static MD_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^```").expect("valid regex"));

static CODE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub\s+)?(?:fn|function|def|class|struct|enum|impl|interface|trait)\s+\w+")
        .expect("valid regex")
});
static CODE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:import\s|use\s|from\s+\S+\s+import\s|#include\s*<)").expect("valid regex")
});
static CODE_LINE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[;{]\s*$").expect("valid regex"));

/// Classify a document into the content type its chunker expects.
///
/// Order of checks: extension table, strict JSON parse, XML shape,
/// markdown markers, code markers, then plain text.
pub fn classify(doc: &Document) -> ContentType {
    if let Some(by_ext) = classify_extension(doc.metadata.filename.as_deref()) {
        return by_ext;
    }
    classify_content(&doc.content)
}

fn classify_extension(filename: Option<&str>) -> Option<ContentType> {
    let name = filename?;
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_lowercase())?;
    match ext.as_str() {
        "md" | "markdown" => Some(ContentType::Markdown),
        "json" => Some(ContentType::Json),
        "xml" | "html" | "htm" => Some(ContentType::Xml),
        "txt" | "text" | "log" => Some(ContentType::PlainText),
        e if CODE_EXTENSIONS.contains(&e) => Some(ContentType::Code),
        _ => None,
    }
}

/// Content-only classification, used when the extension is absent or unknown.
pub fn classify_content(content: &str) -> ContentType {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return ContentType::PlainText;
    }

    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return ContentType::Json;
    }

    if trimmed.starts_with('<') && trimmed.contains('>') {
        return ContentType::Xml;
    }

    if markdown_signals(trimmed) >= 2 || MD_HEADING.is_match(trimmed) {
        return ContentType::Markdown;
    }

    if code_signals(trimmed) >= 2 {
        return ContentType::Code;
    }

    ContentType::PlainText
}

fn markdown_signals(content: &str) -> usize {
    [&*MD_HEADING, &*MD_EMPHASIS, &*MD_LINK, &*MD_LIST, &*MD_FENCE]
        .iter()
        .filter(|re| re.is_match(content))
        .count()
}

fn code_signals(content: &str) -> usize {
    let mut signals = 0;
    if CODE_DECL.is_match(content) {
        signals += 1;
    }
    if CODE_IMPORT.is_match(content) {
        signals += 1;
    }
    // Trailing semicolons / brace blocks on a meaningful share of lines.
    let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
    if lines > 0 {
        let terminated = CODE_LINE_END.find_iter(content).count();
        if terminated * 3 >= lines {
            signals += 1;
        }
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMeta;

    fn doc(filename: Option<&str>, content: &str) -> Document {
        Document::new(
            content,
            DocumentMeta {
                filename: filename.map(String::from),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_extension_wins() {
        assert_eq!(
            classify(&doc(Some("notes.md"), "no markers here")),
            ContentType::Markdown
        );
        assert_eq!(
            classify(&doc(Some("main.rs"), "plain words")),
            ContentType::Code
        );
        assert_eq!(classify(&doc(Some("data.json"), "x")), ContentType::Json);
        assert_eq!(classify(&doc(Some("page.html"), "x")), ContentType::Xml);
        assert_eq!(classify(&doc(Some("a.txt"), "x")), ContentType::PlainText);
    }

    #[test]
    fn test_json_content_sniff() {
        assert_eq!(
            classify(&doc(None, r#"  {"a": 1, "b": [2, 3]}  "#)),
            ContentType::Json
        );
    }

    #[test]
    fn test_xml_content_sniff() {
        assert_eq!(
            classify(&doc(None, "<root><item>1</item></root>")),
            ContentType::Xml
        );
    }

    #[test]
    fn test_markdown_heuristics() {
        let md = "# Title\n\nSome **bold** text and a [link](https://example.com).\n\n- item";
        assert_eq!(classify(&doc(None, md)), ContentType::Markdown);
    }

    #[test]
    fn test_code_heuristics() {
        let code = "use std::io;\n\nfn main() {\n    let x = 1;\n    println!(\"{}\", x);\n}\n";
        assert_eq!(classify(&doc(None, code)), ContentType::Code);
    }

    #[test]
    fn test_plain_text_default() {
        let text = "Just an ordinary paragraph of prose with nothing special about it.";
        assert_eq!(classify(&doc(None, text)), ContentType::PlainText);
    }

    #[test]
    fn test_hint_parse() {
        assert_eq!(ContentType::parse("Markdown"), Some(ContentType::Markdown));
        assert_eq!(ContentType::parse("weird"), None);
    }
}
