//! Rendering converted Markdown into the requested output format.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::BackendError;
use super::types::OutputFormat;

/// Converted content ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    pub content: String,
    pub media_type: &'static str,
}

/// Render `markdown` as `format`. `source_file` ends up in JSON metadata.
pub fn render(
    markdown: &str,
    format: OutputFormat,
    source_file: &str,
) -> Result<RenderedOutput, BackendError> {
    let content = match format {
        OutputFormat::Markdown => markdown.to_string(),
        OutputFormat::Text => strip_markdown(markdown),
        OutputFormat::Json => {
            let document = parse_structure(markdown, source_file);
            serde_json::to_string_pretty(&document).map_err(|e| {
                BackendError::internal(format!("failed to serialize document: {}", e))
            })?
        }
    };
    // Markup-only input can strip down to nothing.
    if content.trim().is_empty() {
        return Err(BackendError::EmptyResult);
    }
    Ok(RenderedOutput {
        content,
        media_type: format.media_type(),
    })
}

// (pattern, replacement) pairs applied in order.
static STRIP_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?s)```[^\n]*\n(.*?)```", "${1}"),
        (r"`([^`\n]+)`", "${1}"),
        (r"!\[([^\]]*)\]\([^)]*\)", "${1}"),
        (r"\[([^\]]+)\]\([^)]*\)", "${1}"),
        (r"(?m)^#{1,6}\s+", ""),
        (r"\*\*([^*\n]+)\*\*", "${1}"),
        (r"__([^_\n]+)__", "${1}"),
        (r"\*([^*\n]+)\*", "${1}"),
        (r"\b_([^_\n]+)_\b", "${1}"),
        (r"(?m)^>\s?", ""),
        (r"(?m)^[ \t]*([-*_][ \t]*){3,}$", ""),
        (r"(?m)^[ \t]*[-*+][ \t]+", ""),
        (r"(?m)^[ \t]*\d+\.[ \t]+", ""),
        (r"\n{3,}", "\n\n"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Remove Markdown syntax and keep the readable text.
pub fn strip_markdown(markdown: &str) -> String {
    let mut text = markdown.replace("\r\n", "\n");
    for (pattern, replacement) in STRIP_RULES.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Heading,
    Paragraph,
    ListItem,
    Blockquote,
    CodeBlock,
    HorizontalRule,
    TableCell,
    Image,
    Link,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl DocumentElement {
    fn new(kind: ElementKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            level: None,
            attributes: BTreeMap::new(),
        }
    }

    fn with_url(mut self, url: &str) -> Self {
        self.attributes.insert("url".to_string(), url.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub source_file: String,
    pub total_elements: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredDocument {
    pub elements: Vec<DocumentElement>,
    pub metadata: DocumentMetadata,
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap());
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([-*_][ \t]*){3,}$").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+(.*)$").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)]*)\)$").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\(([^)]*)\)$").unwrap());
static TABLE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?$").unwrap());

/// Split Markdown into a flat list of typed elements.
pub fn parse_structure(markdown: &str, source_file: &str) -> StructuredDocument {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut elements = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_end();
        let trimmed = line.trim();

        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if trimmed.starts_with("```") {
            let mut code = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].trim_start().starts_with("```") {
                code.push(lines[i]);
                i += 1;
            }
            // skip the closing fence
            i += 1;
            elements.push(DocumentElement::new(ElementKind::CodeBlock, code.join("\n")));
            continue;
        }

        if let Some(caps) = HEADING.captures(trimmed) {
            let mut element = DocumentElement::new(ElementKind::Heading, caps[2].trim());
            element.level = Some(caps[1].len() as u8);
            elements.push(element);
        } else if RULE.is_match(trimmed) {
            elements.push(DocumentElement::new(ElementKind::HorizontalRule, ""));
        } else if let Some(caps) = BULLET.captures(line) {
            elements.push(DocumentElement::new(ElementKind::ListItem, caps[1].trim()));
        } else if let Some(quote) = trimmed.strip_prefix('>') {
            elements.push(DocumentElement::new(ElementKind::Blockquote, quote.trim()));
        } else if trimmed.starts_with('|') {
            if !TABLE_SEPARATOR.is_match(trimmed) {
                for cell in trimmed.trim_matches('|').split('|') {
                    let cell = cell.trim();
                    if !cell.is_empty() {
                        elements.push(DocumentElement::new(ElementKind::TableCell, cell));
                    }
                }
            }
        } else if let Some(caps) = IMAGE.captures(trimmed) {
            elements.push(DocumentElement::new(ElementKind::Image, &caps[1]).with_url(&caps[2]));
        } else if let Some(caps) = LINK.captures(trimmed) {
            elements.push(DocumentElement::new(ElementKind::Link, &caps[1]).with_url(&caps[2]));
        } else {
            let mut paragraph = vec![trimmed];
            while i + 1 < lines.len() && is_paragraph_continuation(lines[i + 1]) {
                i += 1;
                paragraph.push(lines[i].trim());
            }
            elements.push(DocumentElement::new(
                ElementKind::Paragraph,
                paragraph.join(" "),
            ));
        }

        i += 1;
    }

    let total_elements = elements.len();
    StructuredDocument {
        elements,
        metadata: DocumentMetadata {
            source_file: source_file.to_string(),
            total_elements,
        },
    }
}

fn is_paragraph_continuation(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with('#')
        && !trimmed.starts_with('>')
        && !trimmed.starts_with('|')
        && !trimmed.starts_with("```")
        && !RULE.is_match(trimmed)
        && !BULLET.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Quarterly Report

Revenue grew **12%** this quarter,
driven by _new_ accounts.

## Highlights

- First item
* Second item
1. Numbered item

> Quoted remark

---

| Region | Sales |
|--------|------:|
| North  | 10    |

![Chart](https://example.com/chart.png)

[Full data](https://example.com/data)

```
let x = 1;
```
";

    #[test]
    fn test_markup_only_text_is_empty_result() {
        for markdown in ["---", "![](x)", "***\n\n___"] {
            let err = render(markdown, OutputFormat::Text, "r.pdf").unwrap_err();
            assert!(matches!(err, BackendError::EmptyResult), "{markdown:?}");
        }
        assert!(render("---", OutputFormat::Markdown, "r.pdf").is_ok());
    }

    #[test]
    fn test_markdown_is_unchanged() {
        let out = render(SAMPLE, OutputFormat::Markdown, "r.pdf").unwrap();
        assert_eq!(out.content, SAMPLE);
        assert_eq!(out.media_type, "text/markdown; charset=utf-8");
    }

    #[test]
    fn test_strip_markdown() {
        let text = strip_markdown(SAMPLE);

        assert!(text.starts_with("Quarterly Report"));
        assert!(text.contains("Revenue grew 12% this quarter"));
        assert!(text.contains("driven by new accounts."));
        assert!(text.contains("\nFirst item\nSecond item\nNumbered item"));
        assert!(text.contains("Quoted remark"));
        assert!(text.contains("Chart"));
        assert!(text.contains("Full data"));
        assert!(text.contains("let x = 1;"));
        assert!(!text.contains('#'));
        assert!(!text.contains("**"));
        assert!(!text.contains("```"));
        assert!(!text.contains("https://"));
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn test_strip_keeps_snake_case_and_exclamations() {
        assert_eq!(strip_markdown("call my_func_name now!"), "call my_func_name now!");
    }

    #[test]
    fn test_structure() {
        let doc = parse_structure(SAMPLE, "report.pdf");
        let kinds: Vec<ElementKind> = doc.elements.iter().map(|e| e.kind).collect();

        assert_eq!(
            kinds,
            vec![
                ElementKind::Heading,
                ElementKind::Paragraph,
                ElementKind::Heading,
                ElementKind::ListItem,
                ElementKind::ListItem,
                ElementKind::ListItem,
                ElementKind::Blockquote,
                ElementKind::HorizontalRule,
                ElementKind::TableCell,
                ElementKind::TableCell,
                ElementKind::TableCell,
                ElementKind::TableCell,
                ElementKind::Image,
                ElementKind::Link,
                ElementKind::CodeBlock,
            ]
        );

        assert_eq!(doc.elements[0].level, Some(1));
        assert_eq!(doc.elements[2].level, Some(2));
        assert_eq!(
            doc.elements[1].content,
            "Revenue grew **12%** this quarter, driven by _new_ accounts."
        );
        assert_eq!(doc.elements[12].attributes["url"], "https://example.com/chart.png");
        assert_eq!(doc.elements[13].content, "Full data");
        assert_eq!(doc.elements[14].content, "let x = 1;");
        assert_eq!(doc.metadata.total_elements, 15);
        assert_eq!(doc.metadata.source_file, "report.pdf");
    }

    #[test]
    fn test_json_rendering() {
        let out = render("# Title\n\nBody", OutputFormat::Json, "a.docx").unwrap();
        assert_eq!(out.media_type, "application/json");

        let value: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(value["elements"][0]["type"], "heading");
        assert_eq!(value["elements"][0]["level"], 1);
        assert_eq!(value["elements"][1]["type"], "paragraph");
        assert!(value["elements"][1].get("attributes").is_none());
        assert_eq!(value["metadata"]["total_elements"], 2);
    }

    #[test]
    fn test_unclosed_fence() {
        let doc = parse_structure("```\ncode only", "x.md");
        assert_eq!(doc.elements.len(), 1);
        assert_eq!(doc.elements[0].kind, ElementKind::CodeBlock);
        assert_eq!(doc.elements[0].content, "code only");
    }
}
