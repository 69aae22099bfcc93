//! HTML to Markdown conversion.
//!
//! The input is parsed into a DOM and walked element by element, so attribute
//! values never reach the output. Produces ATX headings, fenced code blocks
//! and `-` bullets indented per nesting level. Tables are passed through as
//! serialized HTML surrounded by blank lines. If conversion fails, the raw
//! HTML is returned.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use thiserror::Error;

/// Deepest element nesting the walker descends into.
pub const MAX_DEPTH: usize = 256;

const SKIPPED: &[&str] = &["head", "script", "style", "noscript", "template", "title"];

const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside",
    "blockquote", "figure", "figcaption", "address", "dl", "dt", "dd", "form", "body", "html",
];

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("converter setup failed: {0}")]
    Setup(#[from] regex::Error),

    #[error("elements nested deeper than {0}")]
    TooDeep(usize),
}

pub fn html_to_markdown(html: &str) -> String {
    static CONVERTER: OnceLock<Result<MarkdownConverter, regex::Error>> = OnceLock::new();

    let converted = match CONVERTER.get_or_init(MarkdownConverter::new) {
        Ok(converter) => converter.convert(html),
        Err(e) => Err(ConversionError::Setup(e.clone())),
    };

    converted.unwrap_or_else(|e| {
        log::warn!("HTML conversion failed, passing raw HTML through: {}", e);
        html.to_string()
    })
}

pub struct MarkdownConverter {
    whitespace: Regex,
    trailing_space: Regex,
    blank_lines: Regex,
}

impl MarkdownConverter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            trailing_space: Regex::new(r"(?m)[ \t]+$")?,
            blank_lines: Regex::new(r"\n{3,}")?,
        })
    }

    pub fn convert(&self, html: &str) -> Result<String, ConversionError> {
        let document = Html::parse_document(html);

        let mut writer = Writer::new(self, 0);
        writer.children(document.root_element(), 0)?;

        let text = self.trailing_space.replace_all(&writer.out, "");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        Ok(text.trim().to_string())
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").into_owned()
    }
}

struct Writer<'c> {
    converter: &'c MarkdownConverter,
    out: String,
    list_depth: usize,
}

impl<'c> Writer<'c> {
    fn new(converter: &'c MarkdownConverter, list_depth: usize) -> Self {
        Self {
            converter,
            out: String::new(),
            list_depth,
        }
    }

    /// Renders the children of `element` into a fresh buffer.
    fn render_inner(&self, element: ElementRef<'_>, depth: usize) -> Result<String, ConversionError> {
        let mut inner = Writer::new(self.converter, self.list_depth);
        inner.children(element, depth)?;
        Ok(inner.out)
    }

    fn children(&mut self, element: ElementRef<'_>, depth: usize) -> Result<(), ConversionError> {
        if depth > MAX_DEPTH {
            return Err(ConversionError::TooDeep(MAX_DEPTH));
        }

        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child, depth + 1)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn element(&mut self, element: ElementRef<'_>, depth: usize) -> Result<(), ConversionError> {
        let name = element.value().name();
        match name {
            _ if SKIPPED.contains(&name) => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse().unwrap_or(1);
                let title = self.converter.collapse(&element.text().collect::<String>());
                self.block(&format!("{} {}", "#".repeat(level), title.trim()));
            }
            "br" => self.out.push('\n'),
            "hr" => self.block("---"),
            "img" => {}
            "strong" | "b" => self.wrap_inline(element, depth, "**")?,
            "em" | "i" => self.wrap_inline(element, depth, "*")?,
            "code" => {
                let code = self.converter.collapse(&element.text().collect::<String>());
                if !code.trim().is_empty() {
                    self.push_raw(&format!("`{}`", code.trim()));
                }
            }
            "a" => {
                let label = self.render_inner(element, depth)?;
                let label = label.trim();
                match element.value().attr("href") {
                    Some(href) if !label.is_empty() => self.push_raw(&format!("[{}]({})", label, href)),
                    _ => self.push_raw(label),
                }
            }
            "pre" => {
                let body = element.text().collect::<String>();
                let language = code_language(element).unwrap_or_default();
                self.block(&format!("```{}\n{}\n```", language, body.trim_matches('\n')));
            }
            "table" => self.block(&element.html()),
            "ul" => self.list(element, depth, false)?,
            "ol" => self.list(element, depth, true)?,
            _ if BLOCKS.contains(&name) => {
                self.block_break();
                self.children(element, depth)?;
                self.block_break();
            }
            _ => self.children(element, depth)?,
        }
        Ok(())
    }

    fn wrap_inline(&mut self, element: ElementRef<'_>, depth: usize, marker: &str) -> Result<(), ConversionError> {
        let inner = self.render_inner(element, depth)?;
        let inner = inner.trim();
        if !inner.is_empty() {
            self.push_raw(&format!("{marker}{inner}{marker}"));
        }
        Ok(())
    }

    fn list(&mut self, element: ElementRef<'_>, depth: usize, ordered: bool) -> Result<(), ConversionError> {
        if self.list_depth == 0 {
            self.block_break();
        } else {
            self.line_break();
        }

        let indent = "  ".repeat(self.list_depth);
        self.list_depth += 1;

        let items = element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li");
        for (index, item) in items.enumerate() {
            let body = self.render_inner(item, depth + 1)?;
            let marker = if ordered {
                format!("{}. ", index + 1)
            } else {
                "- ".to_string()
            };
            self.out.push_str(&indent);
            self.out.push_str(&marker);
            self.out.push_str(body.trim_start_matches('\n').trim_end());
            self.out.push('\n');
        }

        self.list_depth -= 1;
        if self.list_depth == 0 {
            self.block_break();
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        let collapsed = self.converter.collapse(text);
        let at_line_start = self.out.is_empty() || self.out.ends_with('\n');
        let collapsed = if at_line_start || self.out.ends_with(' ') {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        self.out.push_str(collapsed);
    }

    fn push_raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn block(&mut self, text: &str) {
        self.block_break();
        self.out.push_str(text);
        self.block_break();
    }

    fn block_break(&mut self) {
        if self.out.is_empty() || self.out.ends_with("\n\n") {
            return;
        }
        self.out.push_str(if self.out.ends_with('\n') { "\n" } else { "\n\n" });
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }
}

/// `language-*` class on the `<pre>` or any element inside it.
fn code_language(pre: ElementRef<'_>) -> Option<String> {
    pre.descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|e| e.value().attr("class"))
        .find_map(|class| {
            class
                .split_whitespace()
                .find_map(|c| c.strip_prefix("language-"))
                .map(str::to_string)
        })
}
