use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::LoaderError;
use crate::loader::markdown::html_to_markdown;
use crate::loader::{ContentLoader, LoadResult};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Converts `word/document.xml` to HTML, then to Markdown.
pub struct DocxLoader;

impl DocxLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLoader for DocxLoader {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == DOCX_MIME
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        let file = std::fs::File::open(path).map_err(|e| LoaderError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| LoaderError::Docx(format!("Failed to open DOCX: {}", e)))?;

        let xml = read_document_xml(&mut archive)?;
        let html = docx_xml_to_html(&xml)?;

        Ok(LoadResult::text(html_to_markdown(&html)))
    }
}

fn read_document_xml<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String, LoaderError> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| LoaderError::Docx(format!("Failed to find document.xml: {}", e)))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| LoaderError::Docx(format!("Failed to read document.xml: {}", e)))?;

    Ok(xml_content)
}

#[derive(Debug, Default)]
struct Paragraph {
    style: Option<String>,
    list_item: bool,
    html: String,
}

#[derive(Debug, Default)]
struct Run {
    bold: bool,
    italic: bool,
    html: String,
}

impl Run {
    fn into_html(self) -> String {
        if self.html.trim().is_empty() {
            return self.html;
        }
        let mut html = self.html;
        if self.italic {
            html = format!("<em>{}</em>", html);
        }
        if self.bold {
            html = format!("<strong>{}</strong>", html);
        }
        html
    }
}

/// Walks WordprocessingML and emits a small HTML subset: headings, paragraphs,
/// bulleted list items, tables, bold/italic runs and line breaks.
fn docx_xml_to_html(xml: &str) -> Result<String, LoaderError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut html = String::new();
    let mut paragraph: Option<Paragraph> = None;
    let mut run: Option<Run> = None;
    let mut in_text = false;
    let mut in_list = false;
    let mut table_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => paragraph = Some(Paragraph::default()),
                b"r" => run = Some(Run::default()),
                b"t" => in_text = true,
                b"numPr" => mark_list_item(&mut paragraph),
                b"tbl" => {
                    close_list(&mut html, &mut in_list);
                    table_depth += 1;
                    html.push_str("<table>");
                }
                b"tr" if table_depth > 0 => html.push_str("<tr>"),
                b"tc" if table_depth > 0 => html.push_str("<td>"),
                other => apply_property(other, e, &mut paragraph, &mut run),
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"br" => push_run_html(&mut run, &mut paragraph, "<br>"),
                b"tab" => push_run_html(&mut run, &mut paragraph, " "),
                b"numPr" => mark_list_item(&mut paragraph),
                other => apply_property(other, e, &mut paragraph, &mut run),
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => {
                    if let Some(finished) = run.take() {
                        if let Some(p) = paragraph.as_mut() {
                            p.html.push_str(&finished.into_html());
                        }
                    }
                }
                b"p" => {
                    if let Some(p) = paragraph.take() {
                        emit_paragraph(&mut html, p, &mut in_list, table_depth > 0);
                    }
                }
                b"tc" if table_depth > 0 => html.push_str("</td>"),
                b"tr" if table_depth > 0 => html.push_str("</tr>"),
                b"tbl" if table_depth > 0 => {
                    table_depth -= 1;
                    html.push_str("</table>");
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    let decoded = e.decode().unwrap_or_default();
                    push_run_html(&mut run, &mut paragraph, &escape_html(&decoded));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if in_text {
                    if let Some(c) = resolve_entity(&String::from_utf8_lossy(&r)) {
                        push_run_html(&mut run, &mut paragraph, &escape_html(&c.to_string()));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LoaderError::Docx(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
    }

    close_list(&mut html, &mut in_list);
    Ok(html)
}

fn apply_property(
    name: &[u8],
    e: &BytesStart,
    paragraph: &mut Option<Paragraph>,
    run: &mut Option<Run>,
) {
    match name {
        b"pStyle" => {
            if let (Some(p), Some(style)) = (paragraph.as_mut(), attribute(e, b"val")) {
                p.style = Some(style);
            }
        }
        b"b" => {
            if let Some(r) = run.as_mut() {
                r.bold = toggle_on(e);
            }
        }
        b"i" => {
            if let Some(r) = run.as_mut() {
                r.italic = toggle_on(e);
            }
        }
        _ => {}
    }
}

fn mark_list_item(paragraph: &mut Option<Paragraph>) {
    if let Some(p) = paragraph.as_mut() {
        p.list_item = true;
    }
}

fn push_run_html(run: &mut Option<Run>, paragraph: &mut Option<Paragraph>, html: &str) {
    match (run.as_mut(), paragraph.as_mut()) {
        (Some(r), _) => r.html.push_str(html),
        (None, Some(p)) => p.html.push_str(html),
        (None, None) => {}
    }
}

fn emit_paragraph(html: &mut String, paragraph: Paragraph, in_list: &mut bool, in_table: bool) {
    let body = paragraph.html.trim();

    if in_table {
        if !body.is_empty() {
            html.push_str(body);
            html.push(' ');
        }
        return;
    }

    if paragraph.list_item {
        if !*in_list {
            html.push_str("<ul>");
            *in_list = true;
        }
        html.push_str(&format!("<li>{}</li>", body));
        return;
    }

    close_list(html, in_list);
    if body.is_empty() {
        return;
    }

    match paragraph.style.as_deref().and_then(heading_level) {
        Some(level) => html.push_str(&format!("<h{0}>{1}</h{0}>", level, body)),
        None => html.push_str(&format!("<p>{}</p>", body)),
    }
}

fn close_list(html: &mut String, in_list: &mut bool) {
    if *in_list {
        html.push_str("</ul>");
        *in_list = false;
    }
}

/// Maps Word paragraph styles to heading levels: `Title` is 1, `HeadingN` is N.
fn heading_level(style: &str) -> Option<u8> {
    if style.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let digits = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("heading"))?
        .trim();
    match digits.parse::<u8>() {
        Ok(n) if (1..=6).contains(&n) => Some(n),
        _ => None,
    }
}

fn attribute(e: &BytesStart, local_name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// `<w:b/>` is on; `<w:b w:val="false"/>` or `"0"` is off.
fn toggle_on(e: &BytesStart) -> bool {
    !matches!(attribute(e, b"val").as_deref(), Some("false" | "0" | "none"))
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
