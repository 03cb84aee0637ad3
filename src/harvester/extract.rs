//! Passage extraction from fetched pages
//!
//! This module handles parsing a passage page to extract:
//! - The chapter title (first `h3` in the passage container)
//! - Flattened verse text, in text mode
//! - The raw markup fragment, in markup mode
//!
//! A page without the passage container yields `None`; the caller records
//! a miss and does not retry.

use crate::config::ContentMode;
use scraper::{ElementRef, Html, Selector};

const CONTAINER: &str = "div.passage-text";
const MARKUP_ROOT: &str = "div.text-html";

/// Content extracted from one passage page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub title: Option<String>,
    pub content: PassageContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassageContent {
    /// Verse text flattened to a single line
    Text(String),

    /// Serialized `div.text-html` fragment, not yet rewritten
    Markup(String),
}

/// Extracts the passage from a page body
///
/// # Arguments
///
/// * `html` - The page body
/// * `mode` - Whether to flatten verse text or keep the markup fragment
/// * `ascii_only` - Drop non-ASCII characters from title and text
///
/// # Returns
///
/// * `Some(Passage)` - The page carries a passage container
/// * `None` - The container (or, in markup mode, its fragment) is absent
///
/// # Example
///
/// ```
/// use passage_harvester::config::ContentMode;
/// use passage_harvester::harvester::{extract_passage, PassageContent};
///
/// let html = r#"<div class="passage-text"><p><span class="text">
///     <sup class="versenum">1 </sup>In the beginning</span></p></div>"#;
/// let passage = extract_passage(html, ContentMode::Text, true).unwrap();
/// assert_eq!(passage.content, PassageContent::Text("1 In the beginning".to_string()));
/// ```
pub fn extract_passage(html: &str, mode: ContentMode, ascii_only: bool) -> Option<Passage> {
    let document = Html::parse_document(html);
    let container_selector = Selector::parse(CONTAINER).ok()?;
    let container = document.select(&container_selector).next()?;

    let title = extract_title(container).map(|t| filter(&t, ascii_only));

    let content = match mode {
        ContentMode::Text => PassageContent::Text(flatten_text(container, ascii_only)),
        ContentMode::Markup => {
            let markup_selector = Selector::parse(MARKUP_ROOT).ok()?;
            let fragment = container.select(&markup_selector).next()?;
            PassageContent::Markup(fragment.html())
        }
    };

    Some(Passage { title, content })
}

/// Extracts the chapter title from the container
fn extract_title(container: ElementRef) -> Option<String> {
    let selector = Selector::parse("h3").ok()?;

    container
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Flattens every `span.text` of every paragraph into one line
///
/// Each verse is prefixed with its verse number. Cross references, verse
/// number markers and chapter numbers never reach the output.
fn flatten_text(container: ElementRef, ascii_only: bool) -> String {
    let mut raw = String::new();

    let (Ok(paragraphs), Ok(spans), Ok(verse_numbers)) = (
        Selector::parse("p"),
        Selector::parse("span.text"),
        Selector::parse("sup.versenum"),
    ) else {
        return raw;
    };

    for paragraph in container.select(&paragraphs) {
        for span in paragraph.select(&spans) {
            if let Some(number) = span.select(&verse_numbers).next() {
                raw.push_str(number.text().collect::<String>().trim());
                raw.push(' ');
            }

            let mut text = String::new();
            collect_text(span, &mut text);
            raw.push_str(text.trim());
            raw.push(' ');
        }
    }

    collapse_whitespace(&filter(&raw, ascii_only))
}

/// Appends the text of `element`, skipping marker subtrees
fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if !is_marker(child) {
                collect_text(child, out);
            }
        }
    }
}

fn is_marker(element: ElementRef) -> bool {
    let value = element.value();
    let has = |class: &str| value.classes().any(|c| c == class);
    match value.name() {
        "sup" => has("crossreference") || has("versenum"),
        "span" => has("chapternum"),
        _ => false,
    }
}

fn filter(value: &str, ascii_only: bool) -> String {
    if ascii_only {
        to_ascii(value)
    } else {
        value.to_string()
    }
}

/// Drops every non-ASCII character
pub fn to_ascii(value: &str) -> String {
    value.chars().filter(char::is_ascii).collect()
}

/// Replaces whitespace runs with one space and trims both ends
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
