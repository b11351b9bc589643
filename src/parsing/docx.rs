//! DOCX text extraction from `word/document.xml`.

use super::ParseError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::{Read, Seek};
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract page texts, splitting at explicit page breaks. Paragraphs end with a newline.
pub(super) fn extract_pages<R: Read + Seek>(reader: R) -> Result<Vec<String>, ParseError> {
    let mut archive = ZipArchive::new(reader).map_err(|error| ParseError::Docx(error.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|error| ParseError::Docx(format!("{DOCUMENT_PART}: {error}")))?
        .read_to_string(&mut xml)?;
    pages_from_document_xml(&xml)
}

pub(super) fn pages_from_document_xml(xml: &str) -> Result<Vec<String>, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut pages = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => match element.name().as_ref() {
                b"w:t" => in_text_run = true,
                b"w:br" if is_page_break(&element)? => pages.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(element)) => match element.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" if is_page_break(&element)? => pages.push(std::mem::take(&mut current)),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text_run => {
                let unescaped = text
                    .unescape()
                    .map_err(|error| ParseError::Docx(error.to_string()))?;
                current.push_str(&unescaped);
            }
            Ok(Event::End(element)) => match element.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                return Err(ParseError::Docx(format!(
                    "invalid XML at byte {}: {error}",
                    reader.buffer_position()
                )));
            }
        }
    }

    pages.push(current);
    Ok(pages)
}

fn is_page_break(element: &BytesStart<'_>) -> Result<bool, ParseError> {
    let attribute = element
        .try_get_attribute("w:type")
        .map_err(|error| ParseError::Docx(error.to_string()))?;
    Ok(attribute.is_some_and(|attr| attr.value.as_ref() == b"page"))
}
