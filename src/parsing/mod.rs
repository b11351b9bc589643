//! Document parsing: turns stored uploads into page texts.
//!
//! Format is chosen by file extension only (`.pdf`, `.docx`, `.txt`, `.md`); content is never
//! sniffed. Parsing is blocking work, so callers run [`DocumentParser::parse`] on a blocking
//! thread and then drain the returned [`PageStream`].

mod docx;

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Lazy sequence of page texts produced by a parser.
pub type PageStream = Box<dyn Iterator<Item = Result<String, ParseError>> + Send>;

/// Errors raised while extracting text from an upload.
#[derive(Debug, Error)]
pub enum ParseError {
    /// File could not be read.
    #[error("Failed to read document: {0}")]
    Io(#[from] io::Error),
    /// Extension is not one of the supported formats.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// PDF text layer could not be extracted.
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    /// DOCX archive or its XML could not be read.
    #[error("Failed to parse DOCX: {0}")]
    Docx(String),
}

/// Upload formats accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// Plain UTF-8 text.
    Text,
    /// Markdown, treated as plain text.
    Markdown,
}

impl DocumentFormat {
    /// Extensions accepted for upload, lowercase with leading dot.
    pub const ALLOWED_EXTENSIONS: [&'static str; 4] = [".pdf", ".docx", ".txt", ".md"];

    /// Resolve the format from a filename's extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Converts a stored upload into page texts.
pub trait DocumentParser: Send + Sync {
    /// Open `path` and return its pages in document order.
    fn parse(&self, path: &Path) -> Result<PageStream, ParseError>;
}

/// Parser backed by `pdf-extract`, `zip`/`quick-xml`, and plain file reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDocumentParser;

impl DocumentParser for FileDocumentParser {
    fn parse(&self, path: &Path) -> Result<PageStream, ParseError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let format = DocumentFormat::from_filename(name)
            .ok_or_else(|| ParseError::UnsupportedFormat(name.to_string()))?;
        tracing::debug!(path = %path.display(), ?format, "Parsing document");

        match format {
            DocumentFormat::Pdf => {
                let pages = extract_pdf_pages(&fs::read(path)?)?;
                Ok(Box::new(pages.into_iter().map(Ok)))
            }
            DocumentFormat::Docx => {
                let pages = docx::extract_pages(fs::File::open(path)?)?;
                Ok(Box::new(pages.into_iter().map(Ok)))
            }
            DocumentFormat::Text | DocumentFormat::Markdown => {
                let bytes = fs::read(path)?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok(Box::new(split_form_feeds(text).into_iter().map(Ok)))
            }
        }
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    // pdf-extract panics on some malformed fonts and streams.
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ParseError::Pdf("extractor panicked on malformed input".into()))?
        .map_err(|error| ParseError::Pdf(error.to_string()))
}

/// Plain-text exports mark page breaks with form feeds.
fn split_form_feeds(text: String) -> Vec<String> {
    if !text.contains('\u{c}') {
        return vec![text];
    }
    text.split('\u{c}').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect_pages(stream: PageStream) -> Vec<String> {
        stream.map(|page| page.expect("page")).collect()
    }

    #[test]
    fn format_is_resolved_case_insensitively() {
        assert_eq!(DocumentFormat::from_filename("Notes.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_filename("a.b.docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_filename("x.md"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_filename("x.txt"), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_filename("slides.pptx"), None);
        assert_eq!(DocumentFormat::from_filename("README"), None);
    }

    #[test]
    fn text_file_is_a_single_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Osmosis moves water.\nDiffusion moves solutes.").expect("write");

        let pages = collect_pages(FileDocumentParser.parse(&path).expect("parse"));
        assert_eq!(pages, vec!["Osmosis moves water.\nDiffusion moves solutes."]);
    }

    #[test]
    fn form_feeds_split_pages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("export.md");
        let mut file = fs::File::create(&path).expect("create");
        write!(file, "# Page one\u{c}# Page two").expect("write");

        let pages = collect_pages(FileDocumentParser.parse(&path).expect("parse"));
        assert_eq!(pages, vec!["# Page one", "# Page two"]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("latin1.txt");
        fs::write(&path, [b'c', b'a', b'f', 0xE9]).expect("write");

        let pages = collect_pages(FileDocumentParser.parse(&path).expect("parse"));
        assert_eq!(pages.len(), 1);
        assert!(pages[0].starts_with("caf"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("image.png");
        fs::write(&path, b"png").expect("write");

        let error = FileDocumentParser.parse(&path).err().expect("error");
        assert!(matches!(error, ParseError::UnsupportedFormat(name) if name == "image.png"));
    }

    #[test]
    fn garbage_pdf_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf").expect("write");

        let error = FileDocumentParser.parse(&path).err().expect("error");
        assert!(matches!(error, ParseError::Pdf(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = FileDocumentParser
            .parse(Path::new("/definitely/not/here.txt"))
            .err()
            .expect("error");
        assert!(matches!(error, ParseError::Io(_)));
    }
}
