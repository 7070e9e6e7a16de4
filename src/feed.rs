//! Feed body sniffing.
//!
//! Only classification is done here, never parsing. A fetched body is
//! rejected if it is an HTML page or empty; otherwise its format is
//! reported for logging.

use std::fmt;

/// How many leading bytes are inspected when sniffing.
const SNIFF_WINDOW: usize = 1024;

/// Format of an accepted feed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
    Rdf,
    Xml,
    Unknown,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedFormat::Rss => "rss",
            FeedFormat::Atom => "atom",
            FeedFormat::Rdf => "rdf",
            FeedFormat::Xml => "xml",
            FeedFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Why a body cannot be served as a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedRejection {
    Html,
    Empty,
}

/// Classify a fetched body.
///
/// Leading whitespace (Unicode, plus the byte-order mark) is skipped over the
/// whole body before the leading 1024 characters are inspected.
///
/// # Errors
///
/// - [`FeedRejection::Empty`] when nothing but whitespace remains
/// - [`FeedRejection::Html`] when the rest starts with `<!doctype` or `<html`
///   (case-insensitive)
pub fn inspect(body: &[u8]) -> Result<FeedFormat, FeedRejection> {
    let text = String::from_utf8_lossy(body);
    let rest = text.trim_start_matches(is_skippable);

    if rest.is_empty() {
        return Err(FeedRejection::Empty);
    }

    let head = rest
        .char_indices()
        .nth(SNIFF_WINDOW)
        .and_then(|(end, _)| rest.get(..end))
        .unwrap_or(rest);
    let lower = head.to_ascii_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return Err(FeedRejection::Html);
    }

    Ok(sniff_format(&lower))
}

fn is_skippable(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

fn sniff_format(lower: &str) -> FeedFormat {
    if lower.contains("<rss") {
        FeedFormat::Rss
    } else if lower.contains("<feed") {
        FeedFormat::Atom
    } else if lower.contains("<rdf:rdf") {
        FeedFormat::Rdf
    } else if lower.starts_with("<?xml") || lower.starts_with('<') {
        FeedFormat::Xml
    } else {
        FeedFormat::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rss_detected() {
        let body = br#"<?xml version="1.0"?><rss version="2.0"><channel/></rss>"#;
        assert_eq!(inspect(body), Ok(FeedFormat::Rss));
    }

    #[test]
    fn test_atom_detected() {
        let body = br#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
        assert_eq!(inspect(body), Ok(FeedFormat::Atom));
    }

    #[test]
    fn test_rdf_and_plain_xml() {
        assert_eq!(inspect(b"<rdf:RDF></rdf:RDF>"), Ok(FeedFormat::Rdf));
        assert_eq!(inspect(b"<?xml version='1.0'?><urlset/>"), Ok(FeedFormat::Xml));
        assert_eq!(inspect(b"{\"items\": []}"), Ok(FeedFormat::Unknown));
    }

    #[test]
    fn test_html_rejected_case_insensitive() {
        assert_eq!(inspect(b"  \n<!DOCTYPE html><html></html>"), Err(FeedRejection::Html));
        assert_eq!(inspect(b"<HTML><body>login</body></HTML>"), Err(FeedRejection::Html));
        assert_eq!(inspect(b"<!doctype html>"), Err(FeedRejection::Html));
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(inspect(b""), Err(FeedRejection::Empty));
        assert_eq!(inspect(b" \r\n\t "), Err(FeedRejection::Empty));
    }

    #[test]
    fn test_leading_whitespace_beyond_window_is_not_empty() {
        let mut body = vec![b' '; SNIFF_WINDOW + 10];
        body.extend_from_slice(b"<rss></rss>");
        assert!(inspect(&body).is_ok());
    }

    #[test]
    fn test_html_after_long_leading_whitespace_rejected() {
        let mut body = vec![b'\n'; SNIFF_WINDOW * 2];
        body.extend_from_slice(b"<!DOCTYPE html><html><body>blocked</body></html>");
        assert_eq!(inspect(&body), Err(FeedRejection::Html));
    }

    #[test]
    fn test_unicode_whitespace_only_is_empty() {
        assert_eq!(inspect("\u{feff}".as_bytes()), Err(FeedRejection::Empty));
        assert_eq!(inspect("\u{a0}\u{a0}".as_bytes()), Err(FeedRejection::Empty));
        assert_eq!(inspect("\u{feff} \u{2003}\n".as_bytes()), Err(FeedRejection::Empty));
    }

    #[test]
    fn test_nbsp_before_html_rejected() {
        let body = "\u{a0}\u{feff}  <HTML><head></head></HTML>";
        assert_eq!(inspect(body.as_bytes()), Err(FeedRejection::Html));
    }

    #[test]
    fn test_format_display() {
        assert_eq!(FeedFormat::Atom.to_string(), "atom");
    }
}
