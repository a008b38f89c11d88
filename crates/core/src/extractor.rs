use crate::error::ExtractError;
use crate::traits::DocumentExtractor;
use lopdf::Document;
use tracing::debug;

/// Bytes searched for the `%PDF` marker; some servers prepend junk.
const HEADER_SCAN_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::Unreadable("document is empty".to_string()));
        }

        let scanned = &bytes[..bytes.len().min(HEADER_SCAN_LIMIT)];
        if !scanned.windows(4).any(|window| window == b"%PDF") {
            return Err(ExtractError::Unreadable("missing %PDF header".to_string()));
        }

        let document =
            Document::load_mem(bytes).map_err(|error| ExtractError::Unreadable(error.to_string()))?;
        let pages = extract_page_texts(&document);

        if pages.is_empty() {
            return Err(ExtractError::Unreadable("pdf had no readable page text".to_string()));
        }

        Ok(pages
            .into_iter()
            .map(|page| page.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Text of each page in page order; pages that fail to decode or carry no
/// text are left out.
pub fn extract_page_texts(document: &Document) -> Vec<PageText> {
    let mut pages = Vec::new();

    for (page_no, _page_id) in document.get_pages() {
        match document.extract_text(&[page_no]) {
            Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                number: page_no,
                text,
            }),
            Ok(_) => debug!(page = page_no, "page has no text"),
            Err(error) => debug!(page = page_no, error = %error, "page text could not be decoded"),
        }
    }

    pages
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Minimal PDF with one text object per line so extraction keeps the
    /// line layout.
    pub(crate) fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (index, line) in lines.iter().enumerate() {
                let y = 780_i64 - 16 * index as i64;
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 11_i64.into()]));
                operations.push(Operation::new("Td", vec![50_i64.into(), y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let encoded = content.encode().expect("content encodes");
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0_i64.into(), 0_i64.into(), 595_i64.into(), 842_i64.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("pdf serialises");
        buffer
    }

    fn non_empty_lines(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn keeps_line_layout_across_pages() {
        let bytes = pdf_with_pages(&[
            &["PENGUMUMAN", "Kode Saham : ABCD"],
            &["Alasan :", "Cooling down"],
        ]);

        let text = LopdfExtractor.extract(&bytes).expect("pdf should be readable");
        let lines = non_empty_lines(&text);

        let position = |needle: &str| {
            lines
                .iter()
                .position(|line| line.contains(needle))
                .unwrap_or_else(|| panic!("missing line {needle:?} in {lines:?}"))
        };
        assert!(position("PENGUMUMAN") < position("Kode Saham : ABCD"));
        assert!(position("Kode Saham : ABCD") < position("Alasan :"));
        assert!(position("Alasan :") < position("Cooling down"));
    }

    #[test]
    fn empty_bytes_are_unreadable() {
        assert!(matches!(
            LopdfExtractor.extract(&[]),
            Err(ExtractError::Unreadable(_))
        ));
    }

    #[test]
    fn html_error_page_is_unreadable() {
        let result = LopdfExtractor.extract(b"<html><body>Access denied</body></html>");
        assert!(matches!(result, Err(ExtractError::Unreadable(_))));
    }

    #[test]
    fn truncated_pdf_is_unreadable() {
        let result = LopdfExtractor.extract(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(ExtractError::Unreadable(_))));
    }
}
