// src/document.rs
use chrono::NaiveDate;
use docx_rs::{Docx, Paragraph, Run};
use std::io::Cursor;
use thiserror::Error;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const REPORT_TITLE: &str = "運動健康報告";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to pack document: {0}")]
    Pack(String),
}

#[derive(Debug)]
pub struct RenderedDocument {
    pub filename: String,
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

/// Renders plain text into a Word document: one bold title paragraph followed
/// by exactly one paragraph per input line, in order. Lines are never merged
/// or wrapped.
pub fn render_report(text: &str) -> Result<RenderedDocument, DocumentError> {
    let mut buffer = Cursor::new(Vec::new());
    build_docx(text)
        .build()
        .pack(&mut buffer)
        .map_err(|e| DocumentError::Pack(e.to_string()))?;

    Ok(RenderedDocument {
        filename: report_filename(chrono::Utc::now().date_naive()),
        mime_type: DOCX_MIME,
        data: buffer.into_inner(),
    })
}

fn build_docx(text: &str) -> Docx {
    let mut docx = Docx::new().add_paragraph(
        Paragraph::new().add_run(Run::new().add_text(REPORT_TITLE).bold().size(32)),
    );

    for line in text.split('\n') {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
    }

    docx
}

fn report_filename(date: NaiveDate) -> String {
    format!("健康報告_{}.docx", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::DocumentChild;

    fn paragraph_texts(docx: &Docx) -> Vec<String> {
        docx.document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(p) => Some(p.raw_text()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_paragraph_per_line_after_the_title() {
        let text = "第一行\n第二行\n\n第四行";
        let paragraphs = paragraph_texts(&build_docx(text));

        // title + one paragraph per line, blank line included
        assert_eq!(paragraphs.len(), 5);
        assert_eq!(paragraphs[0], REPORT_TITLE);
        assert_eq!(paragraphs[1], "第一行");
        assert_eq!(paragraphs[3], "");
        assert_eq!(paragraphs[1..].join("\n"), text);
    }

    #[test]
    fn single_line_renders_title_plus_one_paragraph() {
        let paragraphs = paragraph_texts(&build_docx("持續補充水分"));
        assert_eq!(paragraphs, vec![REPORT_TITLE, "持續補充水分"]);
    }

    #[test]
    fn rendered_blob_is_a_zip_container() {
        let doc = render_report("持續補充水分\n睡前做伸展").unwrap();
        assert_eq!(&doc.data[..4], b"PK\x03\x04");
        assert_eq!(doc.mime_type, DOCX_MIME);
        assert!(doc.filename.ends_with(".docx"));
    }

    #[test]
    fn empty_text_still_renders() {
        let doc = render_report("").unwrap();
        assert_eq!(&doc.data[..4], b"PK\x03\x04");
    }

    #[test]
    fn filename_carries_the_date() {
        let name = report_filename(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(name, "健康報告_2025-03-09.docx");
    }
}
