//! PDF rendering on A4 with the built-in Helvetica faces.

use std::io::BufWriter;

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerIndex,
    PdfPageIndex,
};

use caixa_core::report::{LedgerReport, EXPORT_COLUMNS};

use super::ExportError;

const PAGE_W: f32 = 297.0; // landscape, seven columns
const PAGE_H: f32 = 210.0;
const MARGIN: f32 = 15.0;
const ROW_H: f32 = 6.0;
const FONT_SIZE: f32 = 9.0;
const TITLE_SIZE: f32 = 14.0;

/// Left edge of each column, in mm from the margin.
const COLUMN_X: [f32; 7] = [0.0, 32.0, 52.0, 80.0, 112.0, 138.0, 162.0];
const DESCRIPTION_MAX_CHARS: usize = 55;

struct PdfWriter {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    page: PdfPageIndex,
    layer: PdfLayerIndex,
    /// distance from the top edge
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(format!("{e:?}")))?;
        let font_bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(format!("{e:?}")))?;

        Ok(PdfWriter {
            doc,
            font,
            font_bold,
            page,
            layer,
            y: MARGIN,
        })
    }

    fn ensure_space(&mut self) {
        if self.y + ROW_H > PAGE_H - MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer");
            self.page = page;
            self.layer = layer;
            self.y = MARGIN;
        }
    }

    fn text(&self, s: &str, x: f32, size: f32, bold: bool) {
        let font = if bold { &self.font_bold } else { &self.font };
        self.doc
            .get_page(self.page)
            .get_layer(self.layer)
            .use_text(s, size, Mm(MARGIN + x), Mm(PAGE_H - self.y), font);
    }

    fn row(&mut self, cells: &[&str], bold: bool) {
        self.ensure_space();
        for (x, cell) in COLUMN_X.iter().zip(cells) {
            self.text(cell, *x, FONT_SIZE, bold);
        }
        self.y += ROW_H;
    }

    fn to_bytes(self) -> Result<Vec<u8>, ExportError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ExportError::Pdf(format!("{e:?}")))?;
        buf.into_inner().map_err(|e| ExportError::Pdf(e.to_string()))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

pub(super) fn render(report: &LedgerReport) -> Result<Vec<u8>, ExportError> {
    let title = format!("Caixa - Sessão {}", report.session_id);
    let mut pdf = PdfWriter::new(&title)?;

    pdf.text(&title, 0.0, TITLE_SIZE, true);
    pdf.y += ROW_H * 1.5;

    for (label, value) in report.header_block() {
        pdf.row(&[label, value.as_str()], false);
    }
    pdf.y += ROW_H / 2.0;

    pdf.row(&EXPORT_COLUMNS, true);
    for line in &report.rows {
        let mut cells = line.cells();
        cells[5] = line.amount.to_string();
        cells[6] = truncate(&cells[6], DESCRIPTION_MAX_CHARS);
        let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
        pdf.row(&refs, false);
    }
    pdf.y += ROW_H / 2.0;

    for (label, amount) in report.trailer() {
        let value = amount.to_string();
        pdf.row(&[label, value.as_str()], true);
    }

    pdf.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::report;

    #[test]
    fn test_pdf_header() {
        let bytes = render(&report(true)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("curto", 10), "curto");
        assert_eq!(truncate("descrição longa demais", 10), "descriç...");
    }
}
