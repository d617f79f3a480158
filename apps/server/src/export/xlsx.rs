//! XLSX rendering. Amounts are written as numbers so the sheet can sum them.

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use caixa_core::report::{LedgerReport, EXPORT_COLUMNS};

use super::ExportError;

const AMOUNT_COLUMN: u16 = 5;

impl From<XlsxError> for ExportError {
    fn from(err: XlsxError) -> Self {
        ExportError::Xlsx(err.to_string())
    }
}

pub(super) fn render(report: &LedgerReport) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(format!("Sessão {}", report.session_id))?;

        let mut row: u32 = 0;
        for (label, value) in report.header_block() {
            sheet.write_string_with_format(row, 0, label, &bold)?;
            sheet.write_string(row, 1, value)?;
            row += 1;
        }
        row += 1;

        for (col, title) in EXPORT_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(row, col as u16, *title, &bold)?;
        }
        row += 1;

        for line in &report.rows {
            for (col, cell) in line.cells().iter().enumerate() {
                let col = col as u16;
                if col == AMOUNT_COLUMN {
                    sheet.write_number_with_format(row, col, line.amount.to_f64(), &money)?;
                } else {
                    sheet.write_string(row, col, cell)?;
                }
            }
            row += 1;
        }
        row += 1;

        for (label, amount) in report.trailer() {
            sheet.write_string_with_format(row, 0, label, &bold)?;
            sheet.write_number_with_format(row, AMOUNT_COLUMN, amount.to_f64(), &money)?;
            row += 1;
        }

        sheet.set_column_width(0, 18)?;
        sheet.set_column_width(6, 40)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::report;

    #[test]
    fn test_produces_zip_container() {
        let bytes = render(&report(true)).unwrap();
        // XLSX is a zip archive
        assert!(bytes.starts_with(b"PK"));
    }
}
