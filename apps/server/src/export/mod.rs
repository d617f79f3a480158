//! # Ledger Export
//!
//! Renders a [`LedgerReport`] as CSV, XLSX or PDF. All three share one
//! layout:
//!
//! ```text
//! Sessão        42
//! Início        01/03/2026 08:00
//! Fim           01/03/2026 18:05
//!
//! Data | Tipo | Origem | Forma pagamento | Origem dados | Valor | Descrição
//! ...one row per movement, oldest first...
//!
//! Entradas       300.00
//! Saídas          50.00
//! Saldo parcial  350.00
//! ```

mod csv;
mod pdf;
mod xlsx;

use caixa_core::report::{ExportFormat, LedgerReport};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV export failed: {0}")]
    Csv(String),

    #[error("XLSX export failed: {0}")]
    Xlsx(String),

    #[error("PDF export failed: {0}")]
    Pdf(String),
}

/// A rendered file ready to download.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn render(report: &LedgerReport, format: ExportFormat) -> Result<ExportFile, ExportError> {
    let bytes = match format {
        ExportFormat::Csv => csv::render(report)?,
        ExportFormat::Xlsx => xlsx::render(report)?,
        ExportFormat::Pdf => pdf::render(report)?,
    };

    Ok(ExportFile {
        file_name: report.file_name(format),
        content_type: format.content_type(),
        bytes,
    })
}
