//! CSV rendering. Amounts are plain two-decimal numbers.

use caixa_core::report::{LedgerReport, EXPORT_COLUMNS};

use super::ExportError;

pub(super) fn render(report: &LedgerReport) -> Result<Vec<u8>, ExportError> {
    // Header block and trailer rows are shorter than the table
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let err = |e: csv::Error| ExportError::Csv(e.to_string());

    for (label, value) in report.header_block() {
        writer.write_record([label, value.as_str()]).map_err(err)?;
    }
    writer.write_record([""]).map_err(err)?;

    writer.write_record(EXPORT_COLUMNS).map_err(err)?;
    for row in &report.rows {
        writer.write_record(row.cells()).map_err(err)?;
    }

    writer.write_record([""]).map_err(err)?;
    for (label, amount) in report.trailer() {
        writer
            .write_record([label, amount.to_decimal_string().as_str()])
            .map_err(err)?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::report;

    fn lines(bytes: Vec<u8>) -> Vec<String> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_full_ledger() {
        let lines = lines(render(&report(true)).unwrap());

        assert_eq!(lines[0], "Sessão,42");
        assert_eq!(lines[1], "Início,01/03/2026 08:00");
        assert_eq!(lines[4], "Data,Tipo,Origem,Forma pagamento,Origem dados,Valor,Descrição");
        assert_eq!(
            lines[5],
            "01/03/2026 09:30,entrada,venda,pix,Manual,300.00,Venda rápida: Café x24"
        );
        assert!(lines[6].contains(",Importado,50.00,"));
        assert_eq!(lines[lines.len() - 3], "Entradas,300.00");
        assert_eq!(lines[lines.len() - 2], "Saídas,50.00");
        assert_eq!(lines[lines.len() - 1], "Saldo parcial,350.00");
    }

    #[test]
    fn test_empty_session_has_header_and_trailer() {
        let lines = lines(render(&report(false)).unwrap());

        assert!(lines.iter().any(|l| l.starts_with("Data,Tipo")));
        assert_eq!(lines[lines.len() - 3], "Entradas,0.00");
        assert_eq!(lines[lines.len() - 2], "Saídas,0.00");
        assert_eq!(lines[lines.len() - 1], "Saldo parcial,100.00");
    }
}
