//! # Ledger Report
//!
//! Format-independent model of a session ledger export. The server renders
//! it as CSV, XLSX or PDF; every renderer walks the same rows and trailers.
//!
//! ```text
//! Sessão        | 12
//! Início        | 01/03/2024 08:00
//! Fim           | 01/03/2024 18:10   (empty while open)
//!
//! Data | Tipo | Origem | Forma pagamento | Origem dados | Valor | Descrição
//! ...one row per movement, oldest first...
//!
//! Entradas      | 300.00
//! Saídas        | 50.00
//! Saldo parcial | 350.00
//! ```

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::ledger::{expected_balance, totals_of};
use crate::money::Money;
use crate::types::{CashMovement, CashSession, LedgerTotals, MovementType};
use crate::IMPORT_MARKER;

/// Column header row shared by all export formats.
pub const EXPORT_COLUMNS: [&str; 7] = [
    "Data",
    "Tipo",
    "Origem",
    "Forma pagamento",
    "Origem dados",
    "Valor",
    "Descrição",
];

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

// =============================================================================
// Export Format
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            _ => Err(ValidationError::NotAllowed {
                field: "format".to_string(),
                allowed: vec!["csv".to_string(), "xlsx".to_string(), "pdf".to_string()],
            }),
        }
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive day range on `created_at`. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, ValidationError> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ValidationError::invalid("from", "must not be after 'to'"));
            }
        }
        Ok(DateRange { from, to })
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.from.map_or(true, |f| day >= f) && self.to.map_or(true, |t| day <= t)
    }
}

// =============================================================================
// Report Model
// =============================================================================

/// Where a movement came from, as shown in the "Origem dados" column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Importado,
    Manual,
}

impl DataSource {
    pub fn of(movement: &CashMovement) -> Self {
        let imported = movement
            .description
            .as_deref()
            .is_some_and(|d| d.contains(IMPORT_MARKER));
        if imported {
            DataSource::Importado
        } else {
            DataSource::Manual
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataSource::Importado => "Importado",
            DataSource::Manual => "Manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub created_at: DateTime<Utc>,
    pub movement_type: MovementType,
    pub origin: String,
    pub payment_method: String,
    pub source: DataSource,
    pub amount: Money,
    pub description: String,
}

impl LedgerRow {
    /// Cells in [`EXPORT_COLUMNS`] order, as text.
    pub fn cells(&self) -> [String; 7] {
        [
            format_timestamp(&self.created_at),
            self.movement_type.as_str().to_string(),
            self.origin.clone(),
            self.payment_method.clone(),
            self.source.label().to_string(),
            self.amount.to_decimal_string(),
            self.description.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReport {
    pub session_id: i64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub opening_balance: Money,
    pub rows: Vec<LedgerRow>,
    pub totals: LedgerTotals,
    /// opening + entradas − saídas over the reported rows
    pub saldo_parcial: Money,
}

impl LedgerReport {
    /// Builds the report from a session and its movements.
    ///
    /// Movements outside `range` are skipped; the rest are ordered by
    /// `created_at` (then id) and totalled.
    ///
    /// ## Errors
    /// `CoreError::AmountOverflow` when the totals leave the `i64` range.
    pub fn build(
        session: &CashSession,
        movements: &[CashMovement],
        range: &DateRange,
    ) -> CoreResult<Self> {
        let mut selected: Vec<&CashMovement> =
            movements.iter().filter(|m| range.contains(&m.created_at)).collect();
        selected.sort_by_key(|m| (m.created_at, m.id));

        let totals = totals_of(selected.iter().copied())?;
        let saldo_parcial = expected_balance(session.opening_balance(), &totals)?;
        let rows = selected
            .into_iter()
            .map(|m| LedgerRow {
                created_at: m.created_at,
                movement_type: m.movement_type,
                origin: m.origin.clone(),
                payment_method: m.payment_method.clone().unwrap_or_default(),
                source: DataSource::of(m),
                amount: m.amount(),
                description: m.description.clone().unwrap_or_default(),
            })
            .collect();

        Ok(LedgerReport {
            session_id: session.id,
            opened_at: session.opened_at,
            closed_at: session.closed_at,
            opening_balance: session.opening_balance(),
            rows,
            totals,
            saldo_parcial,
        })
    }

    /// `(label, value)` pairs of the session block above the table.
    pub fn header_block(&self) -> [(&'static str, String); 3] {
        [
            ("Sessão", self.session_id.to_string()),
            ("Início", format_timestamp(&self.opened_at)),
            (
                "Fim",
                self.closed_at.as_ref().map(format_timestamp).unwrap_or_default(),
            ),
        ]
    }

    /// `(label, amount)` pairs of the trailer below the table.
    pub fn trailer(&self) -> [(&'static str, Money); 3] {
        [
            ("Entradas", self.totals.entradas()),
            ("Saídas", self.totals.saidas()),
            ("Saldo parcial", self.saldo_parcial),
        ]
    }

    pub fn file_name(&self, format: ExportFormat) -> String {
        format!("caixa_sessao_{}.{}", self.session_id, format.extension())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionStatus;
    use chrono::TimeZone;

    fn session() -> CashSession {
        CashSession {
            id: 7,
            tenant_id: 1,
            opened_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            closed_at: None,
            status: SessionStatus::Open,
            opening_balance_cents: 10000,
            closing_balance_cents: None,
            opening_notes: None,
            closing_notes: None,
        }
    }

    fn movement(id: i64, day: u32, kind: MovementType, cents: i64, desc: Option<&str>) -> CashMovement {
        CashMovement {
            id,
            session_id: 7,
            tenant_id: 1,
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            movement_type: kind,
            origin: "venda".to_string(),
            amount_cents: cents,
            description: desc.map(str::to_string),
            payment_method: None,
            reference_id: None,
        }
    }

    #[test]
    fn test_empty_session_report() {
        let report = LedgerReport::build(&session(), &[], &DateRange::default()).unwrap();

        assert!(report.rows.is_empty());
        let trailer = report.trailer();
        assert_eq!(trailer[0], ("Entradas", Money::zero()));
        assert_eq!(trailer[1], ("Saídas", Money::zero()));
        assert_eq!(trailer[2], ("Saldo parcial", Money::from_cents(10000)));
        assert_eq!(report.header_block()[2].1, "");
    }

    #[test]
    fn test_rows_sorted_and_sourced() {
        let movements = vec![
            movement(2, 2, MovementType::Out, 5000, None),
            movement(1, 1, MovementType::In, 30000, Some("Lote [IMPORTADO]")),
        ];
        let report = LedgerReport::build(&session(), &movements, &DateRange::default()).unwrap();

        assert_eq!(report.rows[0].source, DataSource::Importado);
        assert_eq!(report.rows[1].source, DataSource::Manual);
        assert_eq!(report.saldo_parcial.cents(), 35000);

        let cells = report.rows[0].cells();
        assert_eq!(cells[0], "01/03/2024 12:00");
        assert_eq!(cells[1], "entrada");
        assert_eq!(cells[5], "300.00");
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let movements = vec![
            movement(1, 1, MovementType::In, 100, None),
            movement(2, 2, MovementType::In, 200, None),
            movement(3, 3, MovementType::In, 300, None),
        ];
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d);
        let range = DateRange::new(day(2), day(3)).unwrap();

        let report = LedgerReport::build(&session(), &movements, &range).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.totals.entradas_cents, 500);

        assert!(DateRange::new(day(3), day(2)).is_err());
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("docx".parse::<ExportFormat>().is_err());
        assert_eq!(
            LedgerReport::build(&session(), &[], &DateRange::default())
                .unwrap()
                .file_name(ExportFormat::Pdf),
            "caixa_sessao_7.pdf"
        );
    }
}
