//! # CSV Import
//!
//! Two-phase import of movements from a bank or spreadsheet CSV.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Import Workflow                                  │
//! │                                                                         │
//! │  Phase 1: preview (no writes)                                           │
//! │    raw bytes ──► lenient UTF-8 ──► header row + ≤ N data rows           │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │    ColumnMapping::infer(headers)    tipo/type → type, valor → amount…   │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │    ParsedCsv staged by caller, ImportPreview returned                   │
//! │                                                                         │
//! │  Phase 2: confirm                                                       │
//! │    staged ParsedCsv + mapping overrides                                 │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │    validate_row per line ──┬──► NewMovement (description + [IMPORTADO]) │
//! │                            └──► RejectedRow { line, values, reason }    │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │    caller inserts all valid rows in one transaction                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{MovementType, NewMovement};
use crate::IMPORT_MARKER;

// =============================================================================
// Fields & Mapping
// =============================================================================

/// Target fields an imported column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportField {
    Type,
    Origin,
    Amount,
    Description,
    PaymentMethod,
    ReferenceId,
    Date,
}

impl ImportField {
    pub const ALL: [ImportField; 7] = [
        ImportField::Type,
        ImportField::Origin,
        ImportField::Amount,
        ImportField::Description,
        ImportField::PaymentMethod,
        ImportField::ReferenceId,
        ImportField::Date,
    ];

    /// Lower-case header names recognised for this field.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            ImportField::Type => &["tipo", "type"],
            ImportField::Origin => &["origem", "origin"],
            ImportField::Amount => &["valor", "amount"],
            ImportField::Description => &["descricao", "descrição", "description"],
            ImportField::PaymentMethod => &["forma_pagamento", "pagamento", "payment_method"],
            ImportField::ReferenceId => &["referencia_id", "ref_id", "id"],
            ImportField::Date => &["data", "date", "created_at"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImportField::Type => "type",
            ImportField::Origin => "origin",
            ImportField::Amount => "amount",
            ImportField::Description => "description",
            ImportField::PaymentMethod => "payment_method",
            ImportField::ReferenceId => "reference_id",
            ImportField::Date => "date",
        }
    }
}

/// Which CSV header feeds each field. `None` means unmapped.
///
/// Also the shape of the overrides a client sends on confirm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ColumnMapping {
    #[serde(rename = "type", default)]
    pub movement_type: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, field: ImportField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    fn slot(&self, field: ImportField) -> &Option<String> {
        match field {
            ImportField::Type => &self.movement_type,
            ImportField::Origin => &self.origin,
            ImportField::Amount => &self.amount,
            ImportField::Description => &self.description,
            ImportField::PaymentMethod => &self.payment_method,
            ImportField::ReferenceId => &self.reference_id,
            ImportField::Date => &self.date,
        }
    }

    fn slot_mut(&mut self, field: ImportField) -> &mut Option<String> {
        match field {
            ImportField::Type => &mut self.movement_type,
            ImportField::Origin => &mut self.origin,
            ImportField::Amount => &mut self.amount,
            ImportField::Description => &mut self.description,
            ImportField::PaymentMethod => &mut self.payment_method,
            ImportField::ReferenceId => &mut self.reference_id,
            ImportField::Date => &mut self.date,
        }
    }

    /// Maps each field to the first header matching one of its synonyms,
    /// compared trimmed and case-insensitively.
    pub fn infer(headers: &[String]) -> Self {
        let mut mapping = ColumnMapping::default();

        for field in ImportField::ALL {
            let found = headers
                .iter()
                .find(|h| field.synonyms().contains(&h.trim().to_lowercase().as_str()));
            *mapping.slot_mut(field) = found.cloned();
        }

        mapping
    }

    /// Applies client overrides on top of this mapping, field by field.
    ///
    /// An empty override unmaps the field. A non-empty override must name
    /// one of `headers`.
    pub fn with_overrides(
        &self,
        overrides: &ColumnMapping,
        headers: &[String],
    ) -> Result<ColumnMapping, ValidationError> {
        let mut merged = self.clone();

        for field in ImportField::ALL {
            let Some(requested) = overrides.get(field) else {
                continue;
            };
            let requested = requested.trim();

            if requested.is_empty() {
                *merged.slot_mut(field) = None;
                continue;
            }

            let header = headers
                .iter()
                .find(|h| h.trim().eq_ignore_ascii_case(requested))
                .ok_or_else(|| {
                    ValidationError::invalid(
                        &format!("mapping.{}", field.name()),
                        format!("column '{}' is not in the file", requested),
                    )
                })?;
            *merged.slot_mut(field) = Some(header.clone());
        }

        Ok(merged)
    }

    /// Turns header names into column positions.
    fn resolve(&self, headers: &[String]) -> ResolvedColumns {
        let index_of = |field: ImportField| {
            self.get(field)
                .and_then(|name| headers.iter().position(|h| h == name))
        };

        ResolvedColumns {
            movement_type: index_of(ImportField::Type),
            origin: index_of(ImportField::Origin),
            amount: index_of(ImportField::Amount),
            description: index_of(ImportField::Description),
            payment_method: index_of(ImportField::PaymentMethod),
            reference_id: index_of(ImportField::ReferenceId),
            date: index_of(ImportField::Date),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ResolvedColumns {
    movement_type: Option<usize>,
    origin: Option<usize>,
    amount: Option<usize>,
    description: Option<usize>,
    payment_method: Option<usize>,
    reference_id: Option<usize>,
    date: Option<usize>,
}

// =============================================================================
// Parsing (Phase 1)
// =============================================================================

/// A CSV file read into memory, waiting for confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    /// At most `max_rows` data rows, trimmed.
    pub rows: Vec<StagedRow>,
    /// Every data row in the file, including the ones beyond the cap.
    pub total_rows: usize,
    pub truncated: bool,
    pub mapping: ColumnMapping,
}

/// One data row and the line of the file it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    /// 1-based; the header is line 1. Blank lines and line breaks inside
    /// quoted fields are counted.
    pub line: usize,
    pub values: Vec<String>,
}

/// What the client sees after uploading a file.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportPreview {
    pub headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub mapping: ColumnMapping,
    pub total_rows: usize,
    /// Rows staged for import (capped).
    pub staged_rows: usize,
    pub truncated: bool,
}

/// Reads an uploaded CSV.
///
/// Invalid UTF-8 sequences are dropped rather than failing the upload, a
/// leading BOM is ignored, and ragged rows are accepted.
///
/// ## Errors
/// `ValidationError` when the file is empty, has no header, has no data
/// rows, or is not CSV at all.
pub fn parse_csv(bytes: &[u8], max_rows: usize) -> Result<ParsedCsv, ValidationError> {
    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    let text = text.trim_start_matches('\u{feff}');

    if text.trim().is_empty() {
        return Err(ValidationError::required("file"));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ValidationError::invalid("file", e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(ValidationError::invalid("file", "missing header row"));
    }

    let mut rows = Vec::new();
    let mut total_rows = 0usize;

    for record in reader.records() {
        let record = record.map_err(|e| ValidationError::invalid("file", e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        total_rows += 1;
        if rows.len() < max_rows {
            let line = record
                .position()
                .and_then(|p| usize::try_from(p.line()).ok())
                .unwrap_or(total_rows + 1);
            rows.push(StagedRow {
                line,
                values: record.iter().map(str::to_string).collect(),
            });
        }
    }

    if total_rows == 0 {
        return Err(ValidationError::invalid("file", "no data rows"));
    }

    let mapping = ColumnMapping::infer(&headers);

    Ok(ParsedCsv {
        truncated: total_rows > rows.len(),
        headers,
        rows,
        total_rows,
        mapping,
    })
}

impl ParsedCsv {
    pub fn preview(&self, sample_size: usize) -> ImportPreview {
        ImportPreview {
            headers: self.headers.clone(),
            sample_rows: self
                .rows
                .iter()
                .take(sample_size)
                .map(|row| row.values.clone())
                .collect(),
            mapping: self.mapping.clone(),
            total_rows: self.total_rows,
            staged_rows: self.rows.len(),
            truncated: self.truncated,
        }
    }
}

// =============================================================================
// Row Validation (Phase 2)
// =============================================================================

/// Why a single row was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, thiserror::Error)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowRejection {
    #[error("invalid type '{value}', expected entrada or saida")]
    InvalidType { value: String },

    #[error("origin is required")]
    MissingOrigin,

    #[error("invalid amount '{value}', expected a positive number")]
    InvalidAmount { value: String },

    #[error("invalid date '{value}'")]
    InvalidDate { value: String },
}

/// A row left out of the import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RejectedRow {
    /// 1-based line in the file; the header is line 1.
    pub line: usize,
    pub values: Vec<String>,
    pub reason: RowRejection,
    pub message: String,
}

/// Result of validating every staged row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    pub valid: Vec<NewMovement>,
    pub rejected: Vec<RejectedRow>,
}

/// What the client sees after confirming.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportOutcome {
    pub imported: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Validates every staged row against `mapping`.
///
/// ## Errors
/// `ValidationError` when type, origin or amount is unmapped: without them
/// no row could ever pass.
pub fn plan_import(parsed: &ParsedCsv, mapping: &ColumnMapping) -> Result<ImportPlan, ValidationError> {
    for field in [ImportField::Type, ImportField::Origin, ImportField::Amount] {
        if mapping.get(field).is_none() {
            return Err(ValidationError::required(&format!("mapping.{}", field.name())));
        }
    }

    let columns = mapping.resolve(&parsed.headers);
    let mut plan = ImportPlan {
        valid: Vec::with_capacity(parsed.rows.len()),
        rejected: Vec::new(),
    };

    for row in &parsed.rows {
        match validate_row(&row.values, &columns) {
            Ok(movement) => plan.valid.push(movement),
            Err(reason) => plan.rejected.push(RejectedRow {
                line: row.line,
                values: row.values.clone(),
                message: reason.to_string(),
                reason,
            }),
        }
    }

    Ok(plan)
}

fn cell<'a>(row: &'a [String], column: Option<usize>) -> &'a str {
    column
        .and_then(|i| row.get(i))
        .map(|v| v.trim())
        .unwrap_or("")
}

fn validate_row(row: &[String], columns: &ResolvedColumns) -> Result<NewMovement, RowRejection> {
    let raw_type = cell(row, columns.movement_type);
    let movement_type = MovementType::from_import(raw_type).ok_or_else(|| RowRejection::InvalidType {
        value: raw_type.to_string(),
    })?;

    let origin = cell(row, columns.origin).to_lowercase();
    if origin.is_empty() {
        return Err(RowRejection::MissingOrigin);
    }

    let raw_amount = cell(row, columns.amount);
    let amount = Money::parse(raw_amount)
        .ok()
        .filter(Money::is_positive)
        .ok_or_else(|| RowRejection::InvalidAmount {
            value: raw_amount.to_string(),
        })?;

    let raw_date = cell(row, columns.date);
    let created_at = if raw_date.is_empty() {
        None
    } else {
        Some(parse_import_date(raw_date).ok_or_else(|| RowRejection::InvalidDate {
            value: raw_date.to_string(),
        })?)
    };

    let raw_reference = cell(row, columns.reference_id);
    let reference_id = if !raw_reference.is_empty() && raw_reference.chars().all(|c| c.is_ascii_digit()) {
        raw_reference.parse::<i64>().ok()
    } else {
        None
    };

    let payment_method = Some(cell(row, columns.payment_method).to_lowercase()).filter(|p| !p.is_empty());

    Ok(NewMovement {
        movement_type,
        origin,
        amount,
        description: Some(mark_imported(cell(row, columns.description))),
        payment_method,
        reference_id,
        created_at,
    })
}

/// Appends the import marker to a description unless it is already there.
///
/// ```rust
/// use caixa_core::import::mark_imported;
///
/// assert_eq!(mark_imported("Venda balcão"), "Venda balcão [IMPORTADO]");
/// assert_eq!(mark_imported(""), "[IMPORTADO]");
/// assert_eq!(mark_imported("x [IMPORTADO]"), "x [IMPORTADO]");
/// ```
pub fn mark_imported(description: &str) -> String {
    let description = description.trim();
    if description.contains(IMPORT_MARKER) {
        description.to_string()
    } else if description.is_empty() {
        IMPORT_MARKER.to_string()
    } else {
        format!("{} {}", description, IMPORT_MARKER)
    }
}

/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY`, `YYYY-MM-DD HH:MM[:SS]` and RFC 3339.
/// Dates without a time are taken as midnight UTC.
pub fn parse_import_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_IMPORT_ROWS, PREVIEW_SAMPLE_ROWS};
    use chrono::{Datelike, Timelike};

    const SAMPLE: &str = "Tipo,Origem,Valor,Descrição,Forma_Pagamento,ID\n\
                          entrada,venda,10.00,Balcão,PIX,15\n\
                          entrada,venda,-5,Estorno,,\n\
                          SAIDA,Sangria,\"2,50\",,dinheiro,abc\n";

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_infer_mapping_case_insensitive() {
        let mapping = ColumnMapping::infer(&headers(&["Data", "TIPO", "origin", "Valor", "Descrição", "ref_id"]));

        assert_eq!(mapping.movement_type.as_deref(), Some("TIPO"));
        assert_eq!(mapping.origin.as_deref(), Some("origin"));
        assert_eq!(mapping.amount.as_deref(), Some("Valor"));
        assert_eq!(mapping.description.as_deref(), Some("Descrição"));
        assert_eq!(mapping.reference_id.as_deref(), Some("ref_id"));
        assert_eq!(mapping.date.as_deref(), Some("Data"));
        assert_eq!(mapping.payment_method, None);
    }

    #[test]
    fn test_overrides_replace_and_validate() {
        let hs = headers(&["kind", "source", "total", "tipo"]);
        let inferred = ColumnMapping::infer(&hs);
        assert_eq!(inferred.movement_type.as_deref(), Some("tipo"));

        let overrides = ColumnMapping {
            movement_type: Some("KIND".to_string()),
            origin: Some("source".to_string()),
            amount: Some("total".to_string()),
            ..Default::default()
        };
        let merged = inferred.with_overrides(&overrides, &hs).unwrap();
        assert_eq!(merged.movement_type.as_deref(), Some("kind"));
        assert_eq!(merged.amount.as_deref(), Some("total"));

        let bad = ColumnMapping {
            amount: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(inferred.with_overrides(&bad, &hs).is_err());
    }

    #[test]
    fn test_parse_csv_preview() {
        let parsed = parse_csv(SAMPLE.as_bytes(), MAX_IMPORT_ROWS).unwrap();
        assert_eq!(parsed.headers.len(), 6);
        assert_eq!(parsed.total_rows, 3);
        assert!(!parsed.truncated);

        let preview = parsed.preview(PREVIEW_SAMPLE_ROWS);
        assert_eq!(preview.sample_rows.len(), 3);
        assert_eq!(preview.sample_rows[2][2], "2,50");
        assert_eq!(preview.mapping.payment_method.as_deref(), Some("Forma_Pagamento"));
    }

    #[test]
    fn test_parse_csv_caps_rows_and_flags_truncation() {
        let mut csv = String::from("tipo,origem,valor\n");
        for _ in 0..12 {
            csv.push_str("entrada,venda,1\n");
        }

        let parsed = parse_csv(csv.as_bytes(), 10).unwrap();
        assert_eq!(parsed.rows.len(), 10);
        assert_eq!(parsed.total_rows, 12);
        assert!(parsed.truncated);
        assert_eq!(parsed.preview(5).sample_rows.len(), 5);
    }

    #[test]
    fn test_parse_csv_drops_invalid_utf8() {
        let mut bytes = b"tipo,origem,valor,descricao\nentrada,venda,1,caf".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"e\n");

        let parsed = parse_csv(&bytes, MAX_IMPORT_ROWS).unwrap();
        assert_eq!(parsed.rows[0].values[3], "cafe");
    }

    #[test]
    fn test_parse_csv_rejects_empty() {
        assert!(parse_csv(b"", MAX_IMPORT_ROWS).is_err());
        assert!(parse_csv(b"tipo,origem,valor\n", MAX_IMPORT_ROWS).is_err());
    }

    #[test]
    fn test_plan_import_rejects_bad_rows() {
        let parsed = parse_csv(SAMPLE.as_bytes(), MAX_IMPORT_ROWS).unwrap();
        let plan = plan_import(&parsed, &parsed.mapping).unwrap();

        assert_eq!(plan.valid.len(), 2);
        assert_eq!(plan.rejected.len(), 1);

        let rejected = &plan.rejected[0];
        assert_eq!(rejected.line, 3);
        assert_eq!(
            rejected.reason,
            RowRejection::InvalidAmount {
                value: "-5".to_string()
            }
        );

        let first = &plan.valid[0];
        assert_eq!(first.amount.cents(), 1000);
        assert_eq!(first.reference_id, Some(15));
        assert_eq!(first.payment_method.as_deref(), Some("pix"));
        assert_eq!(first.description.as_deref(), Some("Balcão [IMPORTADO]"));

        let second = &plan.valid[1];
        assert_eq!(second.movement_type, MovementType::Out);
        assert_eq!(second.origin, "sangria");
        assert_eq!(second.amount.cents(), 250);
        assert_eq!(second.reference_id, None);
        assert_eq!(second.description.as_deref(), Some("[IMPORTADO]"));
    }

    #[test]
    fn test_rejected_line_counts_blank_and_multiline_rows() {
        let csv = "tipo,origem,valor,descricao\n\
                   entrada,venda,10,\"linha um\nlinha dois\"\n\
                   \n\
                   saida,sangria,abc,Troco\n";
        let parsed = parse_csv(csv.as_bytes(), MAX_IMPORT_ROWS).unwrap();
        assert_eq!(parsed.rows[0].line, 2);
        assert_eq!(parsed.rows[1].line, 5);

        let plan = plan_import(&parsed, &parsed.mapping).unwrap();
        assert_eq!(plan.valid.len(), 1);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].line, 5);
    }

    #[test]
    fn test_plan_import_type_origin_and_date_rules() {
        let csv = "tipo,origem,valor,data\n\
                   transfer,venda,1,\n\
                   entrada,,1,\n\
                   entrada,venda,1,31/02/2024\n\
                   entrada,venda,1,15/03/2024\n";
        let parsed = parse_csv(csv.as_bytes(), MAX_IMPORT_ROWS).unwrap();
        let plan = plan_import(&parsed, &parsed.mapping).unwrap();

        assert_eq!(plan.valid.len(), 1);
        assert!(matches!(plan.rejected[0].reason, RowRejection::InvalidType { .. }));
        assert_eq!(plan.rejected[1].reason, RowRejection::MissingOrigin);
        assert!(matches!(plan.rejected[2].reason, RowRejection::InvalidDate { .. }));

        let date = plan.valid[0].created_at.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 15));
    }

    #[test]
    fn test_plan_import_requires_core_columns() {
        let parsed = parse_csv(b"foo,bar\n1,2\n", MAX_IMPORT_ROWS).unwrap();
        assert!(plan_import(&parsed, &parsed.mapping).is_err());
    }

    #[test]
    fn test_parse_import_date_formats() {
        let dt = parse_import_date("2024-05-01 13:45").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (13, 45));
        assert!(parse_import_date("2024-05-01T10:00:00-03:00").is_some());
        assert!(parse_import_date("2024-05-01").is_some());
        assert!(parse_import_date("01/05/2024").is_some());
        assert!(parse_import_date("ontem").is_none());
    }
}
