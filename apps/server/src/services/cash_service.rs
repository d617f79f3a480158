//! Cash register service.
//!
//! Turns request payloads into validated domain values and drives the
//! repositories. Everything here is scoped to one tenant.
//!
//! ## Import Flow
//! ```text
//! preview(session, csv bytes)                 confirm(session, overrides)
//!      │                                            │
//!      ▼                                            ▼
//! parse_csv (cap rows, infer mapping)         previews.take ── none ──► NoImportPreview
//!      │                                            │
//!      ▼                                            ▼
//! previews.insert((tenant, session))          mapping.with_overrides
//!      │                                            │
//!      ▼                                            ▼
//! ImportPreview (50 sample rows)              plan_import ──► valid + rejected
//!                                                   │
//!                                                   ▼
//!                                             insert_batch (one transaction)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use caixa_core::import::{parse_csv, plan_import, ColumnMapping, ImportOutcome, ImportPreview};
use caixa_core::ledger::{parse_balance, parse_positive_amount, Reconciliation};
use caixa_core::report::{DateRange, ExportFormat, LedgerReport};
use caixa_core::validation::{
    optional_text, require_text, validate_product_name, validate_quantity,
};
use caixa_core::{
    AmountInput, CashMovement, CashSession, CoreError, DashboardSummary, MovementType,
    NewMovement, Page, Product, SessionDetail, SessionStatus, TenantId, ValidationError,
    PAYMENT_METHODS,
};
use caixa_db::{NewProduct, QuickSale, QuickSaleKind, QuickSaleReceipt};

use crate::error::ApiResult;
use crate::export::{self, ExportFile};
use crate::state::AppState;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub opening_balance: Option<AmountInput>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloseSessionRequest {
    #[serde(default)]
    pub closing_balance: Option<AmountInput>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementRequest {
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub origin: String,
    #[serde(default)]
    pub amount: Option<AmountInput>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub reference_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuickSaleRequest {
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Used when no product is given
    #[serde(default)]
    pub amount: Option<AmountInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmImportRequest {
    #[serde(default)]
    pub mapping: ColumnMapping,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionListQuery {
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price: Option<AmountInput>,
    #[serde(default)]
    pub initial_stock: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    pub session: CashSession,
    pub reconciliation: Reconciliation,
}

// =============================================================================
// Service
// =============================================================================

pub struct CashService<'a> {
    state: &'a AppState,
}

impl<'a> CashService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        CashService { state }
    }

    // ===== Session Lifecycle =====

    pub async fn open(&self, tenant: TenantId, req: &OpenSessionRequest) -> ApiResult<CashSession> {
        let opening = parse_balance("opening_balance", req.opening_balance.as_ref())?;
        let session = self
            .state
            .db
            .sessions()
            .open(tenant, opening, optional_text(req.notes.as_deref()))
            .await?;
        Ok(session)
    }

    pub async fn close(&self, tenant: TenantId, req: &CloseSessionRequest) -> ApiResult<CloseOutcome> {
        let declared = parse_balance("closing_balance", req.closing_balance.as_ref())?;
        let (session, reconciliation) = self
            .state
            .db
            .sessions()
            .close(tenant, declared, optional_text(req.notes.as_deref()))
            .await?;

        Ok(CloseOutcome {
            session,
            reconciliation,
        })
    }

    pub async fn current(&self, tenant: TenantId) -> ApiResult<Option<CashSession>> {
        Ok(self.state.db.sessions().current(tenant).await?)
    }

    pub async fn list(&self, tenant: TenantId, query: &SessionListQuery) -> ApiResult<Page<CashSession>> {
        let page = self
            .state
            .db
            .sessions()
            .list(
                tenant,
                query.status,
                query.page.unwrap_or(1),
                query.per_page.unwrap_or(20),
            )
            .await?;
        Ok(page)
    }

    pub async fn detail(&self, tenant: TenantId, session_id: i64) -> ApiResult<SessionDetail> {
        Ok(self.state.db.sessions().detail(tenant, session_id).await?)
    }

    // ===== Movements & Sales =====

    pub async fn record_movement(&self, tenant: TenantId, req: &MovementRequest) -> ApiResult<CashMovement> {
        let movement = NewMovement {
            movement_type: req.movement_type,
            origin: require_text("origin", &req.origin)?.to_lowercase(),
            amount: parse_positive_amount("amount", req.amount.as_ref())?,
            description: optional_text(req.description.as_deref()),
            payment_method: optional_text(req.payment_method.as_deref()),
            reference_id: req.reference_id,
            created_at: None,
        };

        Ok(self.state.db.movements().record(tenant, &movement).await?)
    }

    /// Sells one product line, or registers a plain amount when no product
    /// is given.
    pub async fn quick_sale(&self, tenant: TenantId, req: &QuickSaleRequest) -> ApiResult<QuickSaleReceipt> {
        let payment_method = require_text("payment_method", &req.payment_method)?.to_lowercase();
        if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
            return Err(ValidationError::invalid(
                "payment_method",
                format!("must be one of {}", PAYMENT_METHODS.join(", ")),
            )
            .into());
        }

        let kind = match req.product_id {
            Some(product_id) => {
                let quantity = req.quantity.unwrap_or(1);
                validate_quantity(quantity)?;
                QuickSaleKind::Product {
                    product_id,
                    quantity,
                }
            }
            None => QuickSaleKind::Amount(parse_positive_amount("amount", req.amount.as_ref())?),
        };

        let sale = QuickSale {
            payment_method,
            notes: optional_text(req.notes.as_deref()),
            kind,
        };

        Ok(self.state.db.sales().quick_sale(tenant, &sale).await?)
    }

    /// Sales since the open session started, or since midnight UTC when the
    /// drawer is closed.
    pub async fn dashboard(&self, tenant: TenantId) -> ApiResult<DashboardSummary> {
        let open = self.state.db.sessions().current(tenant).await?;
        let since = match &open {
            Some(session) => session.opened_at,
            None => start_of_day(Utc::now()),
        };

        Ok(self.state.db.sales().dashboard(tenant, since, open).await?)
    }

    // ===== Import =====

    /// Phase 1: parses and stages the file. Replaces any earlier staging for
    /// the same session.
    pub async fn import_preview(
        &self,
        tenant: TenantId,
        session_id: i64,
        bytes: &[u8],
    ) -> ApiResult<ImportPreview> {
        self.state.db.sessions().require(tenant, session_id).await?;

        let parsed = parse_csv(bytes, self.state.config.import_max_rows)?;
        if parsed.truncated {
            warn!(
                tenant_id = tenant,
                session_id,
                total_rows = parsed.total_rows,
                staged_rows = parsed.rows.len(),
                "Import file exceeds row cap, extra rows will not be imported"
            );
        }

        let preview = parsed.preview(self.state.config.preview_sample_rows);
        self.state.previews.insert((tenant, session_id), parsed).await;

        info!(
            tenant_id = tenant,
            session_id,
            rows = preview.staged_rows,
            "Import staged"
        );
        Ok(preview)
    }

    /// Phase 2: validates the staged rows and inserts the valid ones.
    ///
    /// The staging is consumed even when validation or the insert fails.
    pub async fn import_confirm(
        &self,
        tenant: TenantId,
        session_id: i64,
        req: &ConfirmImportRequest,
    ) -> ApiResult<ImportOutcome> {
        let parsed = self
            .state
            .previews
            .take(&(tenant, session_id))
            .await
            .ok_or(CoreError::NoImportPreview)?;

        let mapping = parsed.mapping.with_overrides(&req.mapping, &parsed.headers)?;
        let plan = plan_import(&parsed, &mapping)?;

        let imported = self
            .state
            .db
            .movements()
            .insert_batch(tenant, session_id, &plan.valid)
            .await?;

        info!(
            tenant_id = tenant,
            session_id,
            imported,
            rejected = plan.rejected.len(),
            "Import confirmed"
        );
        Ok(ImportOutcome {
            imported,
            rejected: plan.rejected,
        })
    }

    // ===== Export =====

    pub async fn export(
        &self,
        tenant: TenantId,
        session_id: i64,
        format: ExportFormat,
        query: &ExportQuery,
    ) -> ApiResult<ExportFile> {
        let range = DateRange::new(query.from, query.to)?;
        let session = self.state.db.sessions().require(tenant, session_id).await?;
        let movements = self.state.db.movements().list(tenant, session_id).await?;

        let report = LedgerReport::build(&session, &movements, &range)?;
        let file = export::render(&report, format)?;

        info!(
            tenant_id = tenant,
            session_id,
            format = format.extension(),
            rows = report.rows.len(),
            bytes = file.bytes.len(),
            "Ledger exported"
        );
        Ok(file)
    }

    // ===== Catalogue =====

    pub async fn create_product(&self, tenant: TenantId, req: &ProductRequest) -> ApiResult<Product> {
        validate_product_name(&req.name)?;
        if req.initial_stock < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "initial_stock".to_string(),
            }
            .into());
        }

        let product = NewProduct {
            name: req.name.trim().to_string(),
            sku: optional_text(req.sku.as_deref()),
            price: parse_positive_amount("price", req.price.as_ref())?,
            initial_stock: req.initial_stock,
        };

        Ok(self.state.db.products().insert(tenant, &product).await?)
    }

    pub async fn list_products(&self, tenant: TenantId) -> ApiResult<Vec<Product>> {
        Ok(self.state.db.products().list(tenant, 500).await?)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::tests::web_login;
    use crate::state::tests::test_state;
    use caixa_core::import::RowRejection;
    use caixa_core::{Money, IMPORT_MARKER};

    fn amount(value: &str) -> Option<AmountInput> {
        Some(AmountInput::from(value))
    }

    fn open_request(value: &str) -> OpenSessionRequest {
        OpenSessionRequest {
            opening_balance: amount(value),
            notes: None,
        }
    }

    fn close_request(value: &str) -> CloseSessionRequest {
        CloseSessionRequest {
            closing_balance: amount(value),
            notes: Some("Fechamento".to_string()),
        }
    }

    fn movement(movement_type: MovementType, origin: &str, value: &str) -> MovementRequest {
        MovementRequest {
            movement_type,
            origin: origin.to_string(),
            amount: amount(value),
            description: None,
            payment_method: None,
            reference_id: None,
        }
    }

    async fn tenant(state: &AppState) -> TenantId {
        web_login(state, "ana").await.tenant_id
    }

    #[tokio::test]
    async fn test_open_balance_rules() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);

        let err = cash.open(tenant, &open_request("-1")).await.unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        let err = cash.open(tenant, &OpenSessionRequest::default()).await.unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");

        let session = cash.open(tenant, &open_request("0")).await.unwrap();
        assert!(session.is_open());

        let err = cash.open(tenant, &open_request("10")).await.unwrap_err();
        assert_eq!(err.code, "SESSION_ALREADY_OPEN");
    }

    #[tokio::test]
    async fn test_movement_requires_open_session() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);

        let err = cash
            .record_movement(tenant, &movement(MovementType::In, "venda", "10"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "NO_OPEN_SESSION");

        cash.open(tenant, &open_request("100")).await.unwrap();
        let recorded = cash
            .record_movement(tenant, &movement(MovementType::In, " Venda ", "12,50"))
            .await
            .unwrap();
        assert_eq!(recorded.amount_cents, 1250);
        assert_eq!(recorded.origin, "venda");

        let err = cash
            .record_movement(tenant, &movement(MovementType::Out, "sangria", "0"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_close_reconciles() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);

        cash.open(tenant, &open_request("100")).await.unwrap();
        cash.record_movement(tenant, &movement(MovementType::In, "venda", "300"))
            .await
            .unwrap();
        cash.record_movement(tenant, &movement(MovementType::Out, "sangria", "50"))
            .await
            .unwrap();

        let err = cash.close(tenant, &close_request("340")).await.unwrap_err();
        assert_eq!(err.code, "BALANCE_MISMATCH");
        assert_eq!(err.details.unwrap()["difference"], "-10.00");
        assert!(cash.current(tenant).await.unwrap().is_some());

        let closed = cash.close(tenant, &close_request("350,01")).await.unwrap();
        assert_eq!(closed.session.status, SessionStatus::Closed);
        assert_eq!(closed.reconciliation.expected, Money::from_cents(35000));
        assert!(cash.current(tenant).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_amounts_rejected() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);

        let err = cash.open(tenant, &open_request("92233720368547758")).await.unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert!(cash.current(tenant).await.unwrap().is_none());

        cash.open(tenant, &open_request("99999999999")).await.unwrap();
        cash.record_movement(tenant, &movement(MovementType::In, "venda", "1"))
            .await
            .unwrap();
        let err = cash
            .record_movement(tenant, &movement(MovementType::In, "venda", "100000000000,01"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");

        let err = cash.close(tenant, &close_request("1")).await.unwrap_err();
        assert_eq!(err.code, "BALANCE_MISMATCH");
        let closed = cash.close(tenant, &close_request("100000000000")).await.unwrap();
        assert_eq!(closed.reconciliation.expected, Money::MAX_INPUT);
    }

    #[tokio::test]
    async fn test_quick_sale_validation() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);
        cash.open(tenant, &open_request("0")).await.unwrap();

        let bad_method = QuickSaleRequest {
            payment_method: "cheque".to_string(),
            amount: amount("10"),
            ..QuickSaleRequest::default()
        };
        assert_eq!(cash.quick_sale(tenant, &bad_method).await.unwrap_err().code, "VALIDATION_ERROR");

        let product = cash
            .create_product(
                tenant,
                &ProductRequest {
                    name: "Café".to_string(),
                    sku: None,
                    price: amount("12,50"),
                    initial_stock: 2,
                },
            )
            .await
            .unwrap();

        let too_many = QuickSaleRequest {
            payment_method: "pix".to_string(),
            product_id: Some(product.id),
            quantity: Some(3),
            ..QuickSaleRequest::default()
        };
        assert_eq!(cash.quick_sale(tenant, &too_many).await.unwrap_err().code, "INSUFFICIENT_STOCK");

        let ok = QuickSaleRequest {
            quantity: Some(2),
            ..too_many
        };
        let receipt = cash.quick_sale(tenant, &ok).await.unwrap();
        assert_eq!(receipt.sale.total_cents, 2500);
        assert_eq!(receipt.movement.reference_id, Some(receipt.sale.id));

        let summary = cash.dashboard(tenant).await.unwrap();
        assert_eq!(summary.sale_count, 1);
        assert_eq!(summary.total_sales_cents, 2500);
        assert!(summary.open_session.is_some());
    }

    const CSV: &str = "tipo,origem,valor,descricao\n\
                       entrada,venda,10.00,Balcão\n\
                       saida,sangria,-5,Troco\n\
                       entrada,Suprimento,\"2,50\",\n";

    #[tokio::test]
    async fn test_import_preview_and_confirm() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);
        let session = cash.open(tenant, &open_request("0")).await.unwrap();

        let preview = cash.import_preview(tenant, session.id, CSV.as_bytes()).await.unwrap();
        assert_eq!(preview.total_rows, 3);
        assert!(!preview.truncated);
        assert_eq!(preview.mapping.amount.as_deref(), Some("valor"));
        // Nothing written yet
        assert!(state.db.movements().list(tenant, session.id).await.unwrap().is_empty());

        let outcome = cash
            .import_confirm(tenant, session.id, &ConfirmImportRequest::default())
            .await
            .unwrap();
        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].line, 3);
        assert!(matches!(outcome.rejected[0].reason, RowRejection::InvalidAmount { .. }));

        let movements = state.db.movements().list(tenant, session.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements
            .iter()
            .all(|m| m.description.as_deref().unwrap_or_default().ends_with(IMPORT_MARKER)));
        assert!(movements.iter().any(|m| m.origin == "suprimento"));

        let err = cash
            .import_confirm(tenant, session.id, &ConfirmImportRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "NO_IMPORT_PREVIEW");
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_override_and_missing_session() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);

        let err = cash.import_preview(tenant, 999, CSV.as_bytes()).await.unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");

        let session = cash.open(tenant, &open_request("0")).await.unwrap();
        cash.import_preview(tenant, session.id, CSV.as_bytes()).await.unwrap();

        let req = ConfirmImportRequest {
            mapping: ColumnMapping {
                amount: Some("preco".to_string()),
                ..ColumnMapping::default()
            },
        };
        let err = cash.import_confirm(tenant, session.id, &req).await.unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");

        // The failed confirm consumed the staging
        let err = cash
            .import_confirm(tenant, session.id, &ConfirmImportRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "NO_IMPORT_PREVIEW");
    }

    #[tokio::test]
    async fn test_import_empty_file() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);
        let session = cash.open(tenant, &open_request("0")).await.unwrap();

        let err = cash
            .import_preview(tenant, session.id, b"tipo,origem,valor\n")
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_export_empty_session() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);
        let session = cash.open(tenant, &open_request("100")).await.unwrap();

        let file = cash
            .export(tenant, session.id, ExportFormat::Csv, &ExportQuery::default())
            .await
            .unwrap();
        let text = String::from_utf8(file.bytes).unwrap();
        assert!(text.contains("Entradas,0.00"));
        assert!(text.contains("Saídas,0.00"));
        assert!(text.contains("Saldo parcial,100.00"));
        assert!(file.file_name.ends_with(".csv"));
    }

    #[tokio::test]
    async fn test_export_rejects_inverted_range() {
        let state = test_state().await;
        let tenant = tenant(&state).await;
        let cash = CashService::new(&state);
        let session = cash.open(tenant, &open_request("0")).await.unwrap();

        let query = ExportQuery {
            from: NaiveDate::from_ymd_opt(2025, 2, 1),
            to: NaiveDate::from_ymd_opt(2025, 1, 1),
        };
        let err = cash
            .export(tenant, session.id, ExportFormat::Pdf, &query)
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let state = test_state().await;
        let ana = tenant(&state).await;
        let bia = web_login(&state, "bia").await.tenant_id;
        let cash = CashService::new(&state);

        let session = cash.open(ana, &open_request("0")).await.unwrap();
        assert_eq!(cash.detail(bia, session.id).await.unwrap_err().code, "NOT_FOUND");
        assert!(cash.current(bia).await.unwrap().is_none());
        assert_eq!(cash.list(bia, &SessionListQuery::default()).await.unwrap().total, 0);
    }

    #[test]
    fn test_start_of_day() {
        let now = DateTime::parse_from_rfc3339("2025-03-10T15:42:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(start_of_day(now).to_rfc3339(), "2025-03-10T00:00:00+00:00");
    }
}
