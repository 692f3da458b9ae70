use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::purchase_orders::PurchaseOrderDraft;
use super::{non_empty, OrderFlowService};
use crate::audit::{AuditAction, AuditEntry, EntityKind};
use crate::error::OrderFlowError;
use crate::ingestion::{
    apply_mapping, parse_sheet, validate_rows, CandidateItem, ColumnMapping, ExtractedOrder,
    UploadKind, ValidRow,
};
use crate::model::{checked_total, normalize_currency, Archive, PurchaseOrder};
use crate::ports::Result;
use crate::principal::Actor;
use crate::status::OrderOrigin;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: UploadedFile,
    pub use_ai: bool,
    pub client_id: Option<Uuid>,
}

/// Staged upload. Nothing is created until the caller confirms.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Headers and first rows, so the caller can supply a column mapping.
    Spreadsheet {
        archive: Archive,
        headers: Vec<String>,
        preview: Vec<Vec<String>>,
        total_rows: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        ai_fallback_reason: Option<String>,
    },
    /// AI payload for review. `client_id` is set when the extracted tax id
    /// matched a known client.
    Ai {
        archive: Archive,
        extracted: ExtractedOrder,
        client_id: Option<Uuid>,
        computed_total: Decimal,
        extracted_total: Option<Decimal>,
    },
}

impl UploadOutcome {
    pub fn archive(&self) -> &Archive {
        match self {
            Self::Spreadsheet { archive, .. } | Self::Ai { archive, .. } => archive,
        }
    }
}

/// Confirmation of a staged upload: either a column mapping for the
/// spreadsheet path, or the (possibly edited) AI payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmIngestion {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub column_mapping: Option<ColumnMapping>,
    #[serde(default)]
    pub use_ai: bool,
    #[serde(default)]
    pub extracted: Option<ExtractedOrder>,
}

fn storage_key(archive_id: Uuid, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("purchase-orders/{archive_id}/{safe}")
}

fn rows_total(rows: &[ValidRow]) -> Result<Decimal> {
    checked_total(rows.iter().map(ValidRow::subtotal))
}

impl OrderFlowService {
    /// Persist the uploaded file, then stage it for confirmation: through the
    /// AI extractor when requested and available, otherwise as a spreadsheet
    /// preview.
    pub async fn upload_purchase_order_file(
        &self,
        actor: &Actor,
        request: UploadRequest,
    ) -> Result<UploadOutcome> {
        let UploadRequest { file, use_ai, client_id } = request;
        let client_id = client_id.or(actor.client_scope());
        if let Some(id) = client_id {
            actor.require_client_access(id)?;
            self.require_client(id).await?;
        }
        let kind = UploadKind::detect(&file.file_name, &file.mime_type).ok_or_else(|| {
            OrderFlowError::UnsupportedFile(format!(
                "{} ({})",
                file.file_name, file.mime_type
            ))
        })?;
        if file.bytes.is_empty() {
            return Err(OrderFlowError::InvalidInput("uploaded file is empty".into()));
        }

        let archive = self.persist_archive(actor, &file, client_id).await?;

        let mut fallback_reason = None;
        if use_ai {
            match self.extractor.as_ref() {
                None => fallback_reason = Some("AI extraction is not configured".to_string()),
                Some(extractor) => match extractor.extract(&file.bytes, &file.mime_type).await {
                    Ok(extracted) => match validate_rows(&extracted.candidates()) {
                        Ok(rows) => {
                            return self
                                .stage_extraction(archive, extracted, client_id, &rows)
                                .await;
                        }
                        Err(_) => fallback_reason = Some("no line items extracted".to_string()),
                    },
                    Err(e) if e.is_parse_failure() => {
                        tracing::error!(archive_id = %archive.id, error = %e, "AI response unparseable");
                        return Err(e.into());
                    }
                    Err(e) => fallback_reason = Some(e.to_string()),
                },
            }
            tracing::warn!(
                archive_id = %archive.id,
                reason = fallback_reason.as_deref().unwrap_or_default(),
                "AI extraction unavailable, falling back to spreadsheet parsing"
            );
        }

        let format = kind.spreadsheet().ok_or_else(|| {
            OrderFlowError::UnsupportedFile(format!(
                "{} can only be read with AI extraction",
                file.file_name
            ))
        })?;
        let table = parse_sheet(&file.bytes, format)?;
        Ok(UploadOutcome::Spreadsheet {
            archive,
            preview: table.preview(),
            total_rows: table.rows.len(),
            headers: table.headers,
            ai_fallback_reason: fallback_reason,
        })
    }

    /// Store the raw bytes and the archive record. The blob is removed again
    /// only when the record cannot be written.
    async fn persist_archive(
        &self,
        actor: &Actor,
        file: &UploadedFile,
        client_id: Option<Uuid>,
    ) -> Result<Archive> {
        let id = Uuid::new_v4();
        let storage_ref = self
            .ports
            .blobs
            .store(&storage_key(id, &file.file_name), &file.bytes, &file.mime_type)
            .await?;
        let archive = Archive {
            id,
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.bytes.len() as i64,
            storage_ref,
            uploaded_by: actor.user_id,
            client_id,
            created_at: Utc::now(),
        };
        if let Err(e) = self.ports.archives.create(&archive).await {
            tracing::warn!(archive_id = %id, error = %e, "archive persist failed, removing blob");
            if let Err(cleanup) = self.ports.blobs.delete(&archive.storage_ref).await {
                tracing::error!(storage_ref = %archive.storage_ref, error = %cleanup, "blob cleanup failed");
            }
            return Err(e);
        }
        tracing::info!(
            archive_id = %id,
            file_name = %archive.file_name,
            size = archive.size_bytes,
            "upload archived"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::Archive, id, AuditAction::Create).with_diff(
                    json!({ "fileName": archive.file_name, "sizeBytes": archive.size_bytes }),
                ),
            )
            .await;
        Ok(archive)
    }

    async fn stage_extraction(
        &self,
        archive: Archive,
        extracted: ExtractedOrder,
        client_id: Option<Uuid>,
        rows: &[ValidRow],
    ) -> Result<UploadOutcome> {
        let client_id = match client_id {
            Some(id) => Some(id),
            None => self.client_by_tax_id(&extracted).await?,
        };
        let computed_total = rows_total(rows)?;
        if let Some(total) = extracted.total.filter(|t| *t != computed_total) {
            tracing::warn!(
                archive_id = %archive.id,
                extracted_total = %total,
                %computed_total,
                "extracted total differs from line items"
            );
        }
        Ok(UploadOutcome::Ai {
            archive,
            extracted_total: extracted.total,
            extracted,
            client_id,
            computed_total,
        })
    }

    async fn client_by_tax_id(&self, extracted: &ExtractedOrder) -> Result<Option<Uuid>> {
        let Some(tax_id) = extracted.tax_id() else {
            return Ok(None);
        };
        let found = self.ports.clients.find_by_tax_id(tax_id).await?;
        if found.is_none() {
            tracing::info!(tax_id, "extracted tax id matches no client");
        }
        Ok(found.map(|c| c.id))
    }

    /// Turn a staged upload into a purchase order. Invalid rows are dropped;
    /// the total is always recomputed from the rows that remain.
    pub async fn confirm_purchase_order_from_ingestion(
        &self,
        actor: &Actor,
        archive_id: Uuid,
        input: ConfirmIngestion,
    ) -> Result<PurchaseOrder> {
        let archive = self
            .ports
            .archives
            .get(archive_id)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("archive {archive_id}")))?;
        if !actor.is_admin() && archive.uploaded_by != actor.user_id {
            return Err(OrderFlowError::Forbidden(
                "archive was uploaded by another user".into(),
            ));
        }

        let ConfirmIngestion {
            client_id,
            currency,
            notes,
            column_mapping,
            use_ai,
            extracted,
        } = input;

        let (candidates, extracted, origin, action): (Vec<CandidateItem>, _, _, _) =
            match (column_mapping, extracted) {
                (Some(mapping), _) => (
                    self.read_mapped_rows(&archive, &mapping).await?,
                    None,
                    OrderOrigin::File,
                    AuditAction::CreateFromFile,
                ),
                (None, Some(extracted)) => (
                    extracted.candidates(),
                    Some(extracted),
                    OrderOrigin::Ai,
                    AuditAction::CreateFromAi,
                ),
                (None, None) if use_ai => {
                    let extracted = self.reextract(&archive).await?;
                    (
                        extracted.candidates(),
                        Some(extracted),
                        OrderOrigin::Ai,
                        AuditAction::CreateFromAi,
                    )
                }
                (None, None) => {
                    return Err(OrderFlowError::InvalidInput(
                        "column_mapping or extracted data is required".into(),
                    ))
                }
            };
        let rows = validate_rows(&candidates)?;

        let client_id = match client_id.or(archive.client_id) {
            Some(id) => Some(id),
            None => match extracted.as_ref() {
                Some(e) => self.client_by_tax_id(e).await?,
                None => None,
            },
        }
        .or(actor.client_scope())
        .ok_or_else(|| {
            OrderFlowError::InvalidInput("client_id is required: no client matched the upload".into())
        })?;
        actor.require_client_access(client_id)?;
        self.require_client(client_id).await?;

        let currency = normalize_currency(
            non_empty(currency)
                .or_else(|| extracted.as_ref().and_then(|e| e.currency.clone()))
                .as_deref(),
        )?;
        let notes = non_empty(notes)
            .or_else(|| non_empty(extracted.as_ref().and_then(|e| e.notes.clone())));

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(
                self.resolve_line_item(
                    row.sku.clone(),
                    row.description.clone(),
                    row.quantity,
                    row.unit_price,
                )
                .await?,
            );
        }

        let draft = PurchaseOrderDraft {
            client_id,
            currency,
            origin,
            notes,
            archive_id: Some(archive.id),
            items,
        };
        let preferred_code = extracted.as_ref().and_then(|e| e.order_number());
        let order = self
            .insert_purchase_order(actor, draft, preferred_code)
            .await?;

        if let Some(total) = extracted.as_ref().and_then(|e| e.total) {
            if total != order.total {
                tracing::warn!(
                    code = %order.code,
                    extracted_total = %total,
                    total = %order.total,
                    "extracted total ignored in favour of line items"
                );
            }
        }
        tracing::info!(
            code = %order.code,
            archive_id = %archive.id,
            kept = rows.len(),
            dropped = candidates.len() - rows.len(),
            "purchase order created from upload"
        );
        self.audit
            .record(
                AuditEntry::new(actor, EntityKind::PurchaseOrder, order.id, action).with_diff(json!({
                    "code": order.code,
                    "archiveId": archive.id,
                    "total": order.total,
                    "rows": candidates.len(),
                    "kept": rows.len(),
                })),
            )
            .await;
        Ok(order)
    }

    async fn read_mapped_rows(
        &self,
        archive: &Archive,
        mapping: &ColumnMapping,
    ) -> Result<Vec<CandidateItem>> {
        let format = UploadKind::detect(&archive.file_name, &archive.mime_type)
            .and_then(|k| k.spreadsheet())
            .ok_or_else(|| {
                OrderFlowError::UnsupportedFile(format!(
                    "{} is not a spreadsheet",
                    archive.file_name
                ))
            })?;
        let bytes = self.ports.blobs.fetch(&archive.storage_ref).await?;
        let table = parse_sheet(&bytes, format)?;
        apply_mapping(&table, mapping)
    }

    /// Re-run extraction on the stored file. No fallback at this stage.
    async fn reextract(&self, archive: &Archive) -> Result<ExtractedOrder> {
        let extractor =
            self.extractor
                .as_ref()
                .ok_or_else(|| OrderFlowError::AiExtractionFailed {
                    message: "AI extraction is not configured".into(),
                    excerpt: None,
                })?;
        let bytes = self.ports.blobs.fetch(&archive.storage_ref).await?;
        Ok(extractor.extract(&bytes, &archive.mime_type).await?)
    }
}
