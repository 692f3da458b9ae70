//! Purchase order file ingestion.
//!
//! POST /api/purchase-orders/upload                      - multipart: file, use_ai, client_id
//! POST /api/purchase-orders/uploads/:archive_id/confirm - create the OC from a staged upload

use std::sync::Arc;

use axum::extract::{Multipart, Path};
use axum::{Extension, Json};
use orderflow_core::error::OrderFlowError;
use orderflow_core::model::PurchaseOrder;
use orderflow_core::principal::Actor;
use orderflow_core::service::{
    ConfirmIngestion, OrderFlowService, UploadOutcome, UploadRequest, UploadedFile,
};
use uuid::Uuid;

use super::{ok, ApiResponse};
use crate::error::AppError;

fn multipart_err(e: axum::extract::multipart::MultipartError) -> OrderFlowError {
    OrderFlowError::InvalidInput(format!("multipart: {}", e.body_text()))
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, OrderFlowError> {
    let mut file = None;
    let mut use_ai = false;
    let mut client_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_err)?.to_vec();
                file = Some(UploadedFile {
                    file_name,
                    mime_type,
                    bytes,
                });
            }
            "use_ai" => use_ai = parse_flag(&field.text().await.map_err(multipart_err)?),
            "client_id" => {
                let raw = field.text().await.map_err(multipart_err)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    client_id = Some(Uuid::parse_str(raw).map_err(|_| {
                        OrderFlowError::InvalidInput(format!("client_id is not a uuid: {raw}"))
                    })?);
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let file = file.ok_or_else(|| OrderFlowError::InvalidInput("missing file field".into()))?;
    Ok(UploadRequest {
        file,
        use_ai,
        client_id,
    })
}

pub async fn upload(
    Extension(actor): Extension<Actor>,
    Extension(service): Extension<Arc<OrderFlowService>>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<UploadOutcome>>, AppError> {
    let request = read_upload(multipart).await?;
    Ok(ok(service.upload_purchase_order_file(&actor, request).await?))
}

pub async fn confirm(
    Extension(actor): Extension<Actor>,
    Extension(service): Extension<Arc<OrderFlowService>>,
    Path(archive_id): Path<Uuid>,
    Json(input): Json<ConfirmIngestion>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    let order = service
        .confirm_purchase_order_from_ingestion(&actor, archive_id, input)
        .await?;
    Ok(ok(order))
}
