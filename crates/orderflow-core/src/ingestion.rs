//! Document ingestion: upload classification, spreadsheet parsing, column
//! mapping, the AI extraction payload, and row normalization.
//!
//! Row policy, shared by the spreadsheet and AI paths: a row is dropped (not
//! an error) when its SKU is missing, its quantity is missing, non-positive
//! or fractional, or its unit price is missing or negative.

use std::io::Cursor;
use std::str::FromStr;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::OrderFlowError;
use crate::model::line_subtotal;
use crate::ports::ExtractionError;

pub const PREVIEW_ROWS: usize = 5;
const EXCERPT_CHARS: usize = 500;

// ── Upload classification ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    Xls,
    Xlsx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Spreadsheet(SpreadsheetFormat),
    Pdf,
    Image,
}

impl UploadKind {
    /// Classify by extension first, then by declared MIME type.
    pub fn detect(file_name: &str, mime_type: &str) -> Option<Self> {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => return Some(Self::Spreadsheet(SpreadsheetFormat::Csv)),
            "xls" => return Some(Self::Spreadsheet(SpreadsheetFormat::Xls)),
            "xlsx" => return Some(Self::Spreadsheet(SpreadsheetFormat::Xlsx)),
            "pdf" => return Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "webp" => return Some(Self::Image),
            _ => {}
        }
        match mime_type {
            "text/csv" => Some(Self::Spreadsheet(SpreadsheetFormat::Csv)),
            "application/vnd.ms-excel" => Some(Self::Spreadsheet(SpreadsheetFormat::Xls)),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(Self::Spreadsheet(SpreadsheetFormat::Xlsx))
            }
            "application/pdf" => Some(Self::Pdf),
            m if m.starts_with("image/") => Some(Self::Image),
            _ => None,
        }
    }

    pub fn spreadsheet(&self) -> Option<SpreadsheetFormat> {
        match self {
            Self::Spreadsheet(f) => Some(*f),
            _ => None,
        }
    }
}

// ── Spreadsheet parsing ───────────────────────────────────────

/// First sheet of an upload: header row plus data rows, all as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn preview(&self) -> Vec<Vec<String>> {
        self.rows.iter().take(PREVIEW_ROWS).cloned().collect()
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        let wanted = header.trim();
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    }
}

pub fn parse_sheet(content: &[u8], format: SpreadsheetFormat) -> Result<SheetTable, OrderFlowError> {
    let mut records = match format {
        SpreadsheetFormat::Csv => read_csv(content)?,
        SpreadsheetFormat::Xls | SpreadsheetFormat::Xlsx => read_workbook(content)?,
    }
    .into_iter();

    let headers: Vec<String> = records
        .next()
        .map(|h| h.into_iter().map(|c| c.trim().to_string()).collect())
        .ok_or_else(|| OrderFlowError::InvalidInput("spreadsheet is empty".into()))?;
    let rows = records
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .collect();
    Ok(SheetTable { headers, rows })
}

fn read_csv(content: &[u8]) -> Result<Vec<Vec<String>>, OrderFlowError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);
    reader
        .records()
        .map(|r| {
            r.map(|rec| rec.iter().map(str::to_string).collect())
                .map_err(|e| OrderFlowError::InvalidInput(format!("invalid CSV: {e}")))
        })
        .collect()
}

fn read_workbook(content: &[u8]) -> Result<Vec<Vec<String>>, OrderFlowError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| OrderFlowError::InvalidInput(format!("invalid workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| OrderFlowError::InvalidInput("workbook has no sheets".into()))?
        .map_err(|e| OrderFlowError::InvalidInput(format!("unreadable sheet: {e}")))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

// ── Column mapping ────────────────────────────────────────────

/// Names of the header columns holding each line-item field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub sku: String,
    pub quantity: String,
    pub unit_price: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An unvalidated line item from either ingestion path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateItem {
    pub sku: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

pub fn apply_mapping(
    table: &SheetTable,
    mapping: &ColumnMapping,
) -> Result<Vec<CandidateItem>, OrderFlowError> {
    let column = |name: &str| {
        table.column(name).ok_or_else(|| {
            OrderFlowError::InvalidInput(format!("mapped column {name:?} not in headers"))
        })
    };
    let sku = column(&mapping.sku)?;
    let quantity = column(&mapping.quantity)?;
    let unit_price = column(&mapping.unit_price)?;
    let description = mapping.description.as_deref().map(column).transpose()?;

    let cell = |row: &Vec<String>, idx: usize| -> Option<String> {
        row.get(idx)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    };

    Ok(table
        .rows
        .iter()
        .map(|row| CandidateItem {
            sku: cell(row, sku),
            description: description.and_then(|d| cell(row, d)),
            quantity: cell(row, quantity).and_then(|q| parse_decimal(&q)),
            unit_price: cell(row, unit_price).and_then(|p| parse_decimal(&p)),
        })
        .collect())
}

/// Lenient numeric parsing for spreadsheet and AI values: tolerates a
/// leading currency symbol, spaces, and a lone decimal comma.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok().or_else(|| {
        if cleaned.contains(',') && !cleaned.contains('.') {
            Decimal::from_str(&cleaned.replace(',', ".")).ok()
        } else {
            Decimal::from_str(&cleaned.replace(',', "")).ok()
        }
    })
}

// ── Row validation ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow {
    pub sku: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    subtotal: Decimal,
}

impl ValidRow {
    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }
}

fn validate_row(item: &CandidateItem) -> Option<ValidRow> {
    let sku = item.sku.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let quantity = item.quantity.filter(|q| *q > Decimal::ZERO && q.fract().is_zero())?;
    let quantity = quantity.to_i32()?;
    let unit_price = item.unit_price.filter(|p| *p >= Decimal::ZERO)?;
    let subtotal = line_subtotal(quantity, unit_price)?;
    Some(ValidRow {
        sku: sku.to_string(),
        description: item
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        quantity,
        unit_price,
        subtotal,
    })
}

/// Keep the rows that pass validation; `NoValidItems` when none do.
pub fn validate_rows(items: &[CandidateItem]) -> Result<Vec<ValidRow>, OrderFlowError> {
    let kept: Vec<ValidRow> = items.iter().filter_map(validate_row).collect();
    let dropped = items.len() - kept.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = kept.len(), "ingestion rows dropped by validation");
    }
    if kept.is_empty() {
        return Err(OrderFlowError::NoValidItems { rows: items.len() });
    }
    Ok(kept)
}

// ── AI extraction payload ─────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedClient {
    #[serde(default, rename = "nombre")]
    pub name: Option<String>,
    #[serde(default, rename = "nit", deserialize_with = "lenient_string")]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "telefono", deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, rename = "direccion")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sku: Option<String>,
    #[serde(default, rename = "descripcion")]
    pub description: Option<String>,
    #[serde(default, rename = "cantidad", deserialize_with = "lenient_decimal")]
    pub quantity: Option<Decimal>,
    #[serde(default, rename = "precioUnitario", deserialize_with = "lenient_decimal")]
    pub unit_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub subtotal: Option<Decimal>,
}

/// Structured order as returned by the AI collaborator (and as edited by
/// the caller before confirmation). Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedOrder {
    #[serde(default, rename = "numeroOrden", deserialize_with = "lenient_string")]
    pub order_number: Option<String>,
    #[serde(default, rename = "cliente")]
    pub client: Option<ExtractedClient>,
    #[serde(default, rename = "productos")]
    pub items: Vec<ExtractedItem>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub subtotal: Option<Decimal>,
    #[serde(default, rename = "impuestos", deserialize_with = "lenient_decimal")]
    pub taxes: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total: Option<Decimal>,
    #[serde(default, rename = "moneda")]
    pub currency: Option<String>,
    #[serde(default, rename = "fecha")]
    pub date: Option<String>,
    #[serde(default, rename = "observaciones")]
    pub notes: Option<String>,
}

impl ExtractedOrder {
    pub fn candidates(&self) -> Vec<CandidateItem> {
        self.items
            .iter()
            .map(|i| CandidateItem {
                sku: i.sku.clone(),
                description: i.description.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect()
    }

    pub fn tax_id(&self) -> Option<&str> {
        self.client
            .as_ref()
            .and_then(|c| c.tax_id.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn order_number(&self) -> Option<&str> {
        self.order_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(serde_json::Value::String(s)) => parse_decimal(&s),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Strip a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the collaborator's text answer into an [`ExtractedOrder`].
pub fn parse_extraction_payload(raw: &str) -> Result<ExtractedOrder, ExtractionError> {
    serde_json::from_str(strip_code_fences(raw)).map_err(|e| ExtractionError::Malformed {
        message: e.to_string(),
        excerpt: raw.chars().take(EXCERPT_CHARS).collect(),
    })
}
