use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("order locked: {0}")]
    OrderLocked(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Unique-code collision reported by a store. Workflows regenerate the
    /// code and retry; it only reaches a caller through `Conflict`.
    #[error("duplicate code: {0}")]
    DuplicateCode(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no valid items: {rows} row(s) rejected")]
    NoValidItems { rows: usize },

    #[error("AI extraction failed: {message}")]
    AiExtractionFailed {
        message: String,
        excerpt: Option<String>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrderFlowError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidTransition { .. } => 400,
            Self::OrderLocked(_) => 400,
            Self::Conflict(_) | Self::DuplicateCode(_) => 409,
            Self::InvalidState(_) => 400,
            Self::NoValidItems { .. } => 422,
            Self::AiExtractionFailed { .. } => 502,
            Self::InvalidInput(_) => 400,
            Self::UnsupportedFile(_) => 415,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable tag rendered next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::OrderLocked(_) => "order_locked",
            Self::Conflict(_) | Self::DuplicateCode(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::NoValidItems { .. } => "no_valid_items",
            Self::AiExtractionFailed { .. } => "ai_extraction_failed",
            Self::InvalidInput(_) => "invalid_input",
            Self::UnsupportedFile(_) => "unsupported_file",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal",
        }
    }

    /// True when the request itself was at fault, false when the system is.
    pub fn is_business_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_not_found() {
        assert_eq!(OrderFlowError::NotFound("x".into()).http_status(), 404);
    }

    #[test]
    fn http_status_invalid_transition() {
        let err = OrderFlowError::InvalidTransition {
            entity: "purchase_order",
            from: "procesada".into(),
            to: "recibida".into(),
        };
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn http_status_conflict_and_duplicate_code() {
        assert_eq!(OrderFlowError::Conflict("x".into()).http_status(), 409);
        assert_eq!(OrderFlowError::DuplicateCode("x".into()).http_status(), 409);
    }

    #[test]
    fn http_status_no_valid_items() {
        assert_eq!(OrderFlowError::NoValidItems { rows: 3 }.http_status(), 422);
    }

    #[test]
    fn http_status_ai_extraction_failed() {
        let err = OrderFlowError::AiExtractionFailed {
            message: "bad json".into(),
            excerpt: None,
        };
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn http_status_auth() {
        assert_eq!(OrderFlowError::Unauthorized("x".into()).http_status(), 401);
        assert_eq!(OrderFlowError::Forbidden("x".into()).http_status(), 403);
    }

    #[test]
    fn http_status_internal() {
        let err = OrderFlowError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_business_error());
    }

    #[test]
    fn display_invalid_transition_names_pair() {
        let err = OrderFlowError::InvalidTransition {
            entity: "sales_order",
            from: "recibida".into(),
            to: "procesada".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid sales_order transition: recibida -> procesada"
        );
    }

    #[test]
    fn display_no_valid_items() {
        let err = OrderFlowError::NoValidItems { rows: 2 };
        assert_eq!(err.to_string(), "no valid items: 2 row(s) rejected");
    }

    #[test]
    fn business_errors_are_flagged() {
        assert!(OrderFlowError::OrderLocked("x".into()).is_business_error());
        assert!(OrderFlowError::InvalidState("x".into()).is_business_error());
    }

    #[test]
    fn duplicate_code_reports_as_conflict_kind() {
        assert_eq!(OrderFlowError::DuplicateCode("OC-2024-00001".into()).kind(), "conflict");
    }
}
