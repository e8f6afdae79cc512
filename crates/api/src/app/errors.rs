use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use rxledger_core::DomainError;

/// Map a domain failure onto a status code + stable machine-readable body.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidState(_) | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::Unauthorized => StatusCode::FORBIDDEN,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.kind(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_every_kind() {
        let cases = [
            (DomainError::not_found("bill"), StatusCode::NOT_FOUND),
            (DomainError::invalid_state("locked"), StatusCode::CONFLICT),
            (DomainError::Unauthorized, StatusCode::FORBIDDEN),
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::conflict("race"), StatusCode::CONFLICT),
            (
                DomainError::integrity("drift"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
