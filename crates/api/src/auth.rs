use crate::error::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts, http::StatusCode};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity as forwarded by the gateway in front of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing x-user-id header"))?;

        raw.to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(UserId)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "invalid x-user-id header"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<UserId, ApiError> {
        let (mut parts, _) = req.into_parts();
        UserId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_uuid_header() {
        let id = Uuid::new_v4();
        let req = Request::builder()
            .header(USER_ID_HEADER, format!(" {id} "))
            .body(())
            .unwrap();
        assert_eq!(extract(req).await.unwrap(), UserId(id));
    }

    #[tokio::test]
    async fn missing_or_garbage_header_is_unauthorized() {
        let err = extract(Request::builder().body(()).unwrap()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .header(USER_ID_HEADER, "alice")
            .body(())
            .unwrap();
        let err = extract(req).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "invalid x-user-id header");
    }
}
