use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use tablepos_core::{RequestContext, StoreId, TenantId, UserId};

use crate::app::errors::json_error;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const STORE_HEADER: &str = "x-store-id";
pub const USER_HEADER: &str = "x-user-id";

/// Why request identity could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextRejection {
    Missing(&'static str),
    Malformed(&'static str),
}

impl ContextRejection {
    pub fn into_response(self) -> Response {
        match self {
            ContextRejection::Missing(header) => json_error(
                StatusCode::UNAUTHORIZED,
                "missing_context",
                format!("{header} header is required"),
            ),
            ContextRejection::Malformed(header) => json_error(
                StatusCode::BAD_REQUEST,
                "invalid_context",
                format!("{header} must be a UUID"),
            ),
        }
    }
}

/// Resolve tenant, store and user from the request headers.
///
/// The returned context has no deadline; the middleware attaches one.
pub fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, ContextRejection> {
    let tenant_id: TenantId = header_id(headers, TENANT_HEADER)?;
    let store_id: StoreId = header_id(headers, STORE_HEADER)?;
    let user_id: UserId = header_id(headers, USER_HEADER)?;
    Ok(RequestContext::new(tenant_id, store_id, user_id))
}

fn header_id<T: std::str::FromStr>(
    headers: &HeaderMap,
    name: &'static str,
) -> Result<T, ContextRejection> {
    let value = headers.get(name).ok_or(ContextRejection::Missing(name))?;
    let value = value.to_str().map_err(|_| ContextRejection::Malformed(name))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ContextRejection::Missing(name));
    }
    value.parse().map_err(|_| ContextRejection::Malformed(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(tenant: &str, store: &str, user: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(TENANT_HEADER, HeaderValue::from_str(tenant).unwrap());
        h.insert(STORE_HEADER, HeaderValue::from_str(store).unwrap());
        h.insert(USER_HEADER, HeaderValue::from_str(user).unwrap());
        h
    }

    #[test]
    fn resolves_all_three_identities() {
        let (t, s, u) = (TenantId::new(), StoreId::new(), UserId::new());
        let ctx = context_from_headers(&headers(&t.to_string(), &s.to_string(), &u.to_string()))
            .unwrap();

        assert_eq!(ctx.tenant_id(), t);
        assert_eq!(ctx.store_id(), s);
        assert_eq!(ctx.user_id(), u);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn missing_header_is_named() {
        let mut h = headers(
            &TenantId::new().to_string(),
            &StoreId::new().to_string(),
            &UserId::new().to_string(),
        );
        h.remove(STORE_HEADER);

        assert_eq!(
            context_from_headers(&h),
            Err(ContextRejection::Missing(STORE_HEADER))
        );
    }

    #[test]
    fn non_uuid_header_is_malformed() {
        let h = headers("tenant-1", &StoreId::new().to_string(), &UserId::new().to_string());
        assert_eq!(
            context_from_headers(&h),
            Err(ContextRejection::Malformed(TENANT_HEADER))
        );
    }
}
