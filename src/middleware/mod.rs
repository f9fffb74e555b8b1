use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::AppState;

/// Name of both the header and the cookie carrying the session token.
pub const AUTH_COOKIE: &str = "Authorization";

/// Caller authenticated by a valid session token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Authenticated caller whose account currently has the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser {
    pub user_id: Uuid,
}

// `Authorization: Bearer <token>`, a bare token in the header, or the cookie
fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AuthError::MissingToken)?;
        let user_id = state.tokens.verify_token(token)?;
        Ok(AuthUser { user_id })
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let AuthUser { user_id } = AuthUser::from_request_parts(parts, state).await?;

        match state.users.role_of(user_id).await? {
            Some(role) if role.is_admin() => Ok(AdminUser { user_id }),
            Some(_) => Err(AppError::Forbidden("Admin access required".to_string())),
            None => Err(AuthError::UnknownAccount.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn bearer_and_bare_tokens() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(token_from_headers(&h), Some("abc.def.ghi"));

        let h = headers(&[(header::AUTHORIZATION, "abc.def.ghi")]);
        assert_eq!(token_from_headers(&h), Some("abc.def.ghi"));
    }

    #[test]
    fn cookie_token() {
        let h = headers(&[(header::COOKIE, "theme=dark; Authorization=abc.def.ghi")]);
        assert_eq!(token_from_headers(&h), Some("abc.def.ghi"));
    }

    #[test]
    fn header_wins_over_cookie() {
        let h = headers(&[
            (header::COOKIE, "Authorization=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(token_from_headers(&h), Some("from-header"));
    }

    #[test]
    fn nothing_to_find() {
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
        let h = headers(&[(header::AUTHORIZATION, "Bearer "), (header::COOKIE, "theme=dark")]);
        assert_eq!(token_from_headers(&h), None);
    }
}
