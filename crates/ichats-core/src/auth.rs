use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid token payload")]
    InvalidPayload,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Set on intermediate credentials (second-factor or recovery stages),
    /// which never grant a session.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

/// Verified identity attached to a connection or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

pub fn create_token(identity: &Identity, secret: &str, expiry_secs: u64) -> Result<String, AuthError> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        id: Some(identity.user_id.clone()),
        username: Some(identity.username.clone()),
        token_type: None,
        iat: now,
        exp: now + expiry_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })
}

/// Token Verifier: turns a bearer credential into `{user_id, username}`.
pub fn verify_identity(token: &str, secret: &str) -> Result<Identity, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    let claims = validate_token(token, secret)?;
    if claims.token_type.is_some() {
        return Err(AuthError::InvalidPayload);
    }
    let user_id = claims
        .id
        .filter(|id| ichats_util::validation::validate_user_id(id).is_ok())
        .ok_or(AuthError::InvalidPayload)?;
    let username = claims
        .username
        .filter(|name| !name.trim().is_empty())
        .ok_or(AuthError::InvalidPayload)?;
    Ok(Identity { user_id, username })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    fn alice() -> Identity {
        Identity {
            user_id: "u1".into(),
            username: "alice".into(),
        }
    }

    fn sign(claims: &serde_json::Value) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_identity() {
        let token = create_token(&alice(), SECRET, 60).unwrap();
        assert_eq!(verify_identity(&token, SECRET).unwrap(), alice());
    }

    #[test]
    fn rejects_missing_and_garbage_tokens() {
        assert_eq!(verify_identity("  ", SECRET), Err(AuthError::MissingToken));
        assert_eq!(
            verify_identity("not-a-jwt", SECRET),
            Err(AuthError::InvalidToken)
        );
        let token = create_token(&alice(), "other-secret", 60).unwrap();
        assert_eq!(verify_identity(&token, SECRET), Err(AuthError::InvalidToken));
    }

    #[test]
    fn rejects_expired_tokens() {
        let now = chrono::Utc::now().timestamp();
        let token = sign(&serde_json::json!({
            "id": "u1", "username": "alice", "iat": now - 7200, "exp": now - 3600
        }));
        assert_eq!(verify_identity(&token, SECRET), Err(AuthError::TokenExpired));
    }

    #[test]
    fn rejects_stage_tokens_and_incomplete_claims() {
        let now = chrono::Utc::now().timestamp();
        let stage = sign(&serde_json::json!({
            "id": "u1", "type": "2fa_stage", "iat": now, "exp": now + 300
        }));
        assert_eq!(verify_identity(&stage, SECRET), Err(AuthError::InvalidPayload));

        let anonymous = sign(&serde_json::json!({
            "username": "alice", "iat": now, "exp": now + 300
        }));
        assert_eq!(
            verify_identity(&anonymous, SECRET),
            Err(AuthError::InvalidPayload)
        );
    }
}
