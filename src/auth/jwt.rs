use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Tokens are issued by the platform's auth service; this side only verifies them.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("Refresh tokens cannot be used for API requests".to_string());
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    fn token(token_type: TokenType) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize
            + 900;
        let claims = Claims {
            user_id: 1,
            sub: "rahim".into(),
            role: 3,
            exp,
            jti: Uuid::new_v4().to_string(),
            token_type,
            employee_code: Some("EMP-001".into()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn access_token_is_accepted() {
        let claims = verify_access_token(&token(TokenType::Access), SECRET).unwrap();
        assert_eq!(claims.employee_code.as_deref(), Some("EMP-001"));
    }

    #[test]
    fn refresh_token_and_wrong_secret_are_rejected() {
        assert!(verify_access_token(&token(TokenType::Refresh), SECRET).is_err());
        assert!(verify_access_token(&token(TokenType::Access), "other").is_err());
    }
}
