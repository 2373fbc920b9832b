use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, TokenData as JwtTokenData, Validation,
};
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

use haulbase_shared::{User, UserRole};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // Subject (user ID)
    pub company_id: Uuid,
    pub role: UserRole,
    /// Set only for EMPLOYEE accounts; links the login to its crew record
    pub employee_id: Option<Uuid>,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

#[derive(Debug)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub fn create_jwt(
    user: &User,
    employee_id: Option<Uuid>,
) -> Result<TokenResponse, jsonwebtoken::errors::Error> {
    let secret = get_jwt_secret();
    let expires_at = Utc::now() + Duration::hours(24); // 24 hour expiration

    let claims = Claims {
        sub: user.id,
        company_id: user.company_id,
        role: user.role,
        employee_id,
        exp: expires_at.timestamp(),
        iat: Utc::now().timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(TokenResponse { token, expires_at })
}

pub fn verify_jwt(token: &str) -> Result<JwtTokenData<Claims>, jsonwebtoken::errors::Error> {
    let secret = get_jwt_secret();
    let validation = Validation::default();

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
}

fn get_jwt_secret() -> String {
    env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using default (insecure for production)");
        "your-secret-key".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use haulbase_shared::User;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            password_hash: "x".to_string(),
            full_name: "Test Owner".to_string(),
            role: UserRole::Owner,
            avatar_url: None,
            push_token: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_round_trip() {
        let user = test_user();
        let issued = create_jwt(&user, None).unwrap();
        let decoded = verify_jwt(&issued.token).unwrap();

        assert_eq!(decoded.claims.sub, user.id);
        assert_eq!(decoded.claims.company_id, user.company_id);
        assert_eq!(decoded.claims.role, UserRole::Owner);
        assert!(decoded.claims.employee_id.is_none());
    }

    #[test]
    fn test_employee_claim_carried() {
        let mut user = test_user();
        user.role = UserRole::Employee;
        let employee_id = Uuid::new_v4();

        let issued = create_jwt(&user, Some(employee_id)).unwrap();
        let decoded = verify_jwt(&issued.token).unwrap();
        assert_eq!(decoded.claims.employee_id, Some(employee_id));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_jwt("not-a-token").is_err());
    }
}
