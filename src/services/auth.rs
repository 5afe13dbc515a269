// src/services/auth.rs

use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    models::auth::{Claims, User},
};

// Os tokens são emitidos pelo provedor de identidade; aqui só validamos
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|_| AppError::InvalidToken)?;

        Ok(User::from_claims(token_data.claims))
    }

    #[cfg(test)]
    pub fn issue_token(&self, email: &str, lms_user_id: Option<i32>, roles: &[String]) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = chrono::Utc::now();
        let claims = Claims {
            sub: lms_user_id.map(|id| id.to_string()).unwrap_or_else(|| email.to_string()),
            exp: (now + chrono::Duration::hours(1)).timestamp() as usize,
            iat: now.timestamp() as usize,
            email: Some(email.to_string()),
            user_id: lms_user_id,
            roles: roles.to_vec(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::{Permission, SubscriptionsRole};
    use uuid::Uuid;

    #[test]
    fn valid_token_becomes_user_with_roles() {
        let auth = AuthService::new("segredo".into());
        let customer = Uuid::new_v4();
        let token = auth.issue_token(
            "admin@example.com",
            Some(5),
            &[format!("enterprise_admin:{customer}"), "unknown_role".into()],
        );

        let user = auth.validate_token(&token).unwrap();
        assert_eq!(user.email.as_deref(), Some("admin@example.com"));
        assert_eq!(user.lms_user_id, Some(5));
        assert_eq!(user.assignments.len(), 1);
        assert_eq!(user.assignments[0].role, SubscriptionsRole::Admin);
        assert!(user.can(Permission::AdminAccess, Some(customer)));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = AuthService::new("outro".into()).issue_token("a@example.com", None, &[]);
        let result = AuthService::new("segredo".into()).validate_token(&token);
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let result = AuthService::new("segredo".into()).validate_token("nao-e-um-jwt");
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }
}
