// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::rbac::{has_permission, Permission, RoleAssignment};

// Usuário autenticado, montado a partir das claims do JWT
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub lms_user_id: Option<i32>,
    pub assignments: Vec<RoleAssignment>,
}

impl User {
    pub fn from_claims(claims: Claims) -> Self {
        let assignments = claims
            .roles
            .iter()
            .filter_map(|entry| RoleAssignment::from_jwt_role(entry))
            .collect();

        Self {
            id: claims.sub,
            email: claims.email,
            lms_user_id: claims.user_id,
            assignments,
        }
    }

    pub fn can(&self, permission: Permission, context: Option<Uuid>) -> bool {
        has_permission(&self.assignments, permission, context)
    }
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (ID do usuário)
    pub exp: usize,  // Expiration time (quando o token expira)
    pub iat: usize,  // Issued At (quando o token foi criado)
    #[serde(default)]
    pub email: Option<String>,
    // Id do usuário na plataforma de cursos
    #[serde(default)]
    pub user_id: Option<i32>,
    // Entradas "papel:contexto"
    #[serde(default)]
    pub roles: Vec<String>,
}
