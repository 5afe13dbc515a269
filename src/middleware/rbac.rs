// src/middleware/rbac.rs

use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{auth::User, rbac::Permission},
};

/// Guardião das permissões: o usuário precisa ter `permission` no contexto
/// (cliente corporativo) pedido. Atribuições com `*` valem para todos.
pub fn require_permission(
    user: &User,
    permission: Permission,
    context: Option<Uuid>,
) -> Result<(), AppError> {
    if user.can(permission, context) {
        return Ok(());
    }

    let granted: Vec<String> = user.assignments.iter().map(|a| a.context()).collect();
    tracing::warn!(
        "🚫 Usuário {} sem '{}' no contexto {} (contextos: {:?})",
        user.id,
        permission.slug(),
        context.map(|uuid| uuid.to_string()).unwrap_or_else(|| "-".into()),
        granted
    );
    Err(AppError::Forbidden)
}
