// src/models/rbac.rs

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

// Contexto que dá acesso a todos os clientes
pub const ALL_ACCESS_CONTEXT: &str = "*";

// Papéis do sistema (vindos do JWT)
pub const SYSTEM_ENTERPRISE_ADMIN_ROLE: &str = "enterprise_admin";
pub const SYSTEM_ENTERPRISE_LEARNER_ROLE: &str = "enterprise_learner";
pub const SYSTEM_ENTERPRISE_OPERATOR_ROLE: &str = "enterprise_openedx_operator";

/// Papéis específicos do módulo de assinaturas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum SubscriptionsRole {
    #[serde(rename = "enterprise_subscriptions_admin")]
    Admin,
    #[serde(rename = "enterprise_subscriptions_learner")]
    Learner,
}

impl SubscriptionsRole {
    /// Mapeia um papel do sistema para o papel de assinaturas equivalente.
    pub fn from_system_role(system_role: &str) -> Option<Self> {
        match system_role {
            SYSTEM_ENTERPRISE_ADMIN_ROLE | SYSTEM_ENTERPRISE_OPERATOR_ROLE => Some(Self::Admin),
            SYSTEM_ENTERPRISE_LEARNER_ROLE => Some(Self::Learner),
            _ => None,
        }
    }
}

/// Permissões verificadas pelos handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    AdminAccess,
    LearnerOrAdminAccess,
}

impl Permission {
    pub fn slug(self) -> &'static str {
        match self {
            Permission::AdminAccess => "subscriptions.has_admin_access",
            Permission::LearnerOrAdminAccess => "subscriptions.has_learner_or_admin_access",
        }
    }

    fn granted_by(self, role: SubscriptionsRole) -> bool {
        match self {
            Permission::AdminAccess => role == SubscriptionsRole::Admin,
            Permission::LearnerOrAdminAccess => true,
        }
    }
}

/// Um usuário com um papel, opcionalmente limitado a um cliente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub role: SubscriptionsRole,
    pub enterprise_customer_uuid: Option<Uuid>,
}

impl RoleAssignment {
    /// O uuid do cliente, ou `*` quando o usuário tem acesso a tudo.
    pub fn context(&self) -> String {
        self.enterprise_customer_uuid
            .map(|uuid| uuid.to_string())
            .unwrap_or_else(|| ALL_ACCESS_CONTEXT.to_string())
    }

    /// Converte uma entrada `papel:contexto` do JWT (ex.: `enterprise_admin:<uuid>`).
    /// Sem contexto, ou com `*`, a atribuição vale para todos os clientes.
    pub fn from_jwt_role(entry: &str) -> Option<Self> {
        let (system_role, context) = match entry.split_once(':') {
            Some((role, context)) => (role, Some(context)),
            None => (entry, None),
        };
        let role = SubscriptionsRole::from_system_role(system_role)?;

        let enterprise_customer_uuid = match context {
            None | Some(ALL_ACCESS_CONTEXT) => None,
            Some(value) => Some(Uuid::parse_str(value).ok()?),
        };

        Some(Self { role, enterprise_customer_uuid })
    }
}

/// Decide se as atribuições permitem `permission` no contexto pedido.
/// `context = None` exige uma atribuição global (`*`).
pub fn has_permission(
    assignments: &[RoleAssignment],
    permission: Permission,
    context: Option<Uuid>,
) -> bool {
    assignments.iter().any(|assignment| {
        permission.granted_by(assignment.role)
            && match (assignment.enterprise_customer_uuid, context) {
                (None, _) => true,
                (Some(scoped), Some(requested)) => scoped == requested,
                (Some(_), None) => false,
            }
    })
}
