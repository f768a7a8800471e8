use thiserror::Error;

use crate::{Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: Role, permission: String },
}

/// Permissions granted to a role.
pub fn role_permissions(role: Role) -> &'static [Permission] {
    const STAFF: &[Permission] = &[Permission::INVENTORY_READ, Permission::STOCK_UPDATE];
    const ADMIN: &[Permission] = &[
        Permission::INVENTORY_READ,
        Permission::STOCK_UPDATE,
        Permission::PRODUCTS_MANAGE,
        Permission::REPORTS_READ,
    ];

    match role {
        Role::Admin => ADMIN,
        Role::Staff => STAFF,
    }
}

/// Authorize a role against a required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(role: Role, required: &Permission) -> Result<(), AuthzError> {
    if role_permissions(role).iter().any(|p| p == required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role,
            permission: required.as_str().to_string(),
        })
    }
}
