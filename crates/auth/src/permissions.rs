use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "inventory.read").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Read products, movements, low-stock and stats.
    pub const INVENTORY_READ: Permission = Permission::from_static("inventory.read");
    /// Submit stock movements.
    pub const STOCK_UPDATE: Permission = Permission::from_static("inventory.stock.update");
    /// Create, edit and delete products.
    pub const PRODUCTS_MANAGE: Permission = Permission::from_static("products.manage");
    /// Read aggregate reports.
    pub const REPORTS_READ: Permission = Permission::from_static("reports.read");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
