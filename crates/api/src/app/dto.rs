use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use stockledger_core::{ProductId, UserId};
use stockledger_infra::{LedgerError, LogFilter, ProductFilter, ProductSort};
use stockledger_inventory::{MovementRequest, StockAction};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /inventory/update`.
///
/// `quantity` is taken as raw JSON so that a non-integer reports `InvalidQuantity` rather
/// than a generic body error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockRequest {
    pub product_id: String,
    pub action: String,
    pub quantity: serde_json::Value,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateStockRequest {
    /// Validate in order: action, quantity, then product id shape.
    pub fn into_movement(self) -> Result<MovementRequest, axum::response::Response> {
        let action: StockAction = self
            .action
            .parse()
            .map_err(|e| errors::ledger_error_to_response(LedgerError::from(e)))?;

        let quantity = integer(&self.quantity).ok_or_else(|| {
            errors::ledger_error_to_response(LedgerError::InvalidQuantity(format!(
                "quantity must be an integer, got {}",
                self.quantity
            )))
        })?;
        action
            .check_quantity(quantity)
            .map_err(|e| errors::ledger_error_to_response(LedgerError::from(e)))?;

        let product_id: ProductId = self
            .product_id
            .parse()
            .map_err(|_| errors::invalid_id("product"))?;

        MovementRequest::new(product_id, action, quantity, self.notes)
            .map_err(|e| errors::ledger_error_to_response(LedgerError::from(e)))
    }
}

fn integer(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub product_id: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl LogsQuery {
    pub fn to_filter(&self) -> Result<LogFilter, axum::response::Response> {
        let product_id = match self.product_id.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<ProductId>().map_err(|_| errors::invalid_id("product"))?),
            None => None,
        };
        let actor_id = match self.user_id.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<UserId>().map_err(|_| errors::invalid_id("user"))?),
            None => None,
        };
        let action = match self.action.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                s.parse::<StockAction>()
                    .map_err(|e| errors::ledger_error_to_response(LedgerError::from(e)))?,
            ),
            None => None,
        };

        Ok(LogFilter {
            product_id,
            actor_id,
            action,
            start: optional_date("startDate", self.start_date.as_deref())?,
            end: optional_date("endDate", self.end_date.as_deref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub low_stock: Option<bool>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl ProductsQuery {
    pub fn to_filter(&self) -> Result<ProductFilter, axum::response::Response> {
        let sort = match self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<ProductSort>().map_err(|msg| {
                errors::json_error(axum::http::StatusCode::BAD_REQUEST, "invalid_sort", msg)
            })?),
            None => None,
        };

        Ok(ProductFilter {
            search: non_empty(self.search.as_deref()),
            category: non_empty(self.category.as_deref()),
            low_stock_only: self.low_stock.unwrap_or(false),
            sort,
            descending: self
                .order
                .as_deref()
                .is_some_and(|o| o.eq_ignore_ascii_case("desc")),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ReportQuery {
    pub fn window(
        &self,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), axum::response::Response> {
        Ok((
            optional_date("startDate", self.start_date.as_deref())?,
            optional_date("endDate", self.end_date.as_deref())?,
        ))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn optional_date(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, axum::response::Response> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_date(v).map(Some).ok_or_else(|| {
            errors::ledger_error_to_response(LedgerError::Validation(format!(
                "{field} must be an RFC 3339 timestamp or YYYY-MM-DD, got '{v}'"
            )))
        }),
    }
}

/// RFC 3339 timestamp, or a bare date taken as midnight UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn request(action: &str, quantity: serde_json::Value) -> UpdateStockRequest {
        UpdateStockRequest {
            product_id: ProductId::new().to_string(),
            action: action.to_string(),
            quantity,
            notes: Some("  restock  ".to_string()),
        }
    }

    #[test]
    fn valid_body_becomes_movement() {
        let movement = request("Add", json!(20)).into_movement().unwrap();
        assert_eq!(movement.action, StockAction::Add);
        assert_eq!(movement.quantity, 20);
        assert_eq!(movement.notes.as_deref(), Some("restock"));
    }

    #[test]
    fn numeric_string_quantity_is_accepted() {
        let movement = request("Remove", json!("3")).into_movement().unwrap();
        assert_eq!(movement.quantity, 3);
    }

    #[test]
    fn bad_action_or_quantity_is_400() {
        for (action, quantity) in [
            ("Steal", json!(1)),
            ("add", json!(1)),
            ("Add", json!(0)),
            ("Remove", json!(-4)),
            ("Add", json!(2.5)),
            ("Add", json!("lots")),
            ("Add", json!(null)),
        ] {
            let err = request(action, quantity).into_movement().unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{action}");
        }
    }

    async fn error_code(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["error"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn action_and_quantity_are_checked_before_product_id() {
        let malformed = |action: &str, quantity: serde_json::Value| UpdateStockRequest {
            product_id: "not-a-uuid".to_string(),
            action: action.to_string(),
            quantity,
            notes: None,
        };

        let err = malformed("Steal", json!(1)).into_movement().unwrap_err();
        assert_eq!(error_code(err).await, "invalid_action");

        let err = malformed("Add", json!(0)).into_movement().unwrap_err();
        assert_eq!(error_code(err).await, "invalid_quantity");

        let err = malformed("Add", json!("lots")).into_movement().unwrap_err();
        assert_eq!(error_code(err).await, "invalid_quantity");

        let err = malformed("Add", json!(1)).into_movement().unwrap_err();
        assert_eq!(error_code(err).await, "invalid_id");
    }

    #[test]
    fn update_to_zero_is_allowed() {
        let movement = request("Update", json!(0)).into_movement().unwrap();
        assert_eq!(movement.quantity, 0);
    }

    #[test]
    fn dates_accept_rfc3339_and_plain_days() {
        assert!(parse_date("2024-03-01T10:00:00Z").is_some());
        let day = parse_date("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_date("March 1st").is_none());
    }

    #[test]
    fn logs_query_builds_typed_filter() {
        let query = LogsQuery {
            action: Some("Remove".to_string()),
            start_date: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.action, Some(StockAction::Remove));
        assert!(filter.start.is_some());
        assert!(filter.product_id.is_none());

        let bad = LogsQuery {
            user_id: Some("nope".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.to_filter().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn products_query_parses_sort_and_order() {
        let query = ProductsQuery {
            sort_by: Some("stock".to_string()),
            order: Some("DESC".to_string()),
            search: Some("  ".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.sort, Some(ProductSort::Stock));
        assert!(filter.descending);
        assert!(filter.search.is_none());
    }
}
