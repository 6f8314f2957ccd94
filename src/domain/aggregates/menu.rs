//! Menu Item (read-only catalog entry)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::CartLine;

    #[test]
    fn test_cart_line_copies_price() {
        let mut item = MenuItem {
            id: 3, name: "Red Velvet".into(), price: Decimal::new(4500, 2), description: String::new(),
            category_id: Some(1), image_url: Some("red-velvet.jpg".into()), created_at: Utc::now(),
        };
        let line = CartLine::from_menu_item(&item, 2);
        item.price = Decimal::new(6000, 2);
        assert_eq!(line.unit_price, Decimal::new(4500, 2));
        assert_eq!(line.line_total(), Decimal::new(9000, 2));
        assert_eq!(line.image_ref.as_deref(), Some("red-velvet.jpg"));
    }
}
