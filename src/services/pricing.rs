//! Cart validation and order pricing.
//!
//! Pricing is a pure function over a catalog read: it never writes, and the
//! stock check here is advisory. The guarded decrement inside the order
//! transaction is what actually keeps stock from going negative.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::menu_item;
use crate::errors::ServiceError;

/// Read-only view of the menu used while pricing a cart.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MenuCatalog: Send + Sync {
    async fn get_menu_item(&self, id: Uuid) -> Result<Option<menu_item::Model>, ServiceError>;
}

#[derive(Clone)]
pub struct DbMenuCatalog {
    db_pool: Arc<DbPool>,
}

impl DbMenuCatalog {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl MenuCatalog for DbMenuCatalog {
    async fn get_menu_item(&self, id: Uuid) -> Result<Option<menu_item::Model>, ServiceError> {
        menu_item::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, menu_item_id = %id, "Failed to load menu item");
                ServiceError::DatabaseError(e)
            })
    }
}

/// Tax and service percentages in force when an order is priced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChargeRates {
    pub tax_percentage: Decimal,
    pub service_percentage: Decimal,
    /// Decimal places kept on computed charges
    pub scale: u32,
}

impl ChargeRates {
    pub fn new(tax_percentage: Decimal, service_percentage: Decimal, scale: u32) -> Self {
        Self {
            tax_percentage,
            service_percentage,
            scale,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let tax = Decimal::from_f64(config.tax_percentage).ok_or_else(|| {
            ServiceError::InternalError(format!("unrepresentable tax percentage {}", config.tax_percentage))
        })?;
        let service = Decimal::from_f64(config.service_percentage).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "unrepresentable service percentage {}",
                config.service_percentage
            ))
        })?;
        Ok(Self::new(tax, service, config.amount_scale))
    }

    /// `amount × percentage / 100`, rounded half away from zero.
    pub fn charge(&self, amount: Decimal, percentage: Decimal) -> Decimal {
        (amount * percentage / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(self.scale, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Shared, replaceable rates. Orders copy the values at creation time, so
/// replacing the rates never touches existing orders.
#[derive(Clone, Debug)]
pub struct ChargeRatesHandle {
    inner: Arc<RwLock<ChargeRates>>,
}

impl ChargeRatesHandle {
    pub fn new(rates: ChargeRates) -> Self {
        Self {
            inner: Arc::new(RwLock::new(rates)),
        }
    }

    pub async fn current(&self) -> ChargeRates {
        *self.inner.read().await
    }

    pub async fn replace(&self, rates: ChargeRates) {
        *self.inner.write().await = rates;
    }
}

/// Largest quantity a single cart line may ask for.
pub const MAX_LINE_QUANTITY: i32 = 999;

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct CartLine {
    pub menu_item_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    pub grand_total: Decimal,
}

/// Validates every line against the catalog and computes the order totals.
#[instrument(skip(catalog, lines), fields(lines = lines.len()))]
pub async fn validate_cart(
    catalog: &dyn MenuCatalog,
    rates: &ChargeRates,
    lines: &[CartLine],
) -> Result<PricedCart, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::EmptyOrder);
    }
    if let Some(line) = lines
        .iter()
        .find(|line| !(1..=MAX_LINE_QUANTITY).contains(&line.quantity))
    {
        return Err(ServiceError::InvalidQuantity(line.menu_item_id));
    }
    for line in lines {
        line.validate()?;
    }

    let mut items: HashMap<Uuid, menu_item::Model> = HashMap::new();
    let mut requested: HashMap<Uuid, i64> = HashMap::new();

    for line in lines {
        if !items.contains_key(&line.menu_item_id) {
            let item = catalog
                .get_menu_item(line.menu_item_id)
                .await?
                .ok_or(ServiceError::ItemNotFound(line.menu_item_id))?;
            if !item.is_available {
                warn!(menu_item_id = %item.id, "Menu item is not available");
                return Err(ServiceError::ItemUnavailable(item.name));
            }
            items.insert(item.id, item);
        }
        *requested.entry(line.menu_item_id).or_default() += i64::from(line.quantity);
    }

    for (id, quantity) in &requested {
        let Some(item) = items.get(id) else { continue };
        if let Some(stock) = item.stock_quantity {
            if i64::from(stock) < *quantity {
                warn!(menu_item_id = %id, stock, requested = *quantity, "Insufficient stock");
                return Err(ServiceError::InsufficientStock(item.name.clone()));
            }
        }
    }

    let mut priced = Vec::with_capacity(lines.len());
    let mut total_amount = Decimal::ZERO;
    for line in lines {
        let item = items
            .get(&line.menu_item_id)
            .ok_or(ServiceError::ItemNotFound(line.menu_item_id))?;
        let subtotal = item.price * Decimal::from(line.quantity);
        total_amount += subtotal;
        priced.push(PricedLine {
            menu_item_id: item.id,
            name: item.name.clone(),
            quantity: line.quantity,
            unit_price: item.price,
            subtotal,
            notes: line.notes.clone(),
        });
    }

    let tax_amount = rates.charge(total_amount, rates.tax_percentage);
    let service_charge = rates.charge(total_amount, rates.service_percentage);

    Ok(PricedCart {
        lines: priced,
        total_amount,
        tax_amount,
        service_charge,
        grand_total: total_amount + tax_amount + service_charge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use mockall::predicate::eq;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn dish(name: &str, price: Decimal, stock: Option<i32>) -> menu_item::Model {
        menu_item::Model {
            id: Uuid::new_v4(),
            category_id: None,
            name: name.to_string(),
            description: None,
            price,
            is_available: true,
            preparation_time: Some(15),
            stock_quantity: stock,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn catalog_with(items: Vec<menu_item::Model>) -> MockMenuCatalog {
        let mut catalog = MockMenuCatalog::new();
        catalog.expect_get_menu_item().returning(move |id| {
            Ok(items.iter().find(|item| item.id == id).cloned())
        });
        catalog
    }

    fn line(menu_item_id: Uuid, quantity: i32) -> CartLine {
        CartLine {
            menu_item_id,
            quantity,
            notes: None,
        }
    }

    fn default_rates() -> ChargeRates {
        ChargeRates::new(dec!(10), dec!(5), 0)
    }

    #[tokio::test]
    async fn prices_tom_yum_scenario() {
        let soup = dish("Tom Yum Soup", dec!(50000), Some(10));
        let mut catalog = MockMenuCatalog::new();
        let returned = soup.clone();
        catalog
            .expect_get_menu_item()
            .with(eq(soup.id))
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let cart = validate_cart(&catalog, &default_rates(), &[line(soup.id, 2)])
            .await
            .unwrap();

        assert_eq!(cart.total_amount, dec!(100000));
        assert_eq!(cart.tax_amount, dec!(10000));
        assert_eq!(cart.service_charge, dec!(5000));
        assert_eq!(cart.grand_total, dec!(115000));
        assert_eq!(cart.lines[0].unit_price, dec!(50000));
        assert_eq!(cart.lines[0].subtotal, dec!(100000));
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let catalog = MockMenuCatalog::new();
        let err = validate_cart(&catalog, &default_rates(), &[]).await.unwrap_err();
        assert_matches!(err, ServiceError::EmptyOrder);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_catalog_reads() {
        let catalog = MockMenuCatalog::new();
        let id = Uuid::new_v4();
        let err = validate_cart(&catalog, &default_rates(), &[line(id, 0)])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidQuantity(bad) if bad == id);
    }

    #[tokio::test]
    async fn oversized_quantity_is_rejected_before_catalog_reads() {
        let catalog = MockMenuCatalog::new();
        let id = Uuid::new_v4();
        let err = validate_cart(&catalog, &default_rates(), &[line(id, MAX_LINE_QUANTITY + 1)])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidQuantity(bad) if bad == id);

        let err = validate_cart(&catalog, &default_rates(), &[line(id, i32::MAX)])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidQuantity(_));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let catalog = catalog_with(vec![]);
        let id = Uuid::new_v4();
        let err = validate_cart(&catalog, &default_rates(), &[line(id, 1)])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ItemNotFound(missing) if missing == id);
    }

    #[tokio::test]
    async fn unavailable_item_is_rejected() {
        let mut item = dish("Seasonal Mango", dec!(30000), None);
        item.is_available = false;
        let id = item.id;
        let catalog = catalog_with(vec![item]);
        let err = validate_cart(&catalog, &default_rates(), &[line(id, 1)])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ItemUnavailable(name) if name == "Seasonal Mango");
    }

    #[tokio::test]
    async fn stock_check_sums_repeated_lines() {
        let item = dish("Iced Tea", dec!(8000), Some(3));
        let id = item.id;
        let catalog = catalog_with(vec![item]);
        let err = validate_cart(&catalog, &default_rates(), &[line(id, 2), line(id, 2)])
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(_));
    }

    #[tokio::test]
    async fn untracked_stock_never_limits() {
        let item = dish("Water", dec!(5000), None);
        let id = item.id;
        let catalog = catalog_with(vec![item]);
        let cart = validate_cart(&catalog, &default_rates(), &[line(id, 500)])
            .await
            .unwrap();
        assert_eq!(cart.total_amount, dec!(2500000));
    }

    #[test]
    fn charges_round_half_away_from_zero() {
        let rates = ChargeRates::new(dec!(10), dec!(5), 0);
        assert_eq!(rates.charge(dec!(12345), rates.tax_percentage), dec!(1235));
        assert_eq!(rates.charge(dec!(12345), rates.service_percentage), dec!(617));

        let cents = ChargeRates::new(dec!(10), dec!(5), 2);
        assert_eq!(cents.charge(dec!(10.05), cents.tax_percentage), dec!(1.01));
    }

    #[tokio::test]
    async fn replaced_rates_are_visible_to_new_readers() {
        let handle = ChargeRatesHandle::new(default_rates());
        handle.replace(ChargeRates::new(dec!(11), dec!(0), 0)).await;
        assert_eq!(handle.current().await.tax_percentage, dec!(11));
    }

    proptest! {
        #[test]
        fn grand_total_is_sum_of_parts(
            prices in proptest::collection::vec(0u32..1_000_000, 1..6),
            quantities in proptest::collection::vec(1i32..20, 6),
        ) {
            let items: Vec<_> = prices
                .iter()
                .map(|p| dish("dish", Decimal::from(*p), None))
                .collect();
            let lines: Vec<_> = items
                .iter()
                .zip(quantities.iter())
                .map(|(item, q)| line(item.id, *q))
                .collect();
            let expected_total: Decimal = items
                .iter()
                .zip(quantities.iter())
                .map(|(item, q)| item.price * Decimal::from(*q))
                .sum();
            let catalog = catalog_with(items);

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let cart = runtime
                .block_on(validate_cart(&catalog, &default_rates(), &lines))
                .unwrap();

            prop_assert_eq!(cart.total_amount, expected_total);
            prop_assert_eq!(cart.grand_total, cart.total_amount + cart.tax_amount + cart.service_charge);
            prop_assert!(cart.tax_amount >= Decimal::ZERO);
            prop_assert_eq!(cart.tax_amount.scale(), 0);
        }
    }
}
