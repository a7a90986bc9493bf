//! Persistence boundary
//!
//! The pipeline consumes storage through the `FinanceStore` capability; it
//! does not own schema or migrations. `InMemoryFinanceStore` is the reference
//! implementation used by tests and fixtures — production deployments plug a
//! database-backed implementation in behind the same trait.

use crate::engines::price_trend::PriceObservation;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

//
// ================= Records =================
//

/// Restaurant context loaded for prompt personalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub person_name: Option<String>,
    pub cmv_target_percent: Option<f64>,
    pub savings_opportunity: Option<String>,
}

/// A parsed invoice handed over by the upload flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub restaurant_id: i64,
    pub supplier: String,
    pub total_amount: f64,
    pub invoice_date: NaiveDate,
    pub lines: Vec<PriceObservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierTotal {
    pub name: String,
    pub total: f64,
    pub invoice_count: u32,
}

/// Purchases aggregated over one month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSummary {
    pub total: f64,
    pub invoice_count: u32,
    /// Sorted by total descending
    pub by_supplier: Vec<SupplierTotal>,
}

/// One ingredient of a menu item's recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLine {
    pub ingredient: String,
    pub quantity_per_serving: f64,
    pub unit: String,
    pub waste_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub restaurant_id: i64,
    pub name: String,
    pub sale_price: f64,
    pub recipe: Vec<RecipeLine>,
    // Computed fields, written back after a CMV calculation
    pub food_cost: Option<f64>,
    pub food_cost_percent: Option<f64>,
    pub contribution_margin: Option<f64>,
    pub profitability_tier: Option<crate::engines::ProfitabilityTier>,
}

/// Lifecycle of a monthly closure aggregate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    AwaitingRevenue,
    OnTarget,
    AboveTarget,
    Critical,
}

/// One (restaurant, period) closure aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureReport {
    pub id: Uuid,
    pub restaurant_id: i64,
    pub year: i32,
    pub month: u32,
    pub status: ReportStatus,
    pub total_revenue: Option<f64>,
    pub total_purchases: Option<f64>,
    pub cmv_percent: Option<f64>,
    pub cmv_target_percent: f64,
    pub month_over_month_change: Option<f64>,
    pub top_suppliers: Vec<SupplierTotal>,
    pub insights: Vec<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: Uuid,
    pub restaurant_id: i64,
    pub product: String,
    pub threshold_percent: f64,
    pub reference_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

//
// ================= Capability trait =================
//

/// Read/write surface the pipeline needs from external storage.
#[async_trait]
pub trait FinanceStore: Send + Sync {
    // -- context reads
    async fn load_profile(&self, restaurant_id: i64) -> Result<Option<UserProfile>>;
    async fn recent_invoices(&self, restaurant_id: i64, limit: usize)
        -> Result<Vec<InvoiceRecord>>;
    async fn pending_drip_questions(&self, restaurant_id: i64) -> Result<Vec<String>>;

    // -- invoices / price history
    async fn record_invoice(&self, invoice: InvoiceRecord) -> Result<Uuid>;
    /// Most recent observation for a product strictly before `before`.
    async fn latest_observation_before(
        &self,
        restaurant_id: i64,
        product: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>>;
    /// Latest invoice-derived unit cost for an ingredient, if any.
    async fn latest_invoice_cost(&self, restaurant_id: i64, ingredient: &str)
        -> Result<Option<f64>>;
    /// Fallback cost from the historical pricing feed.
    async fn historical_cost(&self, restaurant_id: i64, ingredient: &str)
        -> Result<Option<f64>>;
    async fn monthly_purchases(
        &self,
        restaurant_id: i64,
        year: i32,
        month: u32,
    ) -> Result<PurchaseSummary>;

    // -- menu / CMV
    async fn menu_item_by_name(&self, restaurant_id: i64, name: &str)
        -> Result<Option<MenuItem>>;
    async fn save_menu_item_costs(&self, item: MenuItem) -> Result<()>;

    // -- closure aggregates
    async fn find_report(
        &self,
        restaurant_id: i64,
        year: i32,
        month: u32,
    ) -> Result<Option<ClosureReport>>;
    async fn save_report(&self, report: ClosureReport) -> Result<()>;
    async fn report_history(&self, restaurant_id: i64, limit: usize)
        -> Result<Vec<ClosureReport>>;

    // -- watchlist
    async fn add_watchlist_entry(&self, entry: WatchlistEntry) -> Result<()>;
    async fn watchlist(&self, restaurant_id: i64) -> Result<Vec<WatchlistEntry>>;
    /// Move an entry's comparison baseline to a newly observed price.
    async fn update_watchlist_reference(&self, entry_id: Uuid, reference_price: f64)
        -> Result<()>;
}

//
// ================= In-memory implementation =================
//

/// In-memory store for tests and development.
pub struct InMemoryFinanceStore {
    profiles: Arc<RwLock<HashMap<i64, UserProfile>>>,
    invoices: Arc<RwLock<Vec<InvoiceRecord>>>,
    pricing_history: Arc<RwLock<HashMap<(i64, String), f64>>>,
    menu_items: Arc<RwLock<HashMap<Uuid, MenuItem>>>,
    reports: Arc<RwLock<HashMap<(i64, i32, u32), ClosureReport>>>,
    watchlists: Arc<RwLock<Vec<WatchlistEntry>>>,
    drip_questions: Arc<RwLock<HashMap<i64, Vec<String>>>>,
}

impl InMemoryFinanceStore {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            invoices: Arc::new(RwLock::new(Vec::new())),
            pricing_history: Arc::new(RwLock::new(HashMap::new())),
            menu_items: Arc::new(RwLock::new(HashMap::new())),
            reports: Arc::new(RwLock::new(HashMap::new())),
            watchlists: Arc::new(RwLock::new(Vec::new())),
            drip_questions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // Fixture helpers for tests and demos.

    pub async fn seed_profile(&self, profile: UserProfile) {
        self.profiles.write().await.insert(profile.restaurant_id, profile);
    }

    pub async fn seed_menu_item(&self, item: MenuItem) {
        self.menu_items.write().await.insert(item.id, item);
    }

    pub async fn seed_historical_cost(&self, restaurant_id: i64, ingredient: &str, cost: f64) {
        self.pricing_history
            .write()
            .await
            .insert((restaurant_id, ingredient.to_lowercase()), cost);
    }

    pub async fn seed_drip_questions(&self, restaurant_id: i64, questions: Vec<String>) {
        self.drip_questions.write().await.insert(restaurant_id, questions);
    }
}

impl Default for InMemoryFinanceStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalized(name: &str) -> String {
    name.trim().to_lowercase()
}

#[async_trait]
impl FinanceStore for InMemoryFinanceStore {
    async fn load_profile(&self, restaurant_id: i64) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(&restaurant_id).cloned())
    }

    async fn recent_invoices(
        &self,
        restaurant_id: i64,
        limit: usize,
    ) -> Result<Vec<InvoiceRecord>> {
        let invoices = self.invoices.read().await;
        let mut recent: Vec<InvoiceRecord> = invoices
            .iter()
            .filter(|inv| inv.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        recent.sort_by_key(|inv| std::cmp::Reverse(inv.invoice_date));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn pending_drip_questions(&self, restaurant_id: i64) -> Result<Vec<String>> {
        Ok(self
            .drip_questions
            .read()
            .await
            .get(&restaurant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_invoice(&self, invoice: InvoiceRecord) -> Result<Uuid> {
        let id = invoice.id;
        self.invoices.write().await.push(invoice);
        Ok(id)
    }

    async fn latest_observation_before(
        &self,
        restaurant_id: i64,
        product: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>> {
        let product = normalized(product);
        let invoices = self.invoices.read().await;

        let mut latest: Option<PriceObservation> = None;
        for invoice in invoices.iter().filter(|inv| inv.restaurant_id == restaurant_id) {
            for line in &invoice.lines {
                if normalized(&line.product) != product || line.observed_at >= before {
                    continue;
                }
                let newer = latest
                    .as_ref()
                    .map(|l| line.observed_at > l.observed_at)
                    .unwrap_or(true);
                if newer {
                    latest = Some(line.clone());
                }
            }
        }
        Ok(latest)
    }

    async fn latest_invoice_cost(
        &self,
        restaurant_id: i64,
        ingredient: &str,
    ) -> Result<Option<f64>> {
        let observation = self
            .latest_observation_before(restaurant_id, ingredient, Utc::now())
            .await?;
        Ok(observation.map(|obs| obs.unit_price))
    }

    async fn historical_cost(
        &self,
        restaurant_id: i64,
        ingredient: &str,
    ) -> Result<Option<f64>> {
        Ok(self
            .pricing_history
            .read()
            .await
            .get(&(restaurant_id, normalized(ingredient)))
            .copied())
    }

    async fn monthly_purchases(
        &self,
        restaurant_id: i64,
        year: i32,
        month: u32,
    ) -> Result<PurchaseSummary> {
        let invoices = self.invoices.read().await;

        let mut total = 0.0;
        let mut invoice_count = 0u32;
        let mut by_supplier: HashMap<String, SupplierTotal> = HashMap::new();

        for invoice in invoices.iter().filter(|inv| {
            inv.restaurant_id == restaurant_id
                && inv.invoice_date.year() == year
                && inv.invoice_date.month() == month
        }) {
            total += invoice.total_amount;
            invoice_count += 1;
            let entry = by_supplier
                .entry(invoice.supplier.clone())
                .or_insert_with(|| SupplierTotal {
                    name: invoice.supplier.clone(),
                    total: 0.0,
                    invoice_count: 0,
                });
            entry.total += invoice.total_amount;
            entry.invoice_count += 1;
        }

        let mut suppliers: Vec<SupplierTotal> = by_supplier.into_values().collect();
        suppliers.sort_by(|a, b| b.total.total_cmp(&a.total));

        Ok(PurchaseSummary {
            total,
            invoice_count,
            by_supplier: suppliers,
        })
    }

    async fn menu_item_by_name(
        &self,
        restaurant_id: i64,
        name: &str,
    ) -> Result<Option<MenuItem>> {
        let wanted = normalized(name);
        let items = self.menu_items.read().await;
        Ok(items
            .values()
            .find(|item| {
                item.restaurant_id == restaurant_id && normalized(&item.name).contains(&wanted)
            })
            .cloned())
    }

    async fn save_menu_item_costs(&self, item: MenuItem) -> Result<()> {
        self.menu_items.write().await.insert(item.id, item);
        Ok(())
    }

    async fn find_report(
        &self,
        restaurant_id: i64,
        year: i32,
        month: u32,
    ) -> Result<Option<ClosureReport>> {
        Ok(self
            .reports
            .read()
            .await
            .get(&(restaurant_id, year, month))
            .cloned())
    }

    async fn save_report(&self, report: ClosureReport) -> Result<()> {
        self.reports
            .write()
            .await
            .insert((report.restaurant_id, report.year, report.month), report);
        Ok(())
    }

    async fn report_history(
        &self,
        restaurant_id: i64,
        limit: usize,
    ) -> Result<Vec<ClosureReport>> {
        let reports = self.reports.read().await;
        let mut history: Vec<ClosureReport> = reports
            .values()
            .filter(|r| r.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        history.sort_by_key(|r| std::cmp::Reverse((r.year, r.month)));
        history.truncate(limit);
        Ok(history)
    }

    async fn add_watchlist_entry(&self, entry: WatchlistEntry) -> Result<()> {
        self.watchlists.write().await.push(entry);
        Ok(())
    }

    async fn watchlist(&self, restaurant_id: i64) -> Result<Vec<WatchlistEntry>> {
        Ok(self
            .watchlists
            .read()
            .await
            .iter()
            .filter(|e| e.restaurant_id == restaurant_id)
            .cloned()
            .collect())
    }

    async fn update_watchlist_reference(
        &self,
        entry_id: Uuid,
        reference_price: f64,
    ) -> Result<()> {
        let mut entries = self.watchlists.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| {
                crate::error::AgentError::StoreError(format!(
                    "watchlist entry {} not found",
                    entry_id
                ))
            })?;
        entry.reference_price = Some(reference_price);
        Ok(())
    }
}
