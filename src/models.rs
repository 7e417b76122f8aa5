use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const NOT_DEFINED: &str = "not_defined";

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub purchased_at: NaiveDateTime,
    pub purchase_date: NaiveDate,
    /// Calendar month of the purchase as `YYYY-MM`.
    pub year_month: String,
    pub order_status: String,
    pub payment_type: String,
    pub payment_value: f64,
    pub review_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterCriteria {
    /// Only applied when it holds exactly two endpoints.
    pub date_range: Vec<NaiveDate>,
    pub statuses: BTreeSet<String>,
    pub payment_types: BTreeSet<String>,
}

impl FilterCriteria {
    pub fn interval(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self.date_range.as_slice() {
            [start, end] => Some((*start, *end)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub statuses: Vec<String>,
    pub payment_types: Vec<String>,
}

impl FilterOptions {
    /// Full date span and every observed category.
    pub fn default_criteria(&self) -> FilterCriteria {
        FilterCriteria {
            date_range: self.min_date.into_iter().chain(self.max_date).collect(),
            statuses: self.statuses.iter().cloned().collect(),
            payment_types: self.payment_types.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Kpis {
    pub revenue: f64,
    pub order_count: usize,
    pub avg_review: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub payment_type: String,
    pub count: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Revenue,
    ReviewScore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPoint {
    pub month: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub criteria: FilterCriteria,
    pub row_count: usize,
    pub kpis: Kpis,
    pub payment_breakdown: Vec<PaymentSummary>,
    pub monthly_revenue: Vec<MonthlyPoint>,
    pub monthly_review: Vec<MonthlyPoint>,
    pub review_axis_max: f64,
    pub status_distribution: Vec<StatusCount>,
}
