use std::collections::{BTreeMap, HashSet};

use chrono::NaiveTime;

use crate::dataset::Dataset;
use crate::models::{
    DashboardView, FilterCriteria, Kpis, Metric, MonthlyPoint, OrderRecord, PaymentSummary,
    StatusCount,
};

pub const TOP_STATUSES: usize = 3;
pub const OTHER_LABEL: &str = "Other";
const REVIEW_AXIS_FLOOR: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    rows: Vec<&'a OrderRecord>,
}

impl<'a> FilteredView<'a> {
    pub fn rows(&self) -> &[&'a OrderRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Applies the date interval (only when it has exactly two endpoints), then
/// literal membership in the selected statuses and payment types. An empty
/// selection matches nothing.
pub fn filter_rows<'a>(dataset: &'a Dataset, criteria: &FilterCriteria) -> FilteredView<'a> {
    let interval = criteria.interval();
    if interval.is_none() && !criteria.date_range.is_empty() {
        tracing::warn!(
            endpoints = criteria.date_range.len(),
            "ignoring malformed date interval"
        );
    }

    let rows = dataset
        .records()
        .iter()
        .filter(|record| {
            interval.is_none_or(|(start, end)| {
                let lower = start.and_time(NaiveTime::MIN);
                record.purchased_at >= lower
                    && end
                        .succ_opt()
                        .is_none_or(|next| record.purchased_at < next.and_time(NaiveTime::MIN))
            })
        })
        .filter(|record| criteria.statuses.contains(&record.order_status))
        .filter(|record| criteria.payment_types.contains(&record.payment_type))
        .collect();

    FilteredView { rows }
}

pub fn compute_kpis(view: &FilteredView<'_>) -> Kpis {
    let revenue = view.rows().iter().map(|record| record.payment_value).sum();
    let order_count = view
        .rows
        .iter()
        .map(|record| record.order_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    Kpis {
        revenue,
        order_count,
        avg_review: mean(view.rows().iter().filter_map(|record| record.review_score)),
    }
}

pub fn payment_breakdown(view: &FilteredView<'_>) -> Vec<PaymentSummary> {
    let mut groups: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for record in view.rows() {
        let entry = groups.entry(record.payment_type.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.payment_value;
    }

    let mut summaries: Vec<PaymentSummary> = groups
        .into_iter()
        .map(|(payment_type, (count, revenue))| PaymentSummary {
            payment_type: payment_type.to_string(),
            count,
            revenue,
        })
        .collect();

    summaries.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    summaries
}

pub fn monthly_series(view: &FilteredView<'_>, metric: Metric) -> Vec<MonthlyPoint> {
    let mut months: BTreeMap<&str, Vec<&OrderRecord>> = BTreeMap::new();
    for record in view.rows() {
        months
            .entry(record.year_month.as_str())
            .or_default()
            .push(record);
    }

    months
        .into_iter()
        .map(|(month, records)| {
            let value = match metric {
                Metric::Revenue => Some(records.iter().map(|r| r.payment_value).sum()),
                Metric::ReviewScore => mean(records.iter().filter_map(|r| r.review_score)),
            };
            MonthlyPoint {
                month: month.to_string(),
                value,
            }
        })
        .collect()
}

/// Top statuses by row count followed by an "Other" entry holding the rest.
/// The "Other" entry is always present, even when its count is zero.
pub fn status_distribution(view: &FilteredView<'_>) -> Vec<StatusCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in view.rows() {
        *counts.entry(record.order_status.as_str()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut distribution: Vec<StatusCount> = ranked
        .iter()
        .take(TOP_STATUSES)
        .map(|(label, count)| StatusCount {
            label: label.to_string(),
            count: *count,
        })
        .collect();

    let top_total: usize = distribution.iter().map(|entry| entry.count).sum();
    distribution.push(StatusCount {
        label: OTHER_LABEL.to_string(),
        count: view.len() - top_total,
    });
    distribution
}

/// Upper bound for the review chart's value axis.
pub fn review_axis_max(series: &[MonthlyPoint]) -> f64 {
    series
        .iter()
        .filter_map(|point| point.value)
        .map(|value| value + 0.5)
        .fold(REVIEW_AXIS_FLOOR, f64::max)
}

pub fn build_view(dataset: &Dataset, criteria: &FilterCriteria) -> DashboardView {
    let started = std::time::Instant::now();
    let view = filter_rows(dataset, criteria);
    if view.is_empty() {
        tracing::debug!("selection matched no orders");
    }
    let monthly_review = monthly_series(&view, Metric::ReviewScore);

    let dashboard = DashboardView {
        criteria: criteria.clone(),
        row_count: view.len(),
        kpis: compute_kpis(&view),
        payment_breakdown: payment_breakdown(&view),
        monthly_revenue: monthly_series(&view, Metric::Revenue),
        review_axis_max: review_axis_max(&monthly_review),
        monthly_review,
        status_distribution: status_distribution(&view),
    };

    tracing::debug!(
        rows = dashboard.row_count,
        elapsed_us = started.elapsed().as_micros() as u64,
        "dashboard recomputed"
    );
    dashboard
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
