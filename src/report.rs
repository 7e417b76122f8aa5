use std::fmt::Write;

use crate::models::{DashboardView, FilterCriteria, MonthlyPoint};

const EMPTY_SECTION: &str = "No orders in this selection.";

pub fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

pub fn format_currency(value: f64, symbol: &str) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{symbol} {sign}{}.{cents}", group_thousands(whole))
}

pub fn format_count(count: usize) -> String {
    group_thousands(&count.to_string())
}

pub fn format_review(score: Option<f64>) -> String {
    match score {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => "n/a".to_string(),
    }
}

pub fn describe_criteria(criteria: &FilterCriteria) -> String {
    let period = match criteria.interval() {
        Some((start, end)) => format!("{start} to {end}"),
        None => "all dates".to_string(),
    };
    let join = |values: &std::collections::BTreeSet<String>| {
        if values.is_empty() {
            "(none)".to_string()
        } else {
            values.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };
    format!(
        "{period}; status: {}; payment: {}",
        join(&criteria.statuses),
        join(&criteria.payment_types)
    )
}

fn write_series(output: &mut String, series: &[MonthlyPoint], format: impl Fn(Option<f64>) -> String) {
    if series.is_empty() {
        let _ = writeln!(output, "{EMPTY_SECTION}");
        return;
    }
    for point in series {
        let _ = writeln!(output, "- {}: {}", point.month, format(point.value));
    }
}

pub fn render_summary(view: &DashboardView, currency: &str) -> String {
    let mut output = String::new();
    let kpis = &view.kpis;

    let _ = writeln!(output, "Filters: {}", describe_criteria(&view.criteria));
    let _ = writeln!(output, "Total revenue:  {}", format_currency(kpis.revenue, currency));
    let _ = writeln!(output, "Total orders:   {}", format_count(kpis.order_count));
    let _ = writeln!(output, "Average review: {}", format_review(kpis.avg_review));

    let _ = writeln!(output);
    let _ = writeln!(output, "Payment methods (count / revenue):");
    if view.payment_breakdown.is_empty() {
        let _ = writeln!(output, "{EMPTY_SECTION}");
    }
    for entry in &view.payment_breakdown {
        let _ = writeln!(
            output,
            "  {:<14} {:>8}  {}",
            entry.payment_type,
            format_count(entry.count),
            format_currency(entry.revenue, currency)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "Monthly revenue:");
    write_series(&mut output, &view.monthly_revenue, |value| {
        format_currency(value.unwrap_or_default(), currency)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "Monthly average review:");
    write_series(&mut output, &view.monthly_review, format_review);

    let _ = writeln!(output);
    let _ = writeln!(output, "Orders by status:");
    for entry in &view.status_distribution {
        let _ = writeln!(output, "  {:<14} {:>8}", entry.label, format_count(entry.count));
    }

    output
}

pub fn build_report(dataset_label: &str, view: &DashboardView, currency: &str) -> String {
    let mut output = String::new();
    let kpis = &view.kpis;

    let _ = writeln!(output, "# Sales Dashboard Report");
    let _ = writeln!(output, "Generated from {dataset_label}");
    let _ = writeln!(output, "Filters: {}", describe_criteria(&view.criteria));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Figures");
    let _ = writeln!(output, "- Total revenue: {}", format_currency(kpis.revenue, currency));
    let _ = writeln!(output, "- Total orders: {}", format_count(kpis.order_count));
    let _ = writeln!(output, "- Average review: {}", format_review(kpis.avg_review));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Payment Methods");
    if view.payment_breakdown.is_empty() {
        let _ = writeln!(output, "{EMPTY_SECTION}");
    } else {
        let _ = writeln!(output, "| Method | Orders | Revenue |");
        let _ = writeln!(output, "|---|---:|---:|");
        for entry in &view.payment_breakdown {
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                entry.payment_type,
                format_count(entry.count),
                format_currency(entry.revenue, currency)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue by Month");
    write_series(&mut output, &view.monthly_revenue, |value| {
        format_currency(value.unwrap_or_default(), currency)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Review by Month");
    let _ = writeln!(output, "Scale 0 to {:.1}", view.review_axis_max);
    write_series(&mut output, &view.monthly_review, format_review);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Orders by Status");
    for entry in &view.status_distribution {
        let _ = writeln!(output, "- {}: {}", entry.label, format_count(entry.count));
    }

    output
}
