//! Demand forecasting from outbound stock movements.
//!
//! Model:
//! - Sum outbound quantities per UTC calendar day, kept in date order.
//! - Weekly pattern: mean daily demand per weekday (Sunday = 0).
//! - Monthly pattern: mean daily demand per calendar month (January = 0).
//! - Trend: least-squares slope of the chronological daily series.
//! - Forecast(H) = recent average (last 14 demand days) × seasonal multiplier
//!   × (1 + trend × H / 365) × H, floored at 0.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use supplysight_core::ItemId;

use crate::snapshot::{MovementKind, StockMovement};
use crate::stats::{least_squares_slope, mean, std_dev_population};

const RECENT_WINDOW_DAYS: usize = 14;
const MIN_DAYS_FOR_CONFIDENCE: usize = 7;
const MIN_CONFIDENCE: f64 = 0.3;
const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastHorizons {
    pub next_7_days: f64,
    pub next_30_days: f64,
    pub next_90_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    /// Mean daily demand per weekday, Sunday first.
    pub weekly_pattern: [f64; 7],
    /// Mean daily demand per month, January first.
    pub monthly_pattern: [f64; 12],
}

/// Forecast for one item. Upserted by `item_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub item_id: ItemId,
    /// Empty until the caller fills it in.
    pub sku: String,
    pub predictions: ForecastHorizons,
    pub seasonality: Seasonality,
    pub trend: f64,
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
}

type DailyDemand = BTreeMap<NaiveDate, f64>;

fn daily_demand(movements: &[StockMovement]) -> DailyDemand {
    let mut days = DailyDemand::new();
    for m in movements.iter().filter(|m| m.kind == MovementKind::Outbound) {
        *days.entry(m.timestamp.date_naive()).or_insert(0.0) += m.quantity;
    }
    days
}

fn bucket_means<const N: usize>(days: &DailyDemand, bucket: impl Fn(&NaiveDate) -> usize) -> [f64; N] {
    let mut totals = [0.0; N];
    let mut counts = [0usize; N];
    for (date, demand) in days {
        let b = bucket(date);
        totals[b] += demand;
        counts[b] += 1;
    }

    let mut out = [0.0; N];
    for i in 0..N {
        if counts[i] > 0 {
            out[i] = totals[i] / counts[i] as f64;
        }
    }
    out
}

fn recent_average(days: &DailyDemand) -> f64 {
    let recent: Vec<f64> = days.values().rev().take(RECENT_WINDOW_DAYS).copied().collect();
    if recent.is_empty() { 0.0 } else { mean(&recent) }
}

fn weekly_multiplier(weekly: &[f64; 7]) -> f64 {
    let avg = weekly.iter().sum::<f64>() / 7.0;
    // Relative to the Sunday bucket.
    if avg > 0.0 && weekly[0] > 0.0 { avg / weekly[0] } else { 1.0 }
}

fn monthly_multiplier(monthly: &[f64; 12], as_of: DateTime<Utc>) -> f64 {
    let m = monthly[as_of.month0() as usize];
    if m == 0.0 || m.is_nan() { 1.0 } else { m }
}

fn confidence(days: &DailyDemand) -> f64 {
    if days.len() < MIN_DAYS_FOR_CONFIDENCE {
        return MIN_CONFIDENCE;
    }
    let values: Vec<f64> = days.values().copied().collect();
    let avg = mean(&values);
    if avg <= 0.0 {
        return MIN_CONFIDENCE;
    }
    let cv = std_dev_population(&values, avg) / avg;
    (1.0 - cv).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Pure function of its inputs; `as_of` picks the current month and stamps `last_updated`.
pub fn forecast_demand(item_id: ItemId, movements: &[StockMovement], as_of: DateTime<Utc>) -> DemandForecast {
    let days = daily_demand(movements);

    let weekly_pattern: [f64; 7] = bucket_means(&days, |d| d.weekday().num_days_from_sunday() as usize);
    let monthly_pattern: [f64; 12] = bucket_means(&days, |d| d.month0() as usize);

    let series: Vec<f64> = days.values().copied().collect();
    let trend = least_squares_slope(&series);
    let trend = if trend.is_finite() { trend } else { 0.0 };

    let base = recent_average(&days);
    let horizon = |multiplier: f64, h: f64| (base * multiplier * (1.0 + trend * h / 365.0) * h).max(0.0);

    let weekly = weekly_multiplier(&weekly_pattern);
    let monthly = monthly_multiplier(&monthly_pattern, as_of);

    DemandForecast {
        item_id,
        sku: String::new(),
        predictions: ForecastHorizons {
            next_7_days: horizon(weekly, 7.0),
            next_30_days: horizon(monthly, 30.0),
            next_90_days: horizon(monthly, 90.0),
        },
        seasonality: Seasonality {
            weekly_pattern,
            monthly_pattern,
        },
        trend,
        confidence: confidence(&days),
        last_updated: as_of,
    }
}
