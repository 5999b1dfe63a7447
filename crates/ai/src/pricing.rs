//! Margin-driven price optimization with competitor positioning.

use serde::{Deserialize, Serialize};

use supplysight_core::ItemId;

use crate::snapshot::PricedItem;

/// Floor on the final price, as a multiple of cost.
const MIN_MARKUP: f64 = 1.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingParameters {
    /// Carried through as `demand_sensitivity`; does not move the price.
    pub demand_elasticity: f64,
    /// Target margin on price, in \[0, 1).
    pub target_margin: f64,
}

impl Default for PricingParameters {
    fn default() -> Self {
        Self {
            demand_elasticity: -1.5,
            target_margin: 0.30,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitivePosition {
    Low,
    Competitive,
    Premium,
}

impl CompetitivePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Competitive => "competitive",
            Self::Premium => "premium",
        }
    }
}

/// Append-only pricing recommendation for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceOptimization {
    pub item_id: ItemId,
    pub current_price: f64,
    pub optimized_price: f64,
    /// Relative profit gain per unit; 0 when the new price does not raise profit.
    pub expected_profit_increase: f64,
    pub demand_sensitivity: f64,
    pub competitive_position: CompetitivePosition,
    pub recommendation: String,
}

impl PriceOptimization {
    /// Signed relative price change, 0 when there is no current price.
    pub fn price_delta(&self) -> f64 {
        if self.current_price > 0.0 {
            (self.optimized_price - self.current_price) / self.current_price
        } else {
            0.0
        }
    }
}

struct CompetitorStats {
    avg: f64,
    min: f64,
    max: f64,
}

fn competitor_stats(prices: &[f64]) -> Option<CompetitorStats> {
    let prices: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    if prices.is_empty() {
        return None;
    }
    let avg = prices.iter().sum::<f64>() / prices.len() as f64;
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(CompetitorStats { avg, min, max })
}

fn margin_price(cost: f64, target_margin: f64) -> f64 {
    cost * (1.0 + target_margin / (1.0 - target_margin))
}

fn adjust_for_competition(price: f64, stats: Option<&CompetitorStats>) -> f64 {
    match stats {
        // Slightly under the average, kept inside [1.05·min, 0.90·max]; the lower bound
        // wins when the two cross.
        Some(s) => (s.min * 1.05).max((s.max * 0.9).min(s.avg * 0.95)),
        None => price,
    }
}

fn profit_increase(current_price: f64, new_price: f64, cost: f64) -> f64 {
    let current_profit = current_price - cost;
    let new_profit = new_price - cost;
    if new_profit > current_profit && current_profit > 0.0 {
        (new_profit - current_profit) / current_profit
    } else {
        0.0
    }
}

fn position(price: f64, stats: Option<&CompetitorStats>) -> CompetitivePosition {
    match stats {
        Some(s) if price < s.avg * 0.9 => CompetitivePosition::Low,
        Some(s) if price > s.avg * 1.1 => CompetitivePosition::Premium,
        _ => CompetitivePosition::Competitive,
    }
}

fn recommendation(current_price: f64, new_price: f64) -> String {
    if current_price <= 0.0 {
        return format!("No current list price. Establish a list price of {new_price:.2}.");
    }

    let diff = (new_price - current_price) / current_price * 100.0;
    if diff.abs() < 2.0 {
        "Current pricing is optimal. No immediate changes needed.".to_string()
    } else if diff > 5.0 {
        format!("Consider increasing price by {diff:.1}% to improve margins.")
    } else if diff < -5.0 {
        format!("Consider decreasing price by {:.1}% to improve competitiveness.", diff.abs())
    } else {
        let sign = if diff > 0.0 { "+" } else { "" };
        format!("Minor price adjustment of {sign}{diff:.1}% recommended.")
    }
}

pub fn optimize_price(item: &PricedItem, competitor_prices: &[f64], params: PricingParameters) -> PriceOptimization {
    let cost = item.unit_cost;
    let stats = competitor_stats(competitor_prices);

    let optimal = margin_price(cost, params.target_margin);
    let adjusted = adjust_for_competition(optimal, stats.as_ref());
    let final_price = (cost * MIN_MARKUP).max(adjusted);

    PriceOptimization {
        item_id: item.item_id,
        current_price: item.unit_price,
        optimized_price: final_price,
        expected_profit_increase: profit_increase(item.unit_price, final_price, cost),
        demand_sensitivity: params.demand_elasticity.abs(),
        competitive_position: position(final_price, stats.as_ref()),
        recommendation: recommendation(item.unit_price, final_price),
    }
}
