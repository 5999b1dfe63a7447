use std::cmp::Ordering;

use super::types::{
    ActionKind, AnomalyReport, BusinessInsights, PricingRun, Priority, RecommendedAction, SupplierAnalysis,
};

/// Folds one round of supplier, pricing and anomaly analysis into [`BusinessInsights`].
#[derive(Debug, Clone, Copy)]
pub struct BusinessInsightsAggregator {
    /// Risk score above which a supplier review is recommended.
    pub supplier_review_risk: f64,
    /// Profit increase above which a pricing action is recommended.
    pub pricing_action_increase: f64,
    /// |profit increase| above which an item counts as an optimization opportunity.
    pub opportunity_increase: f64,
}

impl Default for BusinessInsightsAggregator {
    fn default() -> Self {
        Self {
            supplier_review_risk: 70.0,
            pricing_action_increase: 0.10,
            opportunity_increase: 0.05,
        }
    }
}

impl BusinessInsightsAggregator {
    pub fn aggregate(
        &self,
        suppliers: &SupplierAnalysis,
        pricing: &PricingRun,
        anomalies: &AnomalyReport,
        demand_forecast_accuracy: f64,
    ) -> BusinessInsights {
        let total_supplier_risk = if suppliers.risk_scores.is_empty() {
            0.0
        } else {
            suppliers.risk_scores.iter().map(|r| r.risk_score).sum::<f64>() / suppliers.risk_scores.len() as f64
        };

        let inventory_optimization_opportunities = pricing
            .optimizations
            .iter()
            .filter(|o| o.expected_profit_increase.abs() > self.opportunity_increase)
            .count();

        let price_optimization_potential = pricing.optimizations.iter().map(|o| o.expected_profit_increase).sum();

        BusinessInsights {
            total_supplier_risk,
            inventory_optimization_opportunities,
            demand_forecast_accuracy,
            price_optimization_potential,
            anomalies_requiring_attention: anomalies.requiring_attention(),
            recommended_actions: self.recommended_actions(suppliers, pricing),
        }
    }

    /// Highest priority first; larger risk/profit first within a priority.
    pub fn recommended_actions(&self, suppliers: &SupplierAnalysis, pricing: &PricingRun) -> Vec<RecommendedAction> {
        let supplier_actions = suppliers
            .risk_scores
            .iter()
            .filter(|r| r.risk_score > self.supplier_review_risk)
            .map(|r| RecommendedAction {
                kind: ActionKind::Supplier,
                priority: Priority::High,
                entity_id: r.supplier_id.to_string(),
                action: "Review supplier relationship and consider alternatives".to_string(),
                potential_impact: "Reduced supply chain risk".to_string(),
                timeframe: "Within 30 days".to_string(),
                magnitude: r.risk_score,
            });

        let pricing_actions = pricing
            .optimizations
            .iter()
            .filter(|o| o.expected_profit_increase > self.pricing_action_increase)
            .map(|o| RecommendedAction {
                kind: ActionKind::Pricing,
                priority: Priority::Medium,
                entity_id: o.item_id.to_string(),
                action: format!("Optimize pricing for item {}", o.item_id),
                potential_impact: format!("{:.1}% profit increase", o.expected_profit_increase * 100.0),
                timeframe: "Within 2 weeks".to_string(),
                magnitude: o.expected_profit_increase,
            });

        let mut actions: Vec<RecommendedAction> = supplier_actions.chain(pricing_actions).collect();
        actions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.magnitude.partial_cmp(&a.magnitude).unwrap_or(Ordering::Equal))
        });
        actions
    }
}
