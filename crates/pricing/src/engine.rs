//! Price computation.
//!
//! ```text
//! subtotal  = category + diamond finish + engravings × unit
//!           + Σ lens options + shape change
//! surcharge = subtotal × urgency rate
//! total     = subtotal + surcharge
//! ```
//!
//! `price` is derived from `breakdown`, so the two can never disagree.

use serde::{Deserialize, Serialize};

use atelier_core::Money;
use atelier_orders::{JobOptions, Order};

use crate::catalog::{CatalogEntry, PricingCatalog, Tier};

/// What a breakdown line prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Category,
    DiamondFinish,
    Engraving,
    LensOption,
    ShapeChange,
    UrgencySurcharge,
}

/// One non-zero contribution to a job's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceComponent {
    pub kind: ComponentKind,
    pub description: String,
    pub amount: Money,
}

/// Ordered, human-readable projection of a job's price.
///
/// Component order: category, diamond finish, engraving, each lens option in
/// selection order, shape change, urgency surcharge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub tier: Tier,
    pub catalog_version: u32,
    pub components: Vec<PriceComponent>,
    pub subtotal: Money,
    pub surcharge: Money,
    pub total: Money,
}

impl PriceBreakdown {
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.description.as_str())
    }
}

/// Pure pricing function over an injected catalog.
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine<'a> {
    catalog: &'a PricingCatalog,
}

impl<'a> PricingEngine<'a> {
    pub fn new(catalog: &'a PricingCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a PricingCatalog {
        self.catalog
    }

    pub fn price(&self, options: &JobOptions, tier: Tier) -> Money {
        self.breakdown(options, tier).total
    }

    /// Price of a placed order; an order without details prices at zero.
    pub fn price_order(&self, order: &Order, tier: Tier) -> Money {
        order
            .options()
            .map(|options| self.price(options, tier))
            .unwrap_or(Money::ZERO)
    }

    pub fn breakdown(&self, options: &JobOptions, tier: Tier) -> PriceBreakdown {
        let catalog = self.catalog;
        let mut components = Vec::new();

        push_entry(&mut components, ComponentKind::Category, catalog.category(&options.category), tier);
        push_entry(
            &mut components,
            ComponentKind::DiamondFinish,
            catalog.diamond_finish(&options.diamond_finish),
            tier,
        );

        if options.engraving_count > 0 {
            let unit = catalog.engraving.cost.for_tier(tier);
            let description = if options.engraving_count == 1 {
                catalog.engraving.label.clone()
            } else {
                format!("{} x{}", catalog.engraving.label, options.engraving_count)
            };
            push_line(
                &mut components,
                ComponentKind::Engraving,
                description,
                unit.times(u32::from(options.engraving_count)),
            );
        }

        for key in &options.lens_options {
            push_entry(&mut components, ComponentKind::LensOption, catalog.lens_option(key), tier);
        }

        if options.shape_change {
            push_entry(&mut components, ComponentKind::ShapeChange, Some(&catalog.shape_change), tier);
        }

        let subtotal: Money = components.iter().map(|c| c.amount).sum();

        let surcharge = match catalog.urgency(&options.urgency) {
            Some(level) => {
                let surcharge = subtotal.percent(level.rate_percent);
                push_line(
                    &mut components,
                    ComponentKind::UrgencySurcharge,
                    format!("{} surcharge ({}%)", level.label, level.rate_percent),
                    surcharge,
                );
                surcharge
            }
            None => Money::ZERO,
        };

        let total = components.iter().map(|c| c.amount).sum();

        PriceBreakdown {
            tier,
            catalog_version: catalog.version,
            components,
            subtotal,
            surcharge,
            total,
        }
    }
}

// Zero amounts (unknown keys, free options) are not listed.
fn push_line(components: &mut Vec<PriceComponent>, kind: ComponentKind, description: String, amount: Money) {
    if !amount.is_zero() {
        components.push(PriceComponent {
            kind,
            description,
            amount,
        });
    }
}

fn push_entry(
    components: &mut Vec<PriceComponent>,
    kind: ComponentKind,
    entry: Option<&CatalogEntry>,
    tier: Tier,
) {
    if let Some(entry) = entry {
        push_line(components, kind, entry.label.clone(), entry.cost.for_tier(tier));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine_price(options: &JobOptions, tier: Tier) -> Money {
        let catalog = PricingCatalog::standard();
        PricingEngine::new(&catalog).price(options, tier)
    }

    fn engine_breakdown(options: &JobOptions, tier: Tier) -> PriceBreakdown {
        let catalog = PricingCatalog::standard();
        PricingEngine::new(&catalog).breakdown(options, tier)
    }

    #[test]
    fn bare_rimmed_job_costs_seven() {
        let options = JobOptions::new("rimmed");
        assert_eq!(engine_price(&options, Tier::Tier1), Money::from_cents(700));

        let breakdown = engine_breakdown(&options, Tier::Tier1);
        assert_eq!(breakdown.components.len(), 1);
        assert_eq!(breakdown.components[0].description, "Rimmed mounting");
    }

    #[test]
    fn same_day_diamond_job_adds_half_of_subtotal() {
        let options = JobOptions::new("rimmed")
            .with_diamond_finish("facet")
            .with_urgency("same-day");

        let breakdown = engine_breakdown(&options, Tier::Tier1);
        assert_eq!(breakdown.subtotal, Money::from_cents(4680));
        assert_eq!(breakdown.surcharge, Money::from_cents(2340));
        assert_eq!(breakdown.total, Money::from_cents(7020));
        assert_eq!(
            breakdown.components.last().map(|c| c.description.as_str()),
            Some("Same day surcharge (50%)")
        );
    }

    #[test]
    fn tier_two_uses_its_own_costs() {
        let options = JobOptions::new("rimmed");
        assert_eq!(engine_price(&options, Tier::Tier2), Money::from_cents(600));
    }

    #[test]
    fn components_follow_the_fixed_order() {
        let options = JobOptions::new("drilled")
            .with_lens_option("tint")
            .with_lens_option("polish")
            .with_diamond_finish("full")
            .with_engravings(2)
            .with_shape_change(true)
            .with_urgency("urgent");

        let kinds: Vec<ComponentKind> = engine_breakdown(&options, Tier::Tier1)
            .components
            .iter()
            .map(|c| c.kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                ComponentKind::Category,
                ComponentKind::DiamondFinish,
                ComponentKind::Engraving,
                ComponentKind::LensOption,
                ComponentKind::LensOption,
                ComponentKind::ShapeChange,
                ComponentKind::UrgencySurcharge,
            ]
        );

        let descriptions: Vec<String> = engine_breakdown(&options, Tier::Tier1)
            .descriptions()
            .map(str::to_string)
            .collect();
        assert_eq!(descriptions[2], "Engraving x2");
        assert_eq!(descriptions[3], "Tinting");
        assert_eq!(descriptions[4], "Edge polish");
    }

    #[test]
    fn zero_cost_components_are_omitted() {
        let options = JobOptions::new("rimmed").with_diamond_finish("none");
        let breakdown = engine_breakdown(&options, Tier::Tier1);
        assert!(breakdown
            .components
            .iter()
            .all(|c| c.kind != ComponentKind::DiamondFinish && c.kind != ComponentKind::UrgencySurcharge));
    }

    #[test]
    fn unknown_keys_price_as_zero() {
        let options = JobOptions::new("hovering")
            .with_diamond_finish("moon-dust")
            .with_lens_option("x-ray")
            .with_urgency("yesterday");

        let breakdown = engine_breakdown(&options, Tier::Tier1);
        assert_eq!(breakdown.total, Money::ZERO);
        assert!(breakdown.components.is_empty());
    }

    #[test]
    fn breakdown_records_catalog_version() {
        let mut catalog = PricingCatalog::standard();
        catalog.version = 7;
        let breakdown = PricingEngine::new(&catalog).breakdown(&JobOptions::new("rimmed"), Tier::Tier1);
        assert_eq!(breakdown.catalog_version, 7);
    }

    fn category() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["rimmed", "nylon-cord", "drilled", "unknown-mount"])
            .prop_map(str::to_string)
    }

    fn lens_option() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["polish", "bevel", "uv", "tint", "mystery"]).prop_map(str::to_string)
    }

    fn job_options() -> impl Strategy<Value = JobOptions> {
        (
            category(),
            prop::collection::vec(lens_option(), 0..4),
            prop::sample::select(vec!["standard", "urgent", "express", "same-day", "warp"]),
            prop::sample::select(vec!["none", "facet", "full", "sparkle"]),
            0u8..=2,
            any::<bool>(),
        )
            .prop_map(|(category, lens_options, urgency, finish, engravings, shape)| JobOptions {
                category,
                lens_options,
                urgency: urgency.to_string(),
                diamond_finish: finish.to_string(),
                engraving_count: engravings,
                shape_change: shape,
            })
    }

    fn tier() -> impl Strategy<Value = Tier> {
        prop::sample::select(vec![Tier::Tier1, Tier::Tier2])
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the breakdown lines always add up to the single total.
        #[test]
        fn breakdown_sum_equals_price(options in job_options(), tier in tier()) {
            let breakdown = engine_breakdown(&options, tier);
            let sum: Money = breakdown.components.iter().map(|c| c.amount).sum();
            prop_assert_eq!(sum, breakdown.total);
            prop_assert_eq!(engine_price(&options, tier), breakdown.total);
            prop_assert_eq!(breakdown.subtotal + breakdown.surcharge, breakdown.total);
        }

        /// Property: an unrecognised lens option never changes the price.
        #[test]
        fn unknown_lens_option_is_free(options in job_options(), tier in tier()) {
            let with_unknown = options.clone().with_lens_option("not-in-catalog");
            prop_assert_eq!(engine_price(&with_unknown, tier), engine_price(&options, tier));
        }

        /// Property: an unrecognised finish prices exactly like "none".
        #[test]
        fn unknown_finish_prices_as_none(options in job_options(), tier in tier()) {
            let unknown = options.clone().with_diamond_finish("not-in-catalog");
            let none = options.with_diamond_finish("none");
            prop_assert_eq!(engine_price(&unknown, tier), engine_price(&none, tier));
        }

        /// Property: pricing is deterministic.
        #[test]
        fn pricing_is_deterministic(options in job_options(), tier in tier()) {
            prop_assert_eq!(engine_breakdown(&options, tier), engine_breakdown(&options, tier));
        }
    }
}
