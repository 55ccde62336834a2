//! Projection of a candidate expense onto the tiers it would be charged to.
//!
//! Each tier is projected on its own figures. Nothing here asserts that a
//! subcategory's spend sums into its parent; the server owns that invariant.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::models::{BudgetNode, Category, Department, NodeKind, Subcategory};
use super::usage;

/// Current `{budget, used}` figures of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierUsage {
    pub budget: Decimal,
    pub used: Decimal,
}

impl TierUsage {
    pub fn of<N: BudgetNode + ?Sized>(node: &N) -> Self {
        Self { budget: node.budget(), used: node.spent() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactTier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub budget: Decimal,
    pub used: Decimal,
    pub remaining_before: Decimal,
    pub remaining_after: Decimal,
    pub usage_percent_before: Decimal,
    pub usage_percent_after: Decimal,
    pub will_exceed: bool,
}

pub fn project(tier: TierUsage, candidate: Decimal) -> ImpactTier {
    let before = usage::usage(tier.budget, tier.used);
    let used_after = tier.used + candidate;
    let remaining_after = tier.budget - used_after;

    ImpactTier {
        id: None,
        name: None,
        budget: tier.budget,
        used: tier.used,
        remaining_before: before.remaining,
        remaining_after,
        usage_percent_before: before.usage_percent,
        usage_percent_after: usage::usage_percent(tier.budget, used_after),
        will_exceed: remaining_after < Decimal::ZERO,
    }
}

pub fn project_node<N: BudgetNode + ?Sized>(node: &N, candidate: Decimal) -> ImpactTier {
    ImpactTier {
        id: Some(node.id()),
        name: Some(node.name().to_string()),
        ..project(TierUsage::of(node), candidate)
    }
}

/// Impact of one expense on up to three tiers. Absent tiers are not errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetImpact {
    #[serde(default)]
    pub department: Option<ImpactTier>,
    #[serde(default)]
    pub category: Option<ImpactTier>,
    #[serde(default)]
    pub subcategory: Option<ImpactTier>,
}

impl BudgetImpact {
    pub fn is_empty(&self) -> bool {
        self.department.is_none() && self.category.is_none() && self.subcategory.is_none()
    }

    /// True when any present tier would go over budget.
    pub fn any_will_exceed(&self) -> bool {
        let exceeds = |t: &Option<ImpactTier>| t.as_ref().map_or(false, |t| t.will_exceed);
        exceeds(&self.department) || exceeds(&self.category) || exceeds(&self.subcategory)
    }

    pub fn tier(&self, kind: NodeKind) -> Option<&ImpactTier> {
        match kind {
            NodeKind::Department => self.department.as_ref(),
            NodeKind::Category => self.category.as_ref(),
            NodeKind::Subcategory => self.subcategory.as_ref(),
        }
    }

    /// Present tiers, department first.
    pub fn tiers(&self) -> impl Iterator<Item = (NodeKind, &ImpactTier)> {
        NodeKind::ALL
            .into_iter()
            .filter_map(move |kind| self.tier(kind).map(|t| (kind, t)))
    }
}

/// Projects `amount` onto every tier of one department/category/subcategory path.
pub fn project_path(
    department: &Department,
    category: Option<&Category>,
    subcategory: Option<&Subcategory>,
    amount: Decimal,
) -> BudgetImpact {
    BudgetImpact {
        department: Some(project_node(department, amount)),
        category: category.map(|c| project_node(c, amount)),
        subcategory: subcategory.map(|s| project_node(s, amount)),
    }
}

/// One tier as the expense endpoints send it. Only `budget` and `used` are
/// required; derived figures the server omits are filled in by [`project`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactTierPayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub budget: Decimal,
    #[serde(default, alias = "spent")]
    pub used: Decimal,
    #[serde(default)]
    pub remaining_before: Option<Decimal>,
    #[serde(default)]
    pub remaining_after: Option<Decimal>,
    #[serde(default)]
    pub usage_percent_before: Option<Decimal>,
    #[serde(default)]
    pub usage_percent_after: Option<Decimal>,
    #[serde(default)]
    pub will_exceed: Option<bool>,
}

impl ImpactTierPayload {
    pub fn resolve(&self, amount: Decimal) -> ImpactTier {
        let projected = project(TierUsage { budget: self.budget, used: self.used }, amount);
        let remaining_after = self.remaining_after.unwrap_or(projected.remaining_after);

        ImpactTier {
            id: self.id,
            name: self.name.clone(),
            budget: self.budget,
            used: self.used,
            remaining_before: self.remaining_before.unwrap_or(projected.remaining_before),
            remaining_after,
            usage_percent_before: self
                .usage_percent_before
                .unwrap_or(projected.usage_percent_before),
            usage_percent_after: self
                .usage_percent_after
                .unwrap_or(projected.usage_percent_after),
            will_exceed: self.will_exceed.unwrap_or(remaining_after < Decimal::ZERO),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetImpactPayload {
    #[serde(default)]
    pub department: Option<ImpactTierPayload>,
    #[serde(default)]
    pub category: Option<ImpactTierPayload>,
    #[serde(default)]
    pub subcategory: Option<ImpactTierPayload>,
}

impl BudgetImpactPayload {
    pub fn resolve(&self, amount: Decimal) -> BudgetImpact {
        BudgetImpact {
            department: self.department.as_ref().map(|t| t.resolve(amount)),
            category: self.category.as_ref().map(|t| t.resolve(amount)),
            subcategory: self.subcategory.as_ref().map(|t| t.resolve(amount)),
        }
    }
}
