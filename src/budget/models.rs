// src/budget/models.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::usage::{self, Usage};

/// Tier of the organization hierarchy a node lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Department,
    Category,
    Subcategory,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::Department, NodeKind::Category, NodeKind::Subcategory];

    /// Path segment used by the organization endpoints.
    pub fn as_path(&self) -> &'static str {
        match self {
            Self::Department => "departments",
            Self::Category => "categories",
            Self::Subcategory => "subcategories",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Department => "Department",
            Self::Category => "Category",
            Self::Subcategory => "Subcategory",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Department => 0,
            Self::Category => 1,
            Self::Subcategory => 2,
        }
    }
}

/// Common view over every node of the budget tree.
pub trait BudgetNode {
    fn id(&self) -> i64;
    fn name(&self) -> &str;
    fn budget(&self) -> Decimal;
    fn spent(&self) -> Decimal;
    fn currency(&self) -> &str;

    fn usage(&self) -> Usage {
        usage::usage(self.budget(), self.spent())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub budget: Decimal,
    #[serde(default)]
    pub spent: Decimal,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub budget: Decimal,
    #[serde(default)]
    pub spent: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub is_welfare: bool, // tracked by HR on the welfare dashboard
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub budget: Decimal,
    #[serde(default)]
    pub spent: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// Body of `GET /organization/structure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationStructure {
    #[serde(default)]
    pub structure: Vec<Department>,
    #[serde(default)]
    pub view_only: bool,
}

macro_rules! impl_budget_node {
    ($($t:ty),*) => {$(
        impl BudgetNode for $t {
            fn id(&self) -> i64 { self.id }
            fn name(&self) -> &str { &self.name }
            fn budget(&self) -> Decimal { self.budget }
            fn spent(&self) -> Decimal { self.spent }
            fn currency(&self) -> &str { &self.currency }
        }
    )*};
}

impl_budget_node!(Department, Category, Subcategory);

/// Expense detail as returned by `GET /expenses/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDetail {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String, // pending / approved / rejected
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    #[serde(default)]
    pub budget_impact: Option<super::impact::BudgetImpactPayload>,
}

impl ExpenseDetail {
    pub fn is_pending(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("pending")
    }
}
