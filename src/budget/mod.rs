//! Client-side budget read model: usage, impact projection and the
//! organization hierarchy. Everything in here is synchronous and pure.

pub mod hierarchy;
pub mod impact;
pub mod models;
pub mod usage;

pub use hierarchy::{
    build_tree, category_allocation, filter, find_path, org_totals, sort_nodes, visible_rows, welfare_rows,
    ExpansionState, NodePath, Rollup, SortDirection, SortKey, Totals, TreeRow, WelfareRow,
};
pub use impact::{project, project_node, project_path, BudgetImpact, BudgetImpactPayload, ImpactTier, TierUsage};
pub use models::{BudgetNode, Category, Department, ExpenseDetail, NodeKind, OrganizationStructure, Subcategory};
pub use usage::{usage, Severity, Usage};
