//! Department → category → subcategory tree: normalization, search,
//! rollups, expansion state and sorting.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::models::{BudgetNode, Category, Department, NodeKind, Subcategory};
use super::usage::{self, Usage};

/// Normalizes a fetched structure. Server order is kept as-is.
pub fn build_tree(raw: Vec<Department>) -> Vec<Department> {
    raw.into_iter()
        .map(|mut dept| {
            dept.name = dept.name.trim().to_string();
            dept.budget = non_negative(dept.budget, NodeKind::Department, dept.id);
            for cat in &mut dept.categories {
                cat.name = cat.name.trim().to_string();
                cat.budget = non_negative(cat.budget, NodeKind::Category, cat.id);
                if cat.currency.is_empty() {
                    cat.currency = dept.currency.clone();
                }
                for sub in &mut cat.subcategories {
                    sub.name = sub.name.trim().to_string();
                    sub.budget = non_negative(sub.budget, NodeKind::Subcategory, sub.id);
                    if sub.currency.is_empty() {
                        sub.currency = cat.currency.clone();
                    }
                }
            }
            dept
        })
        .collect()
}

fn non_negative(budget: Decimal, kind: NodeKind, id: i64) -> Decimal {
    if budget < Decimal::ZERO {
        log::warn!("{} {} has negative budget {}, treating as 0", kind.label(), id, budget);
        Decimal::ZERO
    } else {
        budget
    }
}

/// Case-insensitive substring search. A department is kept, with its whole
/// structure, when it or any of its descendants matches.
pub fn filter(tree: &[Department], query: &str) -> Vec<Department> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return tree.to_vec();
    }

    let matches = |name: &str| name.to_lowercase().contains(&needle);
    tree.iter()
        .filter(|dept| {
            matches(&dept.name)
                || dept.categories.iter().any(|cat| {
                    matches(&cat.name) || cat.subcategories.iter().any(|sub| matches(&sub.name))
                })
        })
        .cloned()
        .collect()
}

/// Summed `{budget, spent}` of a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub budget: Decimal,
    pub spent: Decimal,
}

impl Totals {
    pub fn usage(&self) -> Usage {
        usage::usage(self.budget, self.spent)
    }
}

impl std::ops::Add for Totals {
    type Output = Totals;

    fn add(self, rhs: Totals) -> Totals {
        Totals { budget: self.budget + rhs.budget, spent: self.spent + rhs.spent }
    }
}

impl std::iter::Sum for Totals {
    fn sum<I: Iterator<Item = Totals>>(iter: I) -> Totals {
        iter.fold(Totals::default(), |acc, t| acc + t)
    }
}

/// Bottom-up rollup: a leaf reports its own figures, a parent with children
/// reports the sum of its children's rollups.
pub trait Rollup {
    fn rollup(&self) -> Totals;
}

impl Rollup for Subcategory {
    fn rollup(&self) -> Totals {
        Totals { budget: self.budget, spent: self.spent }
    }
}

impl Rollup for Category {
    fn rollup(&self) -> Totals {
        if self.subcategories.is_empty() {
            Totals { budget: self.budget, spent: self.spent }
        } else {
            self.subcategories.iter().map(Rollup::rollup).sum()
        }
    }
}

impl Rollup for Department {
    fn rollup(&self) -> Totals {
        if self.categories.is_empty() {
            Totals { budget: self.budget, spent: self.spent }
        } else {
            self.categories.iter().map(Rollup::rollup).sum()
        }
    }
}

/// Figures of a department's own categories, one level down. Unlike
/// [`Rollup`] this never descends into subcategories.
pub fn category_allocation(department: &Department) -> Totals {
    department
        .categories
        .iter()
        .map(|c| Totals { budget: c.budget, spent: c.spent })
        .sum()
}

/// Organization-wide summary from department-level figures.
pub fn org_totals(tree: &[Department]) -> Totals {
    tree.iter()
        .map(|d| Totals { budget: d.budget, spent: d.spent })
        .sum()
}

/// Expanded departments and categories, tracked independently by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded_depts: HashSet<i64>,
    expanded_cats: HashSet<i64>,
}

impl ExpansionState {
    pub fn toggle_department(&mut self, id: i64) -> bool {
        toggle(&mut self.expanded_depts, id)
    }

    pub fn toggle_category(&mut self, id: i64) -> bool {
        toggle(&mut self.expanded_cats, id)
    }

    pub fn is_department_expanded(&self, id: i64) -> bool {
        self.expanded_depts.contains(&id)
    }

    pub fn is_category_expanded(&self, id: i64) -> bool {
        self.expanded_cats.contains(&id)
    }

    pub fn expand_all(&mut self, tree: &[Department]) {
        for dept in tree {
            self.expanded_depts.insert(dept.id);
            self.expanded_cats.extend(dept.categories.iter().map(|c| c.id));
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded_depts.clear();
        self.expanded_cats.clear();
    }
}

fn toggle(set: &mut HashSet<i64>, id: i64) -> bool {
    if set.remove(&id) {
        false
    } else {
        set.insert(id);
        true
    }
}

/// One visible line of the flattened tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub kind: NodeKind,
    pub id: i64,
    pub department_id: i64,
    pub category_id: Option<i64>,
    pub depth: usize,
    pub name: String,
    pub budget: Decimal,
    pub spent: Decimal,
    pub currency: String,
    pub is_welfare: bool,
    pub has_children: bool,
    pub expanded: bool,
}

impl TreeRow {
    pub fn usage(&self) -> Usage {
        usage::usage(self.budget, self.spent)
    }
}

pub fn visible_rows(tree: &[Department], expansion: &ExpansionState) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    for dept in tree {
        let dept_open = expansion.is_department_expanded(dept.id);
        rows.push(TreeRow {
            kind: NodeKind::Department,
            id: dept.id,
            department_id: dept.id,
            category_id: None,
            depth: 0,
            name: dept.name.clone(),
            budget: dept.budget,
            spent: dept.spent,
            currency: dept.currency.clone(),
            is_welfare: false,
            has_children: !dept.categories.is_empty(),
            expanded: dept_open,
        });
        if !dept_open {
            continue;
        }
        for cat in &dept.categories {
            let cat_open = expansion.is_category_expanded(cat.id);
            rows.push(TreeRow {
                kind: NodeKind::Category,
                id: cat.id,
                department_id: dept.id,
                category_id: Some(cat.id),
                depth: 1,
                name: cat.name.clone(),
                budget: cat.budget,
                spent: cat.spent,
                currency: cat.currency.clone(),
                is_welfare: cat.is_welfare,
                has_children: !cat.subcategories.is_empty(),
                expanded: cat_open,
            });
            if !cat_open {
                continue;
            }
            rows.extend(cat.subcategories.iter().map(|sub| TreeRow {
                kind: NodeKind::Subcategory,
                id: sub.id,
                department_id: dept.id,
                category_id: Some(cat.id),
                depth: 2,
                name: sub.name.clone(),
                budget: sub.budget,
                spent: sub.spent,
                currency: sub.currency.clone(),
                is_welfare: cat.is_welfare,
                has_children: false,
                expanded: false,
            }));
        }
    }
    rows
}

/// Borrowed path from a department down to one node.
#[derive(Debug, Clone, Copy)]
pub struct NodePath<'a> {
    pub department: &'a Department,
    pub category: Option<&'a Category>,
    pub subcategory: Option<&'a Subcategory>,
}

impl<'a> NodePath<'a> {
    /// The node the path ends at.
    pub fn leaf(&self) -> &'a dyn BudgetNode {
        match (self.category, self.subcategory) {
            (_, Some(sub)) => sub,
            (Some(cat), None) => cat,
            (None, None) => self.department,
        }
    }
}

pub fn find_path(tree: &[Department], kind: NodeKind, id: i64) -> Option<NodePath<'_>> {
    for department in tree {
        if kind == NodeKind::Department && department.id == id {
            return Some(NodePath { department, category: None, subcategory: None });
        }
        for category in &department.categories {
            if kind == NodeKind::Category && category.id == id {
                return Some(NodePath { department, category: Some(category), subcategory: None });
            }
            if kind == NodeKind::Subcategory {
                if let Some(sub) = category.subcategories.iter().find(|s| s.id == id) {
                    return Some(NodePath {
                        department,
                        category: Some(category),
                        subcategory: Some(sub),
                    });
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Budget,
    Spent,
    Remaining,
    Utilization,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Name,
        SortKey::Budget,
        SortKey::Spent,
        SortKey::Remaining,
        SortKey::Utilization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Budget => "budget",
            Self::Spent => "spent",
            Self::Remaining => "remaining",
            Self::Utilization => "utilization",
        }
    }

    pub fn next(&self) -> SortKey {
        let pos = Self::ALL.iter().position(|k| k == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown sort key '{s}' (expected name, budget, spent, remaining or utilization)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(&self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Ascending => "↑",
            Self::Descending => "↓",
        }
    }
}

fn compare_by<N: BudgetNode + ?Sized>(a: &N, b: &N, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
        SortKey::Budget => a.budget().cmp(&b.budget()),
        SortKey::Spent => a.spent().cmp(&b.spent()),
        SortKey::Remaining => a.usage().remaining.cmp(&b.usage().remaining),
        SortKey::Utilization => a.usage().usage_percent.cmp(&b.usage().usage_percent),
    }
}

/// Stable sort; nodes with equal keys keep their server order in both
/// directions.
pub fn sort_nodes<N: BudgetNode>(items: &mut [N], key: SortKey, direction: SortDirection) {
    items.sort_by(|a, b| {
        let ord = compare_by(a, b, key);
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

/// A welfare category together with the department that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct WelfareRow {
    pub department_id: i64,
    pub department_name: String,
    pub category: Category,
}

impl BudgetNode for WelfareRow {
    fn id(&self) -> i64 {
        self.category.id
    }
    fn name(&self) -> &str {
        &self.category.name
    }
    fn budget(&self) -> Decimal {
        self.category.budget
    }
    fn spent(&self) -> Decimal {
        self.category.spent
    }
    fn currency(&self) -> &str {
        &self.category.currency
    }
}

pub fn welfare_rows(tree: &[Department]) -> Vec<WelfareRow> {
    tree.iter()
        .flat_map(|dept| {
            dept.categories
                .iter()
                .filter(|c| c.is_welfare)
                .map(move |c| WelfareRow {
                    department_id: dept.id,
                    department_name: dept.name.clone(),
                    category: c.clone(),
                })
        })
        .collect()
}
