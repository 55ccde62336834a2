//! Plain-text renderings used by the headless subcommands.

use std::fmt::Write;

use rust_decimal::Decimal;

use crate::budget::{category_allocation, org_totals, usage, BudgetNode, Department, Rollup, TreeRow, WelfareRow};
use crate::cli::util::{fmt_money, fmt_percent, text_bar};

const BAR_WIDTH: usize = 10;

fn push_row(out: &mut String, label: &str, budget: &Decimal, spent: &Decimal) {
    let usage = usage(*budget, *spent);
    let flag = if usage.over_budget { "  OVER" } else { "" };
    let _ = writeln!(
        out,
        "{:<36} {:>14} {:>14} {:>14}  {} {:>7}{}",
        label,
        fmt_money(budget),
        fmt_money(spent),
        fmt_money(&usage.remaining),
        text_bar(&usage.usage_percent, BAR_WIDTH),
        fmt_percent(&usage.usage_percent),
        flag
    );
}

fn header(out: &mut String, first: &str) {
    let _ = writeln!(
        out,
        "{:<36} {:>14} {:>14} {:>14}  {}",
        first, "Budget", "Spent", "Remaining", "Usage"
    );
    let _ = writeln!(out, "{}", "-".repeat(104));
}

/// Indented tree of the given rows, followed by the organization totals and
/// per-department category allocation.
pub fn tree_report(tree: &[Department], rows: &[TreeRow]) -> String {
    let mut out = String::new();
    header(&mut out, "Name");
    for row in rows {
        let label = format!("{}{}", "  ".repeat(row.depth), row.name);
        push_row(&mut out, &label, &row.budget, &row.spent);
    }

    let totals = org_totals(tree);
    out.push('\n');
    push_row(&mut out, "Organization total", &totals.budget, &totals.spent);
    for dept in tree {
        let allocated = category_allocation(dept);
        let rolled = dept.rollup();
        let _ = writeln!(
            out,
            "  {}: {} of {} allocated to categories, rolled-up spend {}",
            dept.name,
            fmt_money(&allocated.budget),
            fmt_money(&dept.budget),
            fmt_money(&rolled.spent)
        );
    }
    out
}

pub fn welfare_report(rows: &[WelfareRow]) -> String {
    let mut out = String::new();
    header(&mut out, "Department / Category");
    if rows.is_empty() {
        out.push_str("No welfare categories\n");
        return out;
    }
    for row in rows {
        let label = format!("{} / {}", row.department_name, row.name());
        push_row(&mut out, &label, &row.budget(), &row.spent());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{visible_rows, Category, ExpansionState, Subcategory};

    fn tree() -> Vec<Department> {
        vec![Department {
            id: 1,
            name: "Sales".into(),
            budget: Decimal::from(1000),
            spent: Decimal::from(1200),
            currency: "CAD".into(),
            categories: vec![Category {
                id: 2,
                name: "Meals".into(),
                budget: Decimal::from(400),
                spent: Decimal::from(100),
                currency: "CAD".into(),
                is_welfare: true,
                subcategories: vec![],
            }],
        }]
    }

    #[test]
    fn tree_report_lists_rows_and_totals() {
        let tree = tree();
        let mut exp = ExpansionState::default();
        exp.expand_all(&tree);
        let text = tree_report(&tree, &visible_rows(&tree, &exp));
        assert!(text.contains("  Meals"));
        assert!(text.contains("Organization total"));
        assert!(text.contains("-200.00"));
        assert!(text.contains("OVER"));
        assert!(text.contains("Sales: 400.00 of 1000.00 allocated"));
    }

    #[test]
    fn allocation_counts_category_budgets_not_subcategories() {
        let mut tree = tree();
        tree[0].categories[0].subcategories.push(Subcategory {
            id: 3,
            name: "Lunches".into(),
            budget: Decimal::from(150),
            spent: Decimal::from(60),
            currency: "CAD".into(),
        });
        let text = tree_report(&tree, &[]);
        assert!(text.contains("Sales: 400.00 of 1000.00 allocated to categories, rolled-up spend 60.00"));
    }

    #[test]
    fn welfare_report_handles_empty() {
        assert!(welfare_report(&[]).contains("No welfare categories"));
        let rows = crate::budget::welfare_rows(&tree());
        assert!(welfare_report(&rows).contains("Sales / Meals"));
    }
}
