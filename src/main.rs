// src/main.rs
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rust_decimal::Decimal;

use expense_budget_tracker::api::Client;
use expense_budget_tracker::budget::{
    build_tree, filter, find_path, project_path, sort_nodes, visible_rows, welfare_rows, BudgetNode,
    Department, ExpansionState, NodeKind, SortDirection, SortKey,
};
use expense_budget_tracker::cli::{self, impact_widget::{impact_text, ImpactWidgetState}};
use expense_budget_tracker::cli::util::{fmt_money, fmt_money_in};
use expense_budget_tracker::config::Config;
use expense_budget_tracker::{logging, report};

#[derive(Parser, Debug)]
#[command(name = "expense-budget-tracker", version, about = "Organization budget hierarchy and expense impact")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fiscal year to load (overrides config and BUDGET_YEAR_ID)
    #[arg(long, global = true)]
    year_id: Option<i64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,
    /// Print the fully expanded hierarchy with rollups
    Tree {
        #[arg(long)]
        search: Option<String>,
    },
    /// Print the welfare categories overview
    Welfare {
        #[arg(long, default_value = "name")]
        sort: SortKey,
        #[arg(long)]
        desc: bool,
    },
    /// Print the budget impact of an expense, or of a hypothetical amount
    Impact {
        #[arg(long, conflicts_with_all = ["department_id", "category_id", "subcategory_id"])]
        expense_id: Option<i64>,
        #[arg(long)]
        department_id: Option<i64>,
        #[arg(long)]
        category_id: Option<i64>,
        #[arg(long)]
        subcategory_id: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        amount: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Cli::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(year) = args.year_id {
        config.year_id = Some(year);
    }
    config.validate()?;

    let command = args.command.unwrap_or(Command::Tui);
    match command {
        Command::Tui => {
            // the terminal is busy; only log when a file is configured
            if let Some(path) = config.log_file.as_deref() {
                logging::init(Some(path))?;
            }
            cli::run(&config).await?;
        }
        headless => {
            logging::init(config.log_file.as_deref())?;
            let client = Client::new(&config.api)?;
            run_headless(&client, config.year_id, headless).await?;
        }
    }
    Ok(())
}

async fn load_tree(client: &Client, year_id: Option<i64>) -> anyhow::Result<Vec<Department>> {
    let org = client.organization_structure(year_id).await?;
    Ok(build_tree(org.structure))
}

async fn run_headless(client: &Client, year_id: Option<i64>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Tui => bail!("the terminal UI is not a headless command"),
        Command::Tree { search } => {
            let tree = load_tree(client, year_id).await?;
            let shown = match search.as_deref() {
                Some(q) => filter(&tree, q),
                None => tree.clone(),
            };
            if shown.is_empty() {
                println!("No departments match");
                return Ok(());
            }
            let mut expansion = ExpansionState::default();
            expansion.expand_all(&shown);
            print!("{}", report::tree_report(&shown, &visible_rows(&shown, &expansion)));
        }
        Command::Welfare { sort, desc } => {
            let tree = load_tree(client, year_id).await?;
            let mut rows = welfare_rows(&tree);
            let direction = if desc { SortDirection::Descending } else { SortDirection::Ascending };
            sort_nodes(&mut rows, sort, direction);
            print!("{}", report::welfare_report(&rows));
        }
        Command::Impact { expense_id: Some(id), .. } => {
            let expense = client.expense(id).await?;
            let mut widget = ImpactWidgetState::default();
            widget.expanded_view = true;
            let impact = expense.budget_impact.as_ref().map(|p| p.resolve(expense.amount));
            widget.set_impact(impact, format!("Expense #{} {}", expense.id, expense.title));
            println!(
                "{} ({}, {})",
                widget.title(),
                fmt_money_in(&expense.amount, &expense.currency),
                expense.status
            );
            if widget.impact().is_none() {
                println!("No budget impact data");
            } else {
                print!("{}", impact_text(&widget));
            }
        }
        Command::Impact { department_id, category_id, subcategory_id, amount, .. } => {
            let Some(amount) = amount else {
                bail!("--amount is required with a node id");
            };
            let (kind, id) = match (subcategory_id, category_id, department_id) {
                (Some(id), _, _) => (NodeKind::Subcategory, id),
                (None, Some(id), _) => (NodeKind::Category, id),
                (None, None, Some(id)) => (NodeKind::Department, id),
                _ => bail!("pass --expense-id or one of --department-id/--category-id/--subcategory-id"),
            };
            let tree = load_tree(client, year_id).await?;
            let Some(path) = find_path(&tree, kind, id) else {
                bail!("{} {} not found", kind.label(), id);
            };
            let mut widget = ImpactWidgetState::default();
            widget.expanded_view = true;
            widget.set_impact(
                Some(project_path(path.department, path.category, path.subcategory, amount)),
                format!("What-if {} on {}", fmt_money(&amount), path.leaf().name()),
            );
            println!("{}", widget.title());
            print!("{}", impact_text(&widget));
        }
    }
    Ok(())
}
