// src/cli/ui.rs
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Tabs, Wrap},
    Frame,
};

use crate::budget::usage::bar_ratio;
use crate::budget::{category_allocation, org_totals, usage, BudgetNode, NodeKind, Rollup, Severity, SortKey, TreeRow};
use crate::cli::impact_widget;
use crate::cli::state::{self, App, WelfareSubs};
use crate::cli::util::{fmt_money, fmt_money_in, fmt_percent, iso, text_bar};

pub fn draw(f: &mut Frame, app: &mut App) {
    let size = f.size();

    // top tabs | main content | bottom status bar
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(1)])
        .split(size);

    let titles = ["Organization", "Welfare", "Impact", "Help"]
        .into_iter()
        .map(|t| Line::from(Span::raw(t)))
        .collect::<Vec<_>>();
    let year = app.year_id.map(|y| format!(" · year {y}")).unwrap_or_default();
    let tabs = Tabs::new(titles)
        .select(app.tab.index())
        .block(Block::default().borders(Borders::ALL).title(format!("Expense Budgets{year}")))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));
    f.render_widget(tabs, root[0]);

    match app.tab {
        state::Tab::Organization => draw_tree(f, root[1], app),
        state::Tab::Welfare => draw_welfare(f, root[1], app),
        state::Tab::Impact => draw_impact(f, root[1], app),
        state::Tab::Help => draw_help(f, root[1]),
    }

    f.render_widget(Paragraph::new(app.status.clone()), root[2]);

    if app.tree.ui.pending_delete.is_some() {
        let area = center_rect(root[1], 60, 8);
        f.render_widget(Clear, area);
        draw_delete_modal(f, area, app);
    } else if app.tree.ui.create.is_some() {
        let area = center_rect(root[1], 56, 10);
        f.render_widget(Clear, area);
        draw_create_modal(f, area, app);
    } else if app.tree.ui.what_if.is_some() {
        let area = center_rect(root[1], 50, 7);
        f.render_widget(Clear, area);
        draw_what_if_modal(f, area, app);
    } else if app.impact.pending_decision.is_some() {
        let area = center_rect(root[1], 50, 6);
        f.render_widget(Clear, area);
        draw_decision_modal(f, area, app);
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Danger => Color::Red,
    }
}

fn chip(over_budget: bool, severity: Severity) -> Span<'static> {
    let (label, color) = if over_budget {
        ("OVER", Color::Red)
    } else {
        match severity {
            Severity::Success => ("OK", Color::Green),
            Severity::Warning => ("WARN", Color::Yellow),
            Severity::Danger => ("HIGH", Color::Red),
        }
    };
    Span::styled(format!("[{label}]"), Style::default().fg(color))
}

// Organization Page

fn draw_tree(f: &mut Frame, area: Rect, app: &mut App) {
    let rows_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(6), Constraint::Length(3)])
        .split(area);

    draw_summary(f, rows_area[0], app);

    let rows = app.tree.rows();
    let editing = app.tree.ui.editing_budget.as_ref();

    let header = Row::new(vec!["Name", "Budget", "Spent", "Remaining", "Usage", ""])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    let body: Vec<Row> = rows
        .iter()
        .map(|r| {
            let usage = r.usage();
            let severity = usage.severity();
            let budget_cell = match editing {
                Some(edit) if edit.kind == r.kind && edit.id == r.id => Cell::from(Span::styled(
                    edit.value.rendered(),
                    Style::default().fg(Color::Black).bg(Color::Yellow),
                )),
                _ => Cell::from(fmt_money(&r.budget)),
            };
            Row::new(vec![
                Cell::from(tree_label(r)),
                budget_cell,
                Cell::from(fmt_money(&r.spent)),
                Cell::from(Span::styled(
                    fmt_money(&usage.remaining),
                    if usage.over_budget { Style::default().fg(Color::Red) } else { Style::default() },
                )),
                Cell::from(Line::from(vec![
                    Span::styled(text_bar(&usage.usage_percent, 12), Style::default().fg(severity_color(severity))),
                    Span::raw(format!(" {:>7}", fmt_percent(&usage.usage_percent))),
                ])),
                Cell::from(chip(usage.over_budget, severity)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Percentage(34),
        Constraint::Length(14),
        Constraint::Length(14),
        Constraint::Length(14),
        Constraint::Length(21),
        Constraint::Length(6),
    ];

    let mut title = String::from("Organization");
    if app.tree.view_only {
        title.push_str(" [view only]");
    }
    if app.tree.fetch.is_pending() {
        title.push_str(" (loading…)");
    }

    let table = Table::new(body, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut sel = app.tree.sel.clone();
    f.render_stateful_widget(table, rows_area[1], &mut sel);
    app.tree.sel = sel;

    let search_text = if app.tree.ui.searching {
        app.tree.ui.search.rendered()
    } else if app.tree.ui.search.trimmed().is_empty() {
        "/ search   Enter expand   e edit budget   n new child   N new department   x delete   p what-if   r refresh".into()
    } else {
        format!("{}   (Esc to clear)", app.tree.ui.search.value)
    };
    let search_block = Block::default()
        .borders(Borders::ALL)
        .title(if app.tree.ui.searching { "Search (Enter to keep, Esc to clear)" } else { "Search" });
    f.render_widget(Paragraph::new(search_text).block(search_block), rows_area[2]);

    if let Some(err) = &app.tree.error {
        if !app.tree.loaded {
            let area = center_rect(rows_area[1], 60, 5);
            f.render_widget(Clear, area);
            let p = Paragraph::new(format!("{err}\n\nPress r to retry"))
                .block(Block::default().borders(Borders::ALL).title("Could not load structure"))
                .wrap(Wrap { trim: true });
            f.render_widget(p, area);
        }
    }
}

fn tree_label(r: &TreeRow) -> String {
    let marker = if r.has_children {
        if r.expanded { "▾ " } else { "▸ " }
    } else {
        "  "
    };
    let welfare = if r.is_welfare && r.kind == NodeKind::Category { " ♥" } else { "" };
    format!("{}{}{}{}", "  ".repeat(r.depth), marker, r.name, welfare)
}

fn draw_summary(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let totals = org_totals(&app.tree.departments);
    let usage = totals.usage();
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Organization: {} of {} spent, {} left",
            fmt_money(&totals.spent),
            fmt_money(&totals.budget),
            fmt_money(&usage.remaining)
        )))
        .gauge_style(Style::default().fg(severity_color(usage.severity())))
        .ratio(bar_ratio(usage.usage_percent))
        .label(fmt_percent(&usage.usage_percent));
    f.render_widget(gauge, cols[0]);

    let selected = app
        .tree
        .selected_row()
        .and_then(|row| app.tree.departments.iter().find(|d| d.id == row.department_id));
    let detail = match selected {
        Some(dept) => {
            let allocated = category_allocation(dept);
            let rolled = dept.rollup();
            Paragraph::new(format!(
                "{}: allocated {} of {} to categories ({} unallocated)\nRolled-up spend {} of {}",
                dept.name,
                fmt_money(&allocated.budget),
                fmt_money(&dept.budget),
                fmt_money(&(dept.budget - allocated.budget)),
                fmt_money(&rolled.spent),
                fmt_money(&rolled.budget),
            ))
        }
        None => Paragraph::new("No department selected"),
    }
    .block(Block::default().borders(Borders::ALL).title("Department"));
    f.render_widget(detail, cols[1]);
}

// Welfare Page

fn draw_welfare(f: &mut Frame, area: Rect, app: &mut App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let rows = app.welfare.rows(&app.tree.departments);
    let key = app.welfare.sort_key;
    let arrow = app.welfare.direction.arrow();
    let heading = |label: &'static str, k: SortKey| {
        if k == key { format!("{label} {arrow}") } else { label.to_string() }
    };
    let header = Row::new(vec![
        "Department".to_string(),
        heading("Category", SortKey::Name),
        heading("Budget", SortKey::Budget),
        heading("Spent", SortKey::Spent),
        heading("Remaining", SortKey::Remaining),
        heading("Usage", SortKey::Utilization),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let body: Vec<Row> = rows
        .iter()
        .map(|r| {
            let usage = r.usage();
            let marker = if app.welfare.expanded.contains(&r.category.id) { "▾" } else { "▸" };
            Row::new(vec![
                Cell::from(r.department_name.clone()),
                Cell::from(format!("{marker} {}", r.category.name)),
                Cell::from(fmt_money(&r.category.budget)),
                Cell::from(fmt_money(&r.category.spent)),
                Cell::from(fmt_money(&usage.remaining)),
                Cell::from(Span::styled(
                    fmt_percent(&usage.usage_percent),
                    Style::default().fg(severity_color(usage.severity())),
                )),
            ])
        })
        .collect();

    let widths = [
        Constraint::Percentage(22),
        Constraint::Percentage(24),
        Constraint::Length(13),
        Constraint::Length(13),
        Constraint::Length(13),
        Constraint::Length(10),
    ];
    let table = Table::new(body, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Welfare budgets (s: sort key, o: order, Enter: subcategories)"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut sel = app.welfare.sel.clone();
    f.render_stateful_widget(table, cols[0], &mut sel);
    app.welfare.sel = sel;

    let selected = app.welfare.sel.selected().and_then(|i| rows.get(i));
    let detail: Vec<Line> = match selected {
        None => vec![Line::from("Select a welfare category")],
        Some(row) if !app.welfare.expanded.contains(&row.category.id) => {
            vec![Line::from("Press Enter to load subcategories")]
        }
        Some(row) => match app.welfare.subcategories.get(&row.category.id) {
            None | Some(WelfareSubs::Loading) => vec![Line::from("Loading…")],
            Some(WelfareSubs::Failed(err)) => vec![
                Line::from(Span::styled(err.clone(), Style::default().fg(Color::Red))),
                Line::from("Collapse and expand again to retry"),
            ],
            Some(WelfareSubs::Loaded(subs)) if subs.is_empty() => vec![Line::from("No subcategories")],
            Some(WelfareSubs::Loaded(subs)) => subs
                .iter()
                .map(|s| {
                    let usage = usage(s.budget, s.spent);
                    Line::from(vec![
                        Span::raw(format!("{:<18} ", s.name)),
                        Span::styled(
                            text_bar(&usage.usage_percent, 10),
                            Style::default().fg(severity_color(usage.severity())),
                        ),
                        Span::raw(format!(" {}", fmt_percent(&usage.usage_percent))),
                    ])
                })
                .collect(),
        },
    };
    let p = Paragraph::new(detail).block(Block::default().borders(Borders::ALL).title("Subcategories"));
    f.render_widget(p, cols[1]);
}

// Impact Page

fn draw_impact(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(6)])
        .split(area);

    let mut lines = Vec::new();
    if app.impact.entering {
        lines.push(format!("Expense id: {}", app.impact.expense_id.rendered()));
    } else if let Some(exp) = &app.impact.expense {
        lines.push(format!(
            "#{} {}  {}  [{}]",
            exp.id,
            exp.title,
            fmt_money_in(&exp.amount, &exp.currency),
            if exp.status.is_empty() { "pending" } else { exp.status.as_str() }
        ));
        let who = exp.submitted_by.clone().unwrap_or_else(|| "-".into());
        let when = exp.expense_date.as_ref().map(iso).unwrap_or_else(|| "-".into());
        lines.push(format!("Submitted by {who} on {when}"));
        if exp.budget_impact.is_none() {
            lines.push("No budget impact reported for this expense".into());
        }
    } else {
        lines.push("i: load expense by id   p on a tree row: what-if preview".into());
    }
    if app.impact.loading {
        lines.push("Loading…".into());
    }
    if let Some(err) = &app.impact.error {
        lines.push(format!("Error: {err}"));
    }
    lines.push("a approve   x reject   r reload   v compact/expanded   1-3 fold tier   c clear".into());

    let p = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("Expense"))
        .wrap(Wrap { trim: true });
    f.render_widget(p, chunks[0]);

    impact_widget::render(f, chunks[1], &app.impact.widget);
}

// Modals

fn draw_delete_modal(f: &mut Frame, area: Rect, app: &App) {
    let Some(pending) = &app.tree.ui.pending_delete else { return };
    let mut lines = vec![
        Line::from(format!("Delete {} '{}'?", pending.kind.label().to_lowercase(), pending.name)),
        Line::from(""),
    ];
    if let Some(warning) = pending.warning() {
        lines.push(Line::from(Span::styled(warning, Style::default().fg(Color::Yellow))));
    }
    lines.push(Line::from("y: delete   n / Esc: cancel"));
    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Confirm delete").border_style(Style::default().fg(Color::Red)))
        .wrap(Wrap { trim: true });
    f.render_widget(p, area);
}

fn draw_create_modal(f: &mut Frame, area: Rect, app: &App) {
    let Some(form) = &app.tree.ui.create else { return };
    let focus = |idx: usize| if form.focus_index == idx { "  <editing>" } else { "" };

    let mut lines = vec![
        if form.parent_name.is_empty() { String::new() } else { format!("Parent   : {}", form.parent_name) },
        format!("Name     : {}{}", form.name.value, focus(0)),
        format!("Budget   : {}{}", form.budget.value, focus(1)),
    ];
    if form.kind == NodeKind::Category {
        lines.push(format!("Welfare  : {}{}", if form.is_welfare { "yes" } else { "no" }, focus(2)));
    }
    lines.push(String::new());
    lines.push("TAB: switch field | Space: toggle welfare | Enter: create | Esc: cancel".into());
    lines.push(form.error.clone().unwrap_or_default());

    let p = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title(format!("New {}", form.kind.label())));
    f.render_widget(p, area);
}

fn draw_what_if_modal(f: &mut Frame, area: Rect, app: &App) {
    let Some(prompt) = &app.tree.ui.what_if else { return };
    let lines = [
        format!("Amount charged to {}:", prompt.name),
        prompt.amount.rendered(),
        String::new(),
        prompt.error.clone().unwrap_or_else(|| "Enter: preview | Esc: cancel".into()),
    ]
    .join("\n");
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("What-if"));
    f.render_widget(p, area);
}

fn draw_decision_modal(f: &mut Frame, area: Rect, app: &App) {
    let Some(decision) = app.impact.pending_decision else { return };
    let id = app.impact.expense.as_ref().map(|e| e.id).unwrap_or_default();
    let mut text = format!("{} expense #{id}?\n", decision.verb());
    if decision == state::Decision::Approve && app.impact.widget.show_warning() {
        text.push_str("This will exceed at least one budget.\n");
    }
    text.push_str("y: confirm   n / Esc: cancel");
    let p = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Confirm"));
    f.render_widget(p, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help_text = [
        "Global Keys:",
        "  q          : Quit",
        "  Tab        : Next view (Organization -> Welfare -> Impact -> Help)",
        "  ?          : This help",
        "",
        "Organization:",
        "  Up/Down    : Navigate rows",
        "  Enter      : Expand / collapse",
        "  E / C      : Expand all / collapse all",
        "  /          : Search (matches any level, keeps parents)",
        "  e          : Edit budget inline (Enter saves, Esc cancels)",
        "  n / N      : New child / new department",
        "  x / Del    : Delete (asks for confirmation)",
        "  p          : What-if: preview the impact of an amount",
        "  r          : Refresh",
        "",
        "Welfare:",
        "  s / o      : Cycle sort key / flip order",
        "  Enter      : Show subcategories (loaded on first open)",
        "",
        "Impact:",
        "  i          : Load an expense by id",
        "  a / x      : Approve / reject (asks for confirmation)",
        "  v          : Compact / expanded view",
        "  1 / 2 / 3  : Fold department / category / subcategory",
    ]
    .join("\n");

    let p = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("Help & Keybindings"));
    f.render_widget(p, area);
}

fn center_rect(rect: Rect, w: u16, h: u16) -> Rect {
    let x = rect.x + rect.width.saturating_sub(w) / 2;
    let y = rect.y + rect.height.saturating_sub(h) / 2;
    Rect { x, y, width: w.min(rect.width), height: h.min(rect.height) }
}
