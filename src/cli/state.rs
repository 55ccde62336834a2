// src/cli/state.rs
use std::collections::{HashMap, HashSet};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::widgets::TableState;
use rust_decimal::Decimal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::{Client, CreateCategoryReq, CreateDepartmentReq, CreateSubcategoryReq, DecisionReq, RequestSlot, UpdateNodeReq};
use crate::budget::{
    build_tree, filter, find_path, project_path, sort_nodes, visible_rows, welfare_rows, Department,
    ExpenseDetail, ExpansionState, NodeKind, OrganizationStructure, SortDirection, SortKey, Subcategory,
    TreeRow, WelfareRow,
};
use crate::cli::impact_widget::ImpactWidgetState;
use crate::cli::input::LineEdit;
use crate::cli::util::{fmt_money, parse_money};
use crate::errors::{ApiError, AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Organization,
    Welfare,
    Impact,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Organization, Tab::Welfare, Tab::Impact, Tab::Help];

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|t| t == self).unwrap_or(0)
    }

    fn next(&self) -> Tab {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(&self) -> Tab {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Results of spawned fetches, tagged with the generation that issued them.
#[derive(Debug)]
pub enum Loaded {
    Structure { generation: u64, result: Result<OrganizationStructure, ApiError> },
    WelfareSubcategories { category_id: i64, generation: u64, result: Result<Vec<Subcategory>, ApiError> },
    Expense { generation: u64, result: Result<ExpenseDetail, ApiError> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetEdit {
    pub kind: NodeKind,
    pub id: i64,
    pub value: LineEdit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelete {
    pub kind: NodeKind,
    pub id: i64,
    pub name: String,
}

impl PendingDelete {
    pub fn warning(&self) -> Option<&'static str> {
        match self.kind {
            NodeKind::Department => Some("All categories and subcategories of this department will be deleted."),
            NodeKind::Category => Some("All subcategories of this category will be deleted as well."),
            NodeKind::Subcategory => None,
        }
    }
}

/// Create form for a new node. `parent_id` is the department for a new
/// category and the category for a new subcategory.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeForm {
    pub kind: NodeKind,
    pub parent_id: Option<i64>,
    pub parent_name: String,
    pub name: LineEdit,
    pub budget: LineEdit,
    pub is_welfare: bool,
    // 0: Name, 1: Budget, 2: Welfare (categories only)
    pub focus_index: usize,
    pub error: Option<String>,
}

impl NodeForm {
    fn new(kind: NodeKind, parent_id: Option<i64>, parent_name: String) -> Self {
        Self {
            kind,
            parent_id,
            parent_name,
            name: LineEdit::default(),
            budget: LineEdit::numeric(),
            is_welfare: false,
            focus_index: 0,
            error: None,
        }
    }

    fn field_count(&self) -> usize {
        if self.kind == NodeKind::Category { 3 } else { 2 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhatIfPrompt {
    pub kind: NodeKind,
    pub id: i64,
    pub name: String,
    pub amount: LineEdit,
    pub error: Option<String>,
}

/// Ephemeral view state owned by one tree view.
#[derive(Debug, Default)]
pub struct TreeUiState {
    pub expansion: ExpansionState,
    pub search: LineEdit,
    pub searching: bool,
    pub editing_budget: Option<BudgetEdit>,
    pub pending_delete: Option<PendingDelete>,
    pub create: Option<NodeForm>,
    pub what_if: Option<WhatIfPrompt>,
}

#[derive(Debug, Default)]
pub struct TreePage {
    pub departments: Vec<Department>,
    pub view_only: bool,
    pub loaded: bool,
    pub error: Option<String>,
    pub ui: TreeUiState,
    pub sel: TableState,
    pub fetch: RequestSlot,
}

impl TreePage {
    /// Departments left after applying the search query.
    pub fn visible(&self) -> Vec<Department> {
        filter(&self.departments, self.ui.search.trimmed())
    }

    pub fn rows(&self) -> Vec<TreeRow> {
        visible_rows(&self.visible(), &self.ui.expansion)
    }

    pub fn selected_row(&self) -> Option<TreeRow> {
        let idx = self.sel.selected()?;
        self.rows().into_iter().nth(idx)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WelfareSubs {
    Loading,
    Loaded(Vec<Subcategory>),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct WelfarePage {
    pub sort_key: SortKey,
    pub direction: SortDirection,
    pub sel: TableState,
    pub expanded: HashSet<i64>,
    pub subcategories: HashMap<i64, WelfareSubs>,
    fetches: HashMap<i64, RequestSlot>,
}

impl WelfarePage {
    pub fn rows(&self, tree: &[Department]) -> Vec<WelfareRow> {
        let mut rows = welfare_rows(tree);
        sort_nodes(&mut rows, self.sort_key, self.direction);
        rows
    }

    /// Aborts every pending lazy fetch and forgets entries that never arrived.
    fn cancel_pending(&mut self) {
        for slot in self.fetches.values_mut() {
            slot.cancel();
        }
        self.fetches.clear();
        self.subcategories.retain(|_, subs| !matches!(subs, WelfareSubs::Loading));
    }

    /// Drops every cached subcategory list along with any fetch in flight.
    fn invalidate(&mut self) {
        for slot in self.fetches.values_mut() {
            slot.cancel();
        }
        self.fetches.clear();
        self.subcategories.clear();
    }

    /// True when the subcategories of `category_id` are neither loaded nor loading.
    fn needs_fetch(&self, category_id: i64) -> bool {
        matches!(self.subcategories.get(&category_id), None | Some(WelfareSubs::Failed(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Approve => "Approve",
            Self::Reject => "Reject",
        }
    }
}

#[derive(Debug, Default)]
pub struct ImpactPage {
    pub expense_id: LineEdit,
    pub entering: bool,
    pub expense: Option<ExpenseDetail>,
    pub loading: bool,
    pub error: Option<String>,
    pub widget: ImpactWidgetState,
    pub pending_decision: Option<Decision>,
    pub fetch: RequestSlot,
}

pub struct App {
    pub api: Client,
    pub year_id: Option<i64>,
    pub expand_all_on_load: bool,
    pub tab: Tab,
    pub status: String,
    pub quit: bool,
    pub tree: TreePage,
    pub welfare: WelfarePage,
    pub impact: ImpactPage,
    tx: UnboundedSender<Loaded>,
    rx: UnboundedReceiver<Loaded>,
}

impl App {
    pub fn new(api: Client, year_id: Option<i64>, expand_all_on_load: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            year_id,
            expand_all_on_load,
            tab: Tab::Organization,
            status: "Tab: switch view | ? for help | q to quit".into(),
            quit: false,
            tree: TreePage::default(),
            welfare: WelfarePage::default(),
            impact: ImpactPage { expense_id: LineEdit::numeric(), ..ImpactPage::default() },
            tx,
            rx,
        }
    }

    // ============= Fetching =============

    /// (Re)loads the organization structure; an older request in flight is
    /// abandoned.
    pub fn request_structure(&mut self) -> u64 {
        let api = self.api.clone();
        let tx = self.tx.clone();
        let year_id = self.year_id;
        self.status = "Loading organization structure…".into();
        self.tree.fetch.issue(move |generation| async move {
            let result = api.organization_structure(year_id).await;
            let _ = tx.send(Loaded::Structure { generation, result });
        })
    }

    pub fn request_welfare_subcategories(&mut self, category_id: i64) -> u64 {
        let api = self.api.clone();
        let tx = self.tx.clone();
        self.welfare.subcategories.insert(category_id, WelfareSubs::Loading);
        self.welfare
            .fetches
            .entry(category_id)
            .or_default()
            .issue(move |generation| async move {
                let result = api.welfare_subcategories(category_id).await;
                let _ = tx.send(Loaded::WelfareSubcategories { category_id, generation, result });
            })
    }

    pub fn request_expense(&mut self, expense_id: i64) -> u64 {
        let api = self.api.clone();
        let tx = self.tx.clone();
        self.impact.loading = true;
        self.impact.error = None;
        self.impact.fetch.issue(move |generation| async move {
            let result = api.expense(expense_id).await;
            let _ = tx.send(Loaded::Expense { generation, result });
        })
    }

    /// Applies every result that arrived since the last tick.
    pub fn drain_loaded(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.apply_loaded(msg);
        }
    }

    pub fn apply_loaded(&mut self, msg: Loaded) {
        match msg {
            Loaded::Structure { generation, result } => {
                if !self.tree.fetch.complete(generation) {
                    return;
                }
                match result {
                    Ok(org) => {
                        let first_load = !self.tree.loaded;
                        self.tree.departments = build_tree(org.structure);
                        self.tree.view_only = org.view_only;
                        self.tree.loaded = true;
                        self.tree.error = None;
                        if first_load && self.expand_all_on_load {
                            self.tree.ui.expansion.expand_all(&self.tree.departments);
                        }
                        self.reset_welfare_subcategories();
                        self.clamp_tree_selection();
                        self.status = format!(
                            "Loaded {} departments{}",
                            self.tree.departments.len(),
                            if self.tree.view_only { " (view only)" } else { "" }
                        );
                    }
                    Err(e) => {
                        log::error!("Loading organization structure failed: {e}");
                        self.tree.error = Some(e.to_string());
                        self.status = format!("Load failed: {e} (r to retry)");
                    }
                }
            }
            Loaded::WelfareSubcategories { category_id, generation, result } => {
                let accepted = self
                    .welfare
                    .fetches
                    .get_mut(&category_id)
                    .map_or(false, |slot| slot.complete(generation));
                if !accepted {
                    return;
                }
                let entry = match result {
                    Ok(subs) => WelfareSubs::Loaded(subs),
                    Err(e) => {
                        log::error!("Loading subcategories of category {category_id} failed: {e}");
                        WelfareSubs::Failed(e.to_string())
                    }
                };
                self.welfare.subcategories.insert(category_id, entry);
            }
            Loaded::Expense { generation, result } => {
                if !self.impact.fetch.complete(generation) {
                    return;
                }
                self.impact.loading = false;
                match result {
                    Ok(expense) => {
                        let impact = expense.budget_impact.as_ref().map(|p| p.resolve(expense.amount));
                        let title = if expense.title.is_empty() {
                            format!("Expense #{}", expense.id)
                        } else {
                            format!("Expense #{} {}", expense.id, expense.title)
                        };
                        self.impact.widget.set_impact(impact, title);
                        self.impact.expense = Some(expense);
                        self.impact.error = None;
                    }
                    Err(e) => {
                        self.impact.expense = None;
                        self.impact.widget.clear();
                        self.impact.error = Some(e.to_string());
                    }
                }
            }
        }
    }

    /// Subcategory figures are only valid for the structure they were fetched
    /// with; a new structure drops them and reloads the open categories.
    fn reset_welfare_subcategories(&mut self) {
        self.welfare.invalidate();
        let welfare_ids: HashSet<i64> = welfare_rows(&self.tree.departments)
            .iter()
            .map(|row| row.category.id)
            .collect();
        self.welfare.expanded.retain(|id| welfare_ids.contains(id));
        if self.tab == Tab::Welfare {
            self.load_expanded_welfare();
        }
    }

    fn load_expanded_welfare(&mut self) {
        let missing: Vec<i64> = self
            .welfare
            .expanded
            .iter()
            .copied()
            .filter(|id| self.welfare.needs_fetch(*id))
            .collect();
        for id in missing {
            self.request_welfare_subcategories(id);
        }
    }

    // ============= Navigation =============

    fn switch_tab(&mut self, tab: Tab) {
        if tab == self.tab {
            return;
        }
        match self.tab {
            Tab::Welfare => self.welfare.cancel_pending(),
            Tab::Impact if self.impact.fetch.is_pending() => {
                self.impact.fetch.cancel();
                self.impact.loading = false;
            }
            _ => {}
        }
        self.tab = tab;
        if tab == Tab::Welfare {
            self.load_expanded_welfare();
        }
    }

    fn clamp_tree_selection(&mut self) {
        let len = self.tree.rows().len();
        clamp_selection(&mut self.tree.sel, len);
    }

    fn move_tree(&mut self, delta: isize) {
        let len = self.tree.rows().len();
        move_selection(&mut self.tree.sel, len, delta);
    }

    fn toggle_selected(&mut self) {
        let Some(row) = self.tree.selected_row() else { return };
        match row.kind {
            NodeKind::Department => {
                self.tree.ui.expansion.toggle_department(row.id);
            }
            NodeKind::Category => {
                self.tree.ui.expansion.toggle_category(row.id);
            }
            NodeKind::Subcategory => {}
        }
        self.clamp_tree_selection();
    }

    fn ensure_editable(&mut self) -> bool {
        if self.tree.view_only {
            self.status = "View only: changes are disabled for this year".into();
            return false;
        }
        true
    }

    // ============= Keys =============

    pub async fn handle_key(&mut self, k: KeyEvent) -> anyhow::Result<()> {
        if k.kind != KeyEventKind::Press {
            return Ok(());
        }

        if self.tree.ui.pending_delete.is_some() {
            return self.handle_delete_confirm(k).await;
        }
        if self.tree.ui.create.is_some() {
            return self.handle_form_input(k).await;
        }
        if self.tree.ui.editing_budget.is_some() {
            return self.handle_budget_edit(k).await;
        }
        if self.tree.ui.what_if.is_some() {
            self.handle_what_if_input(k);
            return Ok(());
        }
        if self.tree.ui.searching {
            self.handle_search_input(k);
            return Ok(());
        }
        if self.impact.entering {
            self.handle_expense_id_input(k);
            return Ok(());
        }
        if self.impact.pending_decision.is_some() {
            return self.handle_decision_confirm(k).await;
        }

        match k.code {
            KeyCode::Char('q') => {
                self.quit = true;
                return Ok(());
            }
            KeyCode::Tab => {
                self.switch_tab(self.tab.next());
                return Ok(());
            }
            KeyCode::BackTab => {
                self.switch_tab(self.tab.prev());
                return Ok(());
            }
            KeyCode::Char('?') => {
                self.switch_tab(Tab::Help);
                return Ok(());
            }
            _ => {}
        }

        match self.tab {
            Tab::Organization => self.handle_tree_key(k),
            Tab::Welfare => self.handle_welfare_key(k),
            Tab::Impact => self.handle_impact_key(k),
            Tab::Help => {
                if matches!(k.code, KeyCode::Esc | KeyCode::Char('b')) {
                    self.switch_tab(Tab::Organization);
                }
            }
        }
        Ok(())
    }

    fn handle_tree_key(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Up => self.move_tree(-1),
            KeyCode::Down => self.move_tree(1),
            KeyCode::Home => self.tree.sel.select(Some(0)),
            KeyCode::End => {
                let len = self.tree.rows().len();
                self.tree.sel.select(len.checked_sub(1));
            }
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Right | KeyCode::Left => self.toggle_selected(),
            KeyCode::Char('E') => {
                self.tree.ui.expansion.expand_all(&self.tree.departments);
            }
            KeyCode::Char('C') => {
                self.tree.ui.expansion.collapse_all();
                self.clamp_tree_selection();
            }
            KeyCode::Char('/') => self.tree.ui.searching = true,
            KeyCode::Esc => {
                self.tree.ui.search.clear();
                self.clamp_tree_selection();
            }
            KeyCode::Char('r') => {
                self.request_structure();
            }
            KeyCode::Char('e') => self.start_budget_edit(),
            KeyCode::Char('n') => self.start_create_child(),
            KeyCode::Char('N') => {
                if self.ensure_editable() {
                    self.tree.ui.create = Some(NodeForm::new(NodeKind::Department, None, String::new()));
                }
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                if !self.ensure_editable() {
                    return;
                }
                if let Some(row) = self.tree.selected_row() {
                    self.tree.ui.pending_delete = Some(PendingDelete { kind: row.kind, id: row.id, name: row.name });
                }
            }
            KeyCode::Char('p') => {
                if let Some(row) = self.tree.selected_row() {
                    self.tree.ui.what_if = Some(WhatIfPrompt {
                        kind: row.kind,
                        id: row.id,
                        name: row.name,
                        amount: LineEdit::numeric(),
                        error: None,
                    });
                }
            }
            _ => {}
        }
    }

    fn handle_search_input(&mut self, k: KeyEvent) {
        let search = &mut self.tree.ui.search;
        match k.code {
            KeyCode::Char(c) => search.push(c),
            KeyCode::Backspace => search.backspace(),
            KeyCode::Delete => search.delete(),
            KeyCode::Left => search.left(),
            KeyCode::Right => search.right(),
            KeyCode::Esc => {
                search.clear();
                self.tree.ui.searching = false;
            }
            KeyCode::Enter => self.tree.ui.searching = false,
            _ => {}
        }
        self.clamp_tree_selection();
    }

    fn start_budget_edit(&mut self) {
        if !self.ensure_editable() {
            return;
        }
        if let Some(row) = self.tree.selected_row() {
            self.tree.ui.editing_budget = Some(BudgetEdit {
                kind: row.kind,
                id: row.id,
                value: LineEdit::with_value(row.budget.normalize().to_string(), true),
            });
        }
    }

    /// `Enter` commits through the API and re-fetches; `Esc` never touches
    /// the network.
    async fn handle_budget_edit(&mut self, k: KeyEvent) -> anyhow::Result<()> {
        let Some(edit) = self.tree.ui.editing_budget.as_mut() else { return Ok(()) };
        match k.code {
            KeyCode::Esc => {
                self.tree.ui.editing_budget = None;
                self.status = "Edit cancelled".into();
            }
            KeyCode::Enter => {
                let (kind, id) = (edit.kind, edit.id);
                let budget = match validate_budget(edit.value.trimmed()) {
                    Ok(b) => b,
                    Err(e) => {
                        self.status = e.to_string();
                        return Ok(());
                    }
                };
                let req = UpdateNodeReq { name: None, budget: Some(budget) };
                match self.api.update_node(kind, id, &req).await {
                    Ok(()) => {
                        log::info!("Updated {} {} budget to {}", kind.label(), id, budget);
                        self.tree.ui.editing_budget = None;
                        self.request_structure();
                        self.status = format!("{} budget set to {}", kind.label(), fmt_money(&budget));
                    }
                    Err(e) => self.status = format!("Update failed: {e}"),
                }
            }
            KeyCode::Char(c) => edit.value.push(c),
            KeyCode::Backspace => edit.value.backspace(),
            KeyCode::Delete => edit.value.delete(),
            KeyCode::Left => edit.value.left(),
            KeyCode::Right => edit.value.right(),
            _ => {}
        }
        Ok(())
    }

    fn start_create_child(&mut self) {
        if !self.ensure_editable() {
            return;
        }
        let Some(row) = self.tree.selected_row() else {
            self.tree.ui.create = Some(NodeForm::new(NodeKind::Department, None, String::new()));
            return;
        };
        let form = match row.kind {
            NodeKind::Department => NodeForm::new(NodeKind::Category, Some(row.id), row.name),
            NodeKind::Category => NodeForm::new(NodeKind::Subcategory, Some(row.id), row.name),
            NodeKind::Subcategory => {
                // a subcategory has no children; add a sibling under its category
                let parent = row.category_id;
                let parent_name = parent
                    .and_then(|id| find_path(&self.tree.departments, NodeKind::Category, id))
                    .and_then(|p| p.category.map(|c| c.name.clone()))
                    .unwrap_or_default();
                NodeForm::new(NodeKind::Subcategory, parent, parent_name)
            }
        };
        self.tree.ui.create = Some(form);
    }

    async fn handle_form_input(&mut self, k: KeyEvent) -> anyhow::Result<()> {
        let Some(form) = self.tree.ui.create.as_mut() else { return Ok(()) };
        match k.code {
            KeyCode::Esc => self.tree.ui.create = None,
            KeyCode::Enter => self.submit_form().await,
            KeyCode::Tab | KeyCode::Down => form.focus_index = (form.focus_index + 1) % form.field_count(),
            KeyCode::BackTab | KeyCode::Up => {
                form.focus_index = (form.focus_index + form.field_count() - 1) % form.field_count();
            }
            KeyCode::Char(' ') if form.focus_index == 2 => form.is_welfare = !form.is_welfare,
            KeyCode::Char(c) => match form.focus_index {
                0 => form.name.push(c),
                1 => form.budget.push(c),
                _ => {}
            },
            KeyCode::Backspace => match form.focus_index {
                0 => form.name.backspace(),
                1 => form.budget.backspace(),
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    async fn submit_form(&mut self) {
        let Some(form) = self.tree.ui.create.as_mut() else { return };

        let name = form.name.trimmed().to_string();
        if name.is_empty() {
            form.error = Some(AppError::validation("name", "is required").to_string());
            return;
        }
        let budget = if form.budget.trimmed().is_empty() {
            Decimal::ZERO
        } else {
            match validate_budget(form.budget.trimmed()) {
                Ok(b) => b,
                Err(e) => {
                    form.error = Some(e.to_string());
                    return;
                }
            }
        };

        let result = match (form.kind, form.parent_id) {
            (NodeKind::Department, _) => {
                let req = CreateDepartmentReq { name: name.clone(), budget, currency: None, year_id: self.year_id };
                self.api.create_department(&req).await
            }
            (NodeKind::Category, Some(department_id)) => {
                let req = CreateCategoryReq { department_id, name: name.clone(), budget, is_welfare: form.is_welfare };
                self.api.create_category(&req).await
            }
            (NodeKind::Subcategory, Some(category_id)) => {
                let req = CreateSubcategoryReq { category_id, name: name.clone(), budget };
                self.api.create_subcategory(&req).await
            }
            (_, None) => {
                form.error = Some("No parent selected".into());
                return;
            }
        };

        match result {
            Ok(()) => {
                log::info!("Created {} '{}'", form.kind.label(), name);
                self.status = format!("{} '{}' created", form.kind.label(), name);
                self.tree.ui.create = None;
                self.request_structure();
            }
            Err(e) => form.error = Some(format!("Error: {e}")),
        }
    }

    async fn handle_delete_confirm(&mut self, k: KeyEvent) -> anyhow::Result<()> {
        match k.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                let Some(pending) = self.tree.ui.pending_delete.take() else { return Ok(()) };
                match self.api.delete_node(pending.kind, pending.id).await {
                    Ok(()) => {
                        log::info!("Deleted {} {}", pending.kind.label(), pending.id);
                        self.status = format!("Deleted {} '{}'", pending.kind.label().to_lowercase(), pending.name);
                        self.request_structure();
                    }
                    Err(e) => self.status = format!("Delete failed: {e}"),
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.tree.ui.pending_delete = None;
                self.status = "Delete cancelled".into();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_what_if_input(&mut self, k: KeyEvent) {
        let Some(prompt) = self.tree.ui.what_if.as_mut() else { return };
        match k.code {
            KeyCode::Esc => self.tree.ui.what_if = None,
            KeyCode::Char(c) => prompt.amount.push(c),
            KeyCode::Backspace => prompt.amount.backspace(),
            KeyCode::Enter => {
                let amount = match parse_money(prompt.amount.trimmed()) {
                    Some(a) if a >= Decimal::ZERO => a,
                    _ => {
                        prompt.error = Some(AppError::validation("amount", "must be a non-negative number").to_string());
                        return;
                    }
                };
                let (kind, id, name) = (prompt.kind, prompt.id, prompt.name.clone());
                self.tree.ui.what_if = None;
                self.preview_impact(kind, id, &name, amount);
            }
            _ => {}
        }
    }

    /// Projects `amount` onto the path of the given node and shows it in the
    /// impact widget.
    pub fn preview_impact(&mut self, kind: NodeKind, id: i64, name: &str, amount: Decimal) {
        let Some(path) = find_path(&self.tree.departments, kind, id) else {
            self.status = format!("{} {} is no longer in the structure", kind.label(), id);
            return;
        };
        let impact = project_path(path.department, path.category, path.subcategory, amount);
        self.impact.fetch.cancel();
        self.impact.loading = false;
        self.impact.expense = None;
        self.impact.error = None;
        self.impact
            .widget
            .set_impact(Some(impact), format!("What-if {} on {}", fmt_money(&amount), name));
        self.switch_tab(Tab::Impact);
    }

    fn handle_welfare_key(&mut self, k: KeyEvent) {
        let len = self.welfare.rows(&self.tree.departments).len();
        match k.code {
            KeyCode::Up => move_selection(&mut self.welfare.sel, len, -1),
            KeyCode::Down => move_selection(&mut self.welfare.sel, len, 1),
            KeyCode::Char('s') => {
                self.welfare.sort_key = self.welfare.sort_key.next();
                self.status = format!("Sorted by {}", self.welfare.sort_key.as_str());
            }
            KeyCode::Char('o') => self.welfare.direction = self.welfare.direction.toggled(),
            KeyCode::Char('r') => {
                self.welfare.invalidate();
                self.request_structure();
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                let selected = self
                    .welfare
                    .sel
                    .selected()
                    .and_then(|i| self.welfare.rows(&self.tree.departments).into_iter().nth(i));
                if let Some(row) = selected {
                    let id = row.category.id;
                    if !self.welfare.expanded.remove(&id) {
                        self.welfare.expanded.insert(id);
                        if self.welfare.needs_fetch(id) {
                            self.request_welfare_subcategories(id);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_impact_key(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Char('i') => {
                self.impact.entering = true;
                self.impact.expense_id.clear();
            }
            KeyCode::Char('v') => self.impact.widget.expanded_view = !self.impact.widget.expanded_view,
            KeyCode::Char('1') => self.impact.widget.toggle_tier(NodeKind::Department),
            KeyCode::Char('2') => self.impact.widget.toggle_tier(NodeKind::Category),
            KeyCode::Char('3') => self.impact.widget.toggle_tier(NodeKind::Subcategory),
            KeyCode::Char('a') | KeyCode::Char('x') => {
                let decision = if k.code == KeyCode::Char('a') { Decision::Approve } else { Decision::Reject };
                match &self.impact.expense {
                    Some(e) if e.is_pending() => self.impact.pending_decision = Some(decision),
                    Some(e) => self.status = format!("Expense #{} is already {}", e.id, e.status),
                    None => self.status = "Load an expense first (i)".into(),
                }
            }
            KeyCode::Char('r') => {
                if let Some(id) = self.impact.expense.as_ref().map(|e| e.id) {
                    self.request_expense(id);
                }
            }
            KeyCode::Char('c') => {
                self.impact.fetch.cancel();
                self.impact.loading = false;
                self.impact.expense = None;
                self.impact.error = None;
                self.impact.widget.clear();
            }
            _ => {}
        }
    }

    fn handle_expense_id_input(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Esc => self.impact.entering = false,
            KeyCode::Char(c) if c.is_ascii_digit() => self.impact.expense_id.push(c),
            KeyCode::Backspace => self.impact.expense_id.backspace(),
            KeyCode::Enter => match self.impact.expense_id.trimmed().parse::<i64>() {
                Ok(id) => {
                    self.impact.entering = false;
                    self.request_expense(id);
                }
                Err(_) => self.impact.error = Some("Expense id must be a number".into()),
            },
            _ => {}
        }
    }

    async fn handle_decision_confirm(&mut self, k: KeyEvent) -> anyhow::Result<()> {
        match k.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                let Some(decision) = self.impact.pending_decision.take() else { return Ok(()) };
                let Some(id) = self.impact.expense.as_ref().map(|e| e.id) else { return Ok(()) };
                let req = DecisionReq::default();
                let result = match decision {
                    Decision::Approve => self.api.approve_expense(id, &req).await,
                    Decision::Reject => self.api.reject_expense(id, &req).await,
                };
                match result {
                    Ok(()) => {
                        log::info!("{} expense {}", decision.verb(), id);
                        self.status = format!("{}d expense #{}", decision.verb(), id);
                        self.request_expense(id);
                        self.request_structure();
                    }
                    Err(e) => self.status = format!("{} failed: {e}", decision.verb()),
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.impact.pending_decision = None,
            _ => {}
        }
        Ok(())
    }
}

fn validate_budget(raw: &str) -> Result<Decimal, AppError> {
    match parse_money(raw) {
        Some(b) if b < Decimal::ZERO => Err(AppError::validation("budget", "cannot be negative")),
        Some(b) => Ok(b),
        None => Err(AppError::validation("budget", "must be a number")),
    }
}

fn clamp_selection(state: &mut TableState, len: usize) {
    match (len, state.selected()) {
        (0, _) => state.select(None),
        (n, Some(i)) if i >= n => state.select(Some(n - 1)),
        (_, None) => state.select(Some(0)),
        _ => {}
    }
}

fn move_selection(state: &mut TableState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let cur = state.selected().unwrap_or(0) as isize;
    let next = (cur + delta).rem_euclid(len as isize) as usize;
    state.select(Some(next));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{Category, Subcategory};
    use crate::config::ApiConfig;
    use crossterm::event::KeyModifiers;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        // port 9 (discard) is never served; spawned fetches just fail quietly
        let api = Client::new(&ApiConfig { base_url: "http://127.0.0.1:9/api".into(), token: None }).unwrap();
        App::new(api, Some(2024), false)
    }

    fn org() -> OrganizationStructure {
        OrganizationStructure {
            view_only: false,
            structure: vec![Department {
                id: 1,
                name: "Engineering".into(),
                budget: d(10000),
                spent: d(9000),
                currency: "CAD".into(),
                categories: vec![Category {
                    id: 10,
                    name: "Hardware".into(),
                    budget: d(4000),
                    spent: d(3800),
                    currency: String::new(),
                    is_welfare: true,
                    subcategories: vec![Subcategory {
                        id: 100,
                        name: "Laptops".into(),
                        budget: d(3000),
                        spent: d(2900),
                        currency: String::new(),
                    }],
                }],
            }],
        }
    }

    #[tokio::test]
    async fn stale_structure_is_discarded() {
        let mut app = app();
        let old = app.request_structure();
        let new = app.request_structure();

        app.apply_loaded(Loaded::Structure { generation: old, result: Ok(org()) });
        assert!(!app.tree.loaded);
        assert!(app.tree.departments.is_empty());

        app.apply_loaded(Loaded::Structure { generation: new, result: Ok(org()) });
        assert!(app.tree.loaded);
        assert_eq!(app.tree.departments.len(), 1);
        assert_eq!(app.tree.sel.selected(), Some(0));
    }

    #[tokio::test]
    async fn escape_cancels_budget_edit_without_request() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });

        app.handle_key(key(KeyCode::Char('e'))).await.unwrap();
        let edit = app.tree.ui.editing_budget.clone().unwrap();
        assert_eq!(edit.value.value, "10000");
        app.handle_key(key(KeyCode::Char('5'))).await.unwrap();
        app.handle_key(key(KeyCode::Esc)).await.unwrap();

        assert!(app.tree.ui.editing_budget.is_none());
        assert!(!app.tree.fetch.is_pending());
        assert_eq!(app.tree.departments[0].budget, d(10000));
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        app.handle_key(key(KeyCode::Down)).await.unwrap();

        app.handle_key(key(KeyCode::Char('x'))).await.unwrap();
        let pending = app.tree.ui.pending_delete.clone().unwrap();
        assert_eq!(pending.kind, NodeKind::Category);
        assert!(pending.warning().is_some());

        app.handle_key(key(KeyCode::Char('n'))).await.unwrap();
        assert!(app.tree.ui.pending_delete.is_none());
        assert_eq!(app.tree.departments[0].categories.len(), 1);
    }

    #[tokio::test]
    async fn view_only_blocks_mutations() {
        let mut app = app();
        let generation = app.request_structure();
        let mut structure = org();
        structure.view_only = true;
        app.apply_loaded(Loaded::Structure { generation, result: Ok(structure) });

        app.handle_key(key(KeyCode::Char('e'))).await.unwrap();
        app.handle_key(key(KeyCode::Char('x'))).await.unwrap();
        app.handle_key(key(KeyCode::Char('N'))).await.unwrap();
        assert!(app.tree.ui.editing_budget.is_none());
        assert!(app.tree.ui.pending_delete.is_none());
        assert!(app.tree.ui.create.is_none());
    }

    #[tokio::test]
    async fn empty_name_is_rejected_before_any_request() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });

        app.handle_key(key(KeyCode::Char('n'))).await.unwrap();
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        let form = app.tree.ui.create.clone().unwrap();
        assert_eq!(form.kind, NodeKind::Category);
        assert_eq!(form.error.as_deref(), Some("invalid name: is required"));
    }

    #[tokio::test]
    async fn what_if_projects_the_selected_path() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });

        app.preview_impact(NodeKind::Category, 10, "Hardware", d(300));
        assert_eq!(app.tab, Tab::Impact);
        let impact = app.impact.widget.impact().unwrap();
        assert!(impact.subcategory.is_none());
        assert!(!impact.department.as_ref().unwrap().will_exceed);
        assert!(impact.category.as_ref().unwrap().will_exceed);
        assert!(app.impact.widget.show_warning());
    }

    #[tokio::test]
    async fn search_narrows_rows_and_keeps_expansion() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.tree.rows().len(), 2);

        app.handle_key(key(KeyCode::Char('/'))).await.unwrap();
        for c in "zzz".chars() {
            app.handle_key(key(KeyCode::Char(c))).await.unwrap();
        }
        assert!(app.tree.rows().is_empty());
        assert_eq!(app.tree.sel.selected(), None);

        app.handle_key(key(KeyCode::Esc)).await.unwrap();
        assert_eq!(app.tree.rows().len(), 2);
    }

    #[tokio::test]
    async fn welfare_expansion_fetches_lazily_once() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });
        app.tab = Tab::Welfare;
        app.welfare.sel.select(Some(0));

        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.welfare.subcategories.get(&10), Some(&WelfareSubs::Loading));
        let current = app.welfare.fetches[&10].is_pending();
        assert!(current);

        // a result from a retired generation is ignored
        app.apply_loaded(Loaded::WelfareSubcategories { category_id: 10, generation: 0, result: Ok(vec![]) });
        assert_eq!(app.welfare.subcategories.get(&10), Some(&WelfareSubs::Loading));

        // leaving the tab abandons the fetch
        app.handle_key(key(KeyCode::Tab)).await.unwrap();
        assert!(app.welfare.subcategories.get(&10).is_none());
    }

    #[tokio::test]
    async fn failed_welfare_fetch_is_retried_on_reexpand() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });
        app.tab = Tab::Welfare;
        app.welfare.sel.select(Some(0));

        app.welfare.expanded.insert(10);
        let generation = app.request_welfare_subcategories(10);
        app.apply_loaded(Loaded::WelfareSubcategories {
            category_id: 10,
            generation,
            result: Err(ApiError::Decode("boom".into())),
        });
        assert!(matches!(app.welfare.subcategories.get(&10), Some(WelfareSubs::Failed(_))));

        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        assert!(!app.welfare.expanded.contains(&10));
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.welfare.subcategories.get(&10), Some(&WelfareSubs::Loading));
        assert!(app.welfare.fetches[&10].is_pending());
    }

    #[tokio::test]
    async fn new_structure_reloads_open_welfare_categories() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });
        app.tab = Tab::Welfare;

        app.welfare.expanded.insert(10);
        let generation = app.request_welfare_subcategories(10);
        app.apply_loaded(Loaded::WelfareSubcategories { category_id: 10, generation, result: Ok(vec![]) });
        assert_eq!(app.welfare.subcategories.get(&10), Some(&WelfareSubs::Loaded(vec![])));

        app.handle_key(key(KeyCode::Char('r'))).await.unwrap();
        assert!(app.welfare.subcategories.is_empty());

        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });
        assert_eq!(app.welfare.subcategories.get(&10), Some(&WelfareSubs::Loading));
        assert!(app.welfare.fetches[&10].is_pending());
    }

    #[tokio::test]
    async fn negative_budget_edit_is_rejected_locally() {
        let mut app = app();
        let generation = app.request_structure();
        app.apply_loaded(Loaded::Structure { generation, result: Ok(org()) });

        app.handle_key(key(KeyCode::Char('e'))).await.unwrap();
        for _ in 0..5 {
            app.handle_key(key(KeyCode::Backspace)).await.unwrap();
        }
        for c in "-5".chars() {
            app.handle_key(key(KeyCode::Char(c))).await.unwrap();
        }
        app.handle_key(key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.status, "invalid budget: cannot be negative");
        assert!(app.tree.ui.editing_budget.is_some());
        assert!(!app.tree.fetch.is_pending());
    }
}
