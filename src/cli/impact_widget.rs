//! Budget impact widget shown in the approval flow and for what-if previews.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::budget::{BudgetImpact, ImpactTier, NodeKind, Severity};
use crate::cli::util::{fmt_money, fmt_percent, text_bar};

const BAR_WIDTH: usize = 20;

/// Local, non-persisted view state of the widget.
#[derive(Debug, Default, Clone)]
pub struct ImpactWidgetState {
    impact: Option<BudgetImpact>,
    title: String,
    generation: u64, // bumped on every new payload
    collapsed: [bool; 3],
    pub expanded_view: bool,
}

impl ImpactWidgetState {
    /// Replaces the payload. Tier collapse state is reset.
    pub fn set_impact(&mut self, impact: Option<BudgetImpact>, title: impl Into<String>) {
        self.impact = impact;
        self.title = title.into();
        self.generation += 1;
        self.collapsed = [false; 3];
    }

    pub fn clear(&mut self) {
        self.set_impact(None, String::new());
    }

    pub fn impact(&self) -> Option<&BudgetImpact> {
        self.impact.as_ref().filter(|i| !i.is_empty())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn toggle_tier(&mut self, kind: NodeKind) {
        let slot = &mut self.collapsed[kind.index()];
        *slot = !*slot;
    }

    pub fn is_collapsed(&self, kind: NodeKind) -> bool {
        self.collapsed[kind.index()]
    }

    pub fn show_warning(&self) -> bool {
        self.impact().map_or(false, BudgetImpact::any_will_exceed)
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Danger => Color::Red,
    }
}

fn tier_label(kind: NodeKind, tier: &ImpactTier) -> String {
    match &tier.name {
        Some(name) => format!("{}: {}", kind.label(), name),
        None => kind.label().to_string(),
    }
}

/// Lines of the widget. Empty when there is nothing to show.
pub fn impact_lines(state: &ImpactWidgetState) -> Vec<Line<'static>> {
    let Some(impact) = state.impact() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    if impact.any_will_exceed() {
        lines.push(Line::from(Span::styled(
            "⚠ Approving this expense will exceed at least one budget",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
    }

    for (kind, tier) in impact.tiers() {
        let key = kind.index() + 1; // fold key bound to this tier
        let severity = Severity::for_percent(tier.usage_percent_after);
        let color = severity_color(severity);
        let collapsed = state.is_collapsed(kind);
        let marker = if collapsed { "▸" } else { "▾" };
        let chip = if tier.will_exceed { "EXCEEDS" } else { severity.as_str() };

        if !state.expanded_view {
            lines.push(Line::from(vec![
                Span::raw(format!("{key} {} ", tier_label(kind, tier))),
                Span::raw(format!(
                    "{} → {}  ",
                    fmt_percent(&tier.usage_percent_before),
                    fmt_percent(&tier.usage_percent_after)
                )),
                Span::styled(format!("[{chip}]"), Style::default().fg(color)),
            ]));
            continue;
        }

        lines.push(Line::from(vec![
            Span::styled(
                format!("{marker} {key} {}", tier_label(kind, tier)),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(format!("[{chip}]"), Style::default().fg(color)),
        ]));
        if collapsed {
            continue;
        }
        lines.push(Line::from(format!(
            "    Budget {}   Used {}",
            fmt_money(&tier.budget),
            fmt_money(&tier.used)
        )));
        lines.push(Line::from(format!(
            "    Before {} {:>7}   remaining {}",
            text_bar(&tier.usage_percent_before, BAR_WIDTH),
            fmt_percent(&tier.usage_percent_before),
            fmt_money(&tier.remaining_before)
        )));
        lines.push(Line::from(vec![
            Span::raw("    After  "),
            Span::styled(text_bar(&tier.usage_percent_after, BAR_WIDTH), Style::default().fg(color)),
            Span::raw(format!(
                " {:>7}   remaining {}",
                fmt_percent(&tier.usage_percent_after),
                fmt_money(&tier.remaining_after)
            )),
        ]));
    }
    lines
}

/// Plain-text rendering for headless output.
pub fn impact_text(state: &ImpactWidgetState) -> String {
    impact_lines(state)
        .iter()
        .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Draws the widget; renders nothing for an absent or empty payload.
pub fn render(f: &mut Frame, area: Rect, state: &ImpactWidgetState) {
    let lines = impact_lines(state);
    if lines.is_empty() {
        return;
    }
    let mode = if state.expanded_view { "expanded" } else { "compact" };
    let title = format!("Budget impact: {} ({mode}, v: toggle view, 1-3: fold tier)", state.title());
    let border = if state.show_warning() { Color::Red } else { Color::Reset };

    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title).border_style(Style::default().fg(border)))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{project, TierUsage};
    use ratatui::{backend::TestBackend, Terminal};
    use rust_decimal::Decimal;

    fn tier(budget: i64, used: i64, amount: i64) -> ImpactTier {
        project(TierUsage { budget: Decimal::from(budget), used: Decimal::from(used) }, Decimal::from(amount))
    }

    fn exceeding() -> BudgetImpact {
        BudgetImpact {
            department: Some(tier(10000, 9000, 300)),
            category: Some(tier(4000, 3800, 300)),
            subcategory: None,
        }
    }

    #[test]
    fn empty_payload_renders_nothing() {
        let mut state = ImpactWidgetState::default();
        assert!(impact_lines(&state).is_empty());
        state.set_impact(Some(BudgetImpact::default()), "Expense #1");
        assert!(impact_lines(&state).is_empty());
        assert!(!state.show_warning());

        let backend = TestBackend::new(40, 6);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, f.size(), &state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        assert!(buffer.content().iter().all(|cell| cell.symbol() == " "));
    }

    #[test]
    fn banner_shows_when_any_tier_exceeds() {
        let mut state = ImpactWidgetState::default();
        state.set_impact(Some(exceeding()), "Expense #7");
        assert!(state.show_warning());
        let text = impact_text(&state);
        assert!(text.starts_with("⚠ Approving"));
        assert!(text.contains("Department"));
        assert!(text.contains("102.5%"));
        assert!(text.contains("[EXCEEDS]"));
    }

    #[test]
    fn no_banner_within_budget() {
        let mut state = ImpactWidgetState::default();
        state.set_impact(
            Some(BudgetImpact { department: Some(tier(10000, 1000, 300)), ..Default::default() }),
            "what-if",
        );
        assert!(!impact_text(&state).contains("⚠"));
    }

    #[test]
    fn collapse_state_resets_on_new_payload() {
        let mut state = ImpactWidgetState { expanded_view: true, ..Default::default() };
        state.set_impact(Some(exceeding()), "a");
        let full = impact_lines(&state).len();
        state.toggle_tier(NodeKind::Category);
        assert!(state.is_collapsed(NodeKind::Category));
        assert_eq!(impact_lines(&state).len(), full - 3);

        let before = state.generation();
        state.set_impact(Some(exceeding()), "b");
        assert!(state.generation() > before);
        assert!(!state.is_collapsed(NodeKind::Category));
        assert_eq!(impact_lines(&state).len(), full);
    }

    #[test]
    fn tier_number_matches_its_fold_key_when_tiers_are_missing() {
        let mut state = ImpactWidgetState { expanded_view: true, ..Default::default() };
        state.set_impact(
            Some(BudgetImpact { subcategory: Some(tier(1000, 100, 50)), ..Default::default() }),
            "sub only",
        );
        let text = impact_text(&state);
        assert!(text.starts_with("▾ 3 Subcategory"), "{text}");
        assert_eq!(impact_lines(&state).len(), 4);

        state.toggle_tier(NodeKind::Department);
        assert_eq!(impact_lines(&state).len(), 4);
        state.toggle_tier(NodeKind::Subcategory);
        assert_eq!(impact_lines(&state).len(), 1);
        assert!(impact_text(&state).starts_with("▸ 3 Subcategory"));

        state.expanded_view = false;
        assert!(impact_text(&state).starts_with("3 Subcategory"));
    }
}
