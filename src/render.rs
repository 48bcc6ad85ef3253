//! Plain-text rendering of the dashboard view state.

use crate::controller::ViewState;
use crate::stats::{format_count, ActiveTab};

pub fn render_panel(state: &ViewState) -> String {
    let mut out = String::new();

    let scope = match (&state.active_tab, &state.selected_game) {
        (ActiveTab::Game, Some(game)) => game.clone(),
        _ => "all games".to_string(),
    };
    out.push_str(&format!(
        "[{}] {} · {}{}\n",
        state.active_tab.as_str(),
        state.timeframe,
        scope,
        if state.loading { " (loading…)" } else { "" }
    ));

    match &state.stats {
        Some(stats) => {
            out.push_str(&format!(
                "  wins {:>12}   ({:.2}%)\n",
                format_count(stats.wins),
                stats.win_percentage
            ));
            out.push_str(&format!(
                "  losses {:>10}   ({:.2}%)\n",
                format_count(stats.losses),
                stats.loss_percentage
            ));
            out.push_str(&format!(
                "  played {:>10}\n",
                format_count(stats.games_played)
            ));
            out.push_str(&format!("  W/L ratio {:>7}\n", stats.ratio()));
        }
        None => out.push_str("  no data yet\n"),
    }

    if let Some(error) = &state.error {
        out.push_str(&format!("  ! {error}\n"));
    }

    out
}
