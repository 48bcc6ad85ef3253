//! Dashboard view controller: owns the view state, the refresh timer and the
//! single authoritative in-flight fetch.
//!
//! Every fetch is tagged with a generation number. Starting a fetch aborts the
//! previous task and bumps the generation; a completion whose generation is no
//! longer current is dropped without touching the view state. Parameter
//! changes and the generation bump share one critical section, so stats
//! always belong to the parameters shown next to them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::export::{collect_export, write_export, ExportError};
use crate::source::{FetchError, StatsSource};
use crate::stats::{ActiveTab, GameStats, StatsTarget, Timeframe};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub timeframe: Timeframe,
    pub selected_game: Option<String>,
    pub active_tab: ActiveTab,
    pub stats: Option<GameStats>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ViewState {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            selected_game: None,
            active_tab: ActiveTab::Overall,
            stats: None,
            loading: false,
            error: None,
        }
    }

    /// Endpoint implied by the current parameters.
    pub fn target(&self) -> StatsTarget {
        match (&self.active_tab, &self.selected_game) {
            (ActiveTab::Game, Some(game)) => StatsTarget::game(self.timeframe, game),
            _ => StatsTarget::overall(self.timeframe),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub refresh_interval: Duration,
    pub initial_timeframe: Timeframe,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            initial_timeframe: Timeframe::Overall,
        }
    }
}

#[derive(Default)]
struct Flight {
    generation: u64,
    handle: Option<JoinHandle<()>>,
    mounted: bool,
}

struct Shared<S> {
    source: Arc<S>,
    state: watch::Sender<ViewState>,
    flight: Mutex<Flight>,
}

impl<S: StatsSource> Shared<S> {
    fn flight(&self) -> MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch_stats(self: &Arc<Self>) {
        self.fetch_with(|_| {});
    }

    /// Applies `change` to the view state and starts the authoritative fetch
    /// for the resulting parameters. Both happen under the flight lock, so a
    /// completion for the previous generation either lands before the change
    /// or is dropped as stale.
    fn fetch_with(self: &Arc<Self>, change: impl FnOnce(&mut ViewState)) {
        let mut flight = self.flight();
        if !flight.mounted {
            return;
        }

        if let Some(previous) = flight.handle.take() {
            if !previous.is_finished() {
                debug!(
                    component = "dashboard",
                    event = "dashboard.fetch.superseded",
                    generation = flight.generation
                );
            }
            previous.abort();
        }

        flight.generation = flight.generation.wrapping_add(1);
        let generation = flight.generation;
        let mut target = None;
        self.state.send_modify(|state| {
            change(state);
            state.loading = true;
            state.error = None;
            target = Some(state.target());
        });
        let Some(target) = target else {
            return;
        };

        debug!(
            component = "dashboard",
            event = "dashboard.fetch.start",
            generation,
            path = %target.path()
        );

        let shared = Arc::clone(self);
        flight.handle = Some(tokio::spawn(async move {
            let result = shared.source.fetch(&target).await;
            shared.settle(generation, result);
        }));
    }

    fn settle(&self, generation: u64, result: Result<GameStats, FetchError>) {
        let mut flight = self.flight();
        if !flight.mounted || flight.generation != generation {
            debug!(
                component = "dashboard",
                event = "dashboard.fetch.stale_dropped",
                generation,
                current_generation = flight.generation
            );
            return;
        }
        flight.handle = None;

        match result {
            Ok(stats) => self.state.send_modify(|state| {
                state.stats = Some(stats);
                state.error = None;
                state.loading = false;
            }),
            Err(err) if err.is_cancelled() => self.state.send_modify(|state| {
                state.loading = false;
            }),
            Err(err) => {
                warn!(
                    component = "dashboard",
                    event = "dashboard.fetch.error",
                    generation,
                    error = %err
                );
                self.state.send_modify(|state| {
                    state.error = Some(err.to_string());
                    state.loading = false;
                });
            }
        }
    }

    fn teardown(&self) {
        let mut flight = self.flight();
        if !flight.mounted {
            return;
        }
        flight.mounted = false;
        flight.generation = flight.generation.wrapping_add(1);
        if let Some(handle) = flight.handle.take() {
            handle.abort();
        }
    }
}

/// A mounted dashboard. Dropping it (or calling [`unmount`](Self::unmount))
/// stops the refresh timer and abandons any pending fetch.
///
/// Must be created inside a Tokio runtime.
pub struct DashboardController<S: StatsSource> {
    shared: Arc<Shared<S>>,
    refresh_task: Option<JoinHandle<()>>,
}

impl<S: StatsSource> DashboardController<S> {
    /// Creates the view state, issues the initial fetch and starts the
    /// periodic refresh. The first timer tick fires one full interval later.
    pub fn mount(source: S, cfg: DashboardConfig) -> Self {
        let (state, _) = watch::channel(ViewState::new(cfg.initial_timeframe));
        let shared = Arc::new(Shared {
            source: Arc::new(source),
            state,
            flight: Mutex::new(Flight {
                mounted: true,
                ..Flight::default()
            }),
        });

        info!(
            component = "dashboard",
            event = "dashboard.mount",
            timeframe = %cfg.initial_timeframe,
            refresh_interval_ms = cfg.refresh_interval.as_millis() as u64
        );

        shared.fetch_stats();
        let refresh_task = spawn_refresh(Arc::clone(&shared), cfg.refresh_interval);

        Self {
            shared,
            refresh_task: Some(refresh_task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> ViewState {
        self.shared.state.borrow().clone()
    }

    pub fn set_timeframe(&self, timeframe: Timeframe) {
        self.shared.fetch_with(|state| {
            state.timeframe = timeframe;
            state.stats = None;
        });
    }

    pub fn set_selected_game(&self, game: Option<String>) {
        self.shared.fetch_with(|state| {
            state.selected_game = game;
            state.stats = None;
        });
    }

    pub fn set_active_tab(&self, tab: ActiveTab) {
        self.shared.fetch_with(|state| {
            state.active_tab = tab;
            if tab != ActiveTab::Game {
                state.selected_game = None;
            }
            state.stats = None;
        });
    }

    /// Re-fetches with the current parameters, superseding any pending fetch.
    pub fn fetch_stats(&self) {
        self.shared.fetch_stats();
    }

    /// Fetches overall and per-game statistics for the current timeframe and
    /// writes them to `dir`. Independent of the live fetch lifecycle.
    pub async fn export_all_data(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let timeframe = self.shared.state.borrow().timeframe;
        let report = collect_export(Arc::clone(&self.shared.source), timeframe).await?;
        write_export(dir, &report)
    }

    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
            self.shared.teardown();
            info!(component = "dashboard", event = "dashboard.unmount");
        }
    }
}

impl<S: StatsSource> Drop for DashboardController<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_refresh<S: StatsSource>(shared: Arc<Shared<S>>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!(component = "dashboard", event = "dashboard.refresh.tick");
            shared.fetch_stats();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::sync::mpsc;

    struct Never;

    impl StatsSource for Never {
        fn fetch(
            &self,
            _target: &StatsTarget,
        ) -> impl Future<Output = Result<GameStats, FetchError>> + Send {
            std::future::pending()
        }
    }

    /// Reports every issued target to the test and never resolves.
    struct Recording {
        issued: mpsc::UnboundedSender<StatsTarget>,
    }

    impl StatsSource for Recording {
        fn fetch(
            &self,
            target: &StatsTarget,
        ) -> impl Future<Output = Result<GameStats, FetchError>> + Send {
            let _ = self.issued.send(target.clone());
            std::future::pending()
        }
    }

    fn stats(wins: u64) -> GameStats {
        GameStats {
            wins,
            losses: 1,
            games_played: wins + 1,
            win_percentage: 0.0,
            loss_percentage: 0.0,
        }
    }

    fn mounted<S: StatsSource>(source: S) -> Arc<Shared<S>> {
        let (state, _) = watch::channel(ViewState::new(Timeframe::Overall));
        Arc::new(Shared {
            source: Arc::new(source),
            state,
            flight: Mutex::new(Flight {
                mounted: true,
                ..Flight::default()
            }),
        })
    }

    fn shared() -> Arc<Shared<Never>> {
        mounted(Never)
    }

    fn to_weekly(state: &mut ViewState) {
        state.timeframe = Timeframe::Weekly;
        state.stats = None;
    }

    async fn next_issued(rx: &mut mpsc::UnboundedReceiver<StatsTarget>) -> StatsTarget {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fetch should be issued")
            .expect("source still alive")
    }

    #[test]
    fn target_uses_game_endpoint_only_on_game_tab_with_selection() {
        let mut state = ViewState::new(Timeframe::Weekly);
        assert_eq!(state.target(), StatsTarget::overall(Timeframe::Weekly));

        state.selected_game = Some("Plinko".to_string());
        assert_eq!(state.target(), StatsTarget::overall(Timeframe::Weekly));

        state.active_tab = ActiveTab::Game;
        assert_eq!(state.target(), StatsTarget::game(Timeframe::Weekly, "plinko"));

        state.selected_game = None;
        assert_eq!(state.target(), StatsTarget::overall(Timeframe::Weekly));
    }

    #[tokio::test]
    async fn stale_generation_result_is_dropped() {
        let shared = shared();
        shared.fetch_stats();
        let stale = shared.flight().generation;
        shared.fetch_stats();

        shared.settle(stale, Ok(stats(7)));
        let state = shared.state.borrow().clone();
        assert!(state.stats.is_none());
        assert!(state.loading);

        let current = shared.flight().generation;
        shared.settle(current, Ok(stats(9)));
        let state = shared.state.borrow().clone();
        assert_eq!(state.stats, Some(stats(9)));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn error_keeps_previous_snapshot() {
        let shared = shared();
        shared.fetch_stats();
        let generation = shared.flight().generation;
        shared.settle(generation, Ok(stats(3)));

        shared.fetch_stats();
        let generation = shared.flight().generation;
        shared.settle(generation, Err(FetchError::BadStatus { status: 502 }));

        let state = shared.state.borrow().clone();
        assert_eq!(state.stats, Some(stats(3)));
        assert_eq!(
            state.error.as_deref(),
            Some("statistics request failed with HTTP status 502")
        );
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn cancellation_reported_by_source_is_silent() {
        let shared = shared();
        shared.fetch_stats();
        let generation = shared.flight().generation;
        shared.settle(generation, Err(FetchError::Cancelled));

        let state = shared.state.borrow().clone();
        assert!(state.error.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn teardown_blocks_later_fetches_and_completions() {
        let shared = shared();
        shared.fetch_stats();
        let generation = shared.flight().generation;
        shared.teardown();

        shared.settle(generation, Ok(stats(1)));
        shared.fetch_stats();

        let flight = shared.flight();
        assert!(!flight.mounted);
        assert!(flight.handle.is_none());
        drop(flight);
        assert!(shared.state.borrow().stats.is_none());
    }

    #[tokio::test]
    async fn completion_after_parameter_change_is_dropped() {
        let shared = shared();
        shared.fetch_stats();
        let overall_generation = shared.flight().generation;

        shared.fetch_with(to_weekly);
        shared.settle(overall_generation, Ok(stats(7)));

        let state = shared.state.borrow().clone();
        assert_eq!(state.timeframe, Timeframe::Weekly);
        assert!(state.stats.is_none());
        assert!(state.loading);
        assert_eq!(shared.flight().generation, overall_generation + 1);
    }

    #[tokio::test]
    async fn completion_before_parameter_change_is_cleared_by_it() {
        let shared = shared();
        shared.fetch_stats();
        let overall_generation = shared.flight().generation;
        shared.settle(overall_generation, Ok(stats(7)));

        shared.fetch_with(to_weekly);

        let state = shared.state.borrow().clone();
        assert_eq!(state.timeframe, Timeframe::Weekly);
        assert!(state.stats.is_none());
        assert!(state.loading);
    }

    #[tokio::test]
    async fn error_for_superseded_parameters_is_not_surfaced() {
        let shared = shared();
        shared.fetch_stats();
        let overall_generation = shared.flight().generation;

        shared.fetch_with(to_weekly);
        shared.settle(
            overall_generation,
            Err(FetchError::NetworkUnavailable("reset".to_string())),
        );

        let state = shared.state.borrow().clone();
        assert!(state.error.is_none());
        assert!(state.loading);
    }

    #[tokio::test]
    async fn refresh_after_parameter_change_targets_new_parameters() {
        let (issued, mut rx) = mpsc::unbounded_channel();
        let shared = mounted(Recording { issued });

        shared.fetch_stats();
        assert_eq!(next_issued(&mut rx).await, StatsTarget::overall(Timeframe::Overall));

        shared.fetch_with(to_weekly);
        assert_eq!(next_issued(&mut rx).await, StatsTarget::overall(Timeframe::Weekly));

        // A timer tick arriving now must not resurrect the old endpoint.
        shared.fetch_stats();
        assert_eq!(next_issued(&mut rx).await, StatsTarget::overall(Timeframe::Weekly));
    }

    #[tokio::test]
    async fn target_is_read_after_the_change_is_applied() {
        let (issued, mut rx) = mpsc::unbounded_channel();
        let shared = mounted(Recording { issued });

        shared.fetch_with(|state| {
            state.active_tab = ActiveTab::Game;
            state.selected_game = Some("Keno".to_string());
        });

        assert_eq!(
            next_issued(&mut rx).await,
            StatsTarget::game(Timeframe::Overall, "keno")
        );
    }
}
