//! statdash core crate.
//!
//! Two collaborating pieces:
//! - a same-origin relay that forwards `GET {mount}/...` to the upstream
//!   statistics service
//! - a dashboard controller that polls the relay, keeping exactly one
//!   authoritative fetch in flight

mod config;
mod controller;
mod export;
mod observability;
mod relay;
mod render;
mod source;
mod stats;

pub use config::{
    dashboard_client_config_from_env, relay_server_config_from_env, ConfigError,
    DashboardClientConfig, RelayServerConfig, DEFAULT_API_URL, DEFAULT_RELAY_ADDR,
};
pub use controller::{DashboardConfig, DashboardController, ViewState};
pub use export::{
    collect_export, export_file_name, render_export_csv, write_export, ExportError, ExportReport,
};
pub use observability::{
    init_logging, log_app_bind, log_app_shutdown, log_app_start, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use relay::{relay_router, upstream_url, RelayConfig, RelayError, ResponseCache};
pub use render::render_panel;
pub use source::{FetchError, HttpStatsSource, StatsSource};
pub use stats::{
    export_ratio, format_count, parse_count, parse_game_stats, win_loss_ratio, ActiveTab,
    GameStats, StatsTarget, Timeframe, WinLossRatio, EXPORT_RATIO_SENTINEL,
    GAME_CATALOG,
};
