use statdash::{
    dashboard_client_config_from_env, init_logging, log_app_shutdown, log_app_start,
    logging_config_from_env, render_panel, ActiveTab, DashboardController, HttpStatsSource,
    Timeframe,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const HELP: &str =
    "commands: tf <hourly|weekly|monthly|overall> | game <name> | tab <name> | refresh | export | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("dashboard_cli", &logging_cfg);

    let cfg = dashboard_client_config_from_env();
    let source = HttpStatsSource::new(cfg.api_url.clone(), cfg.fetch_timeout_ms)?;
    info!(
        component = "dashboard_cli",
        event = "dashboard.source",
        base_url = source.base_url(),
        fetch_timeout_ms = cfg.fetch_timeout_ms
    );
    let dashboard = DashboardController::mount(source, cfg.dashboard.clone());

    let mut updates = dashboard.subscribe();
    let printer = tokio::spawn(async move {
        print!("{}", render_panel(&updates.borrow_and_update()));
        while updates.changed().await.is_ok() {
            print!("{}", render_panel(&updates.borrow_and_update()));
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.trim().splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).unwrap_or_default();

        match command {
            "" => {}
            "tf" => match arg.parse::<Timeframe>() {
                Ok(timeframe) => dashboard.set_timeframe(timeframe),
                Err(err) => eprintln!("{err}"),
            },
            "game" if arg.is_empty() => dashboard.set_selected_game(None),
            "game" => dashboard.set_selected_game(Some(arg.to_string())),
            "tab" => match arg.parse::<ActiveTab>() {
                Ok(tab) => dashboard.set_active_tab(tab),
                Err(err) => eprintln!("{err}"),
            },
            "refresh" => dashboard.fetch_stats(),
            "export" => match dashboard.export_all_data(&cfg.export_dir).await {
                Ok(path) => println!("exported to {}", path.display()),
                Err(err) => eprintln!("export failed: {err}"),
            },
            "quit" | "exit" => break,
            _ => println!("{HELP}"),
        }
    }

    dashboard.unmount();
    printer.abort();
    log_app_shutdown("dashboard_cli", "stdin_closed");
    Ok(())
}
