use statdash::{
    init_logging, log_app_bind, log_app_shutdown, log_app_start, logging_config_from_env,
    relay_router, relay_server_config_from_env,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("relay_server", &logging_cfg);

    let cfg = relay_server_config_from_env()?;
    let app = relay_router(&cfg.relay)?;
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr, &cfg.relay.mount_prefix);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let reason = match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl_c",
        Err(_) => "signal_handler_unavailable",
    };
    log_app_shutdown("relay_server", reason);
}
