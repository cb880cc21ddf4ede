//! bcbot runtime: ledger, Telegram transport, gateway loop and the health server.

use crate::config::{BotConfig, LedgerMode};
use crate::gateway::Gateway;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::http::Request;
use axum::response::Response;
use bc_channels::{ChatTransport, TelegramAdapter};
use bc_core::{LedgerGateway, MemoryLedger};
use bc_ledger::LedgerClient;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;

const INBOUND_QUEUE_CAPACITY: usize = 256;

pub struct AppState {
    pub ledger_backend: String,
    pub channel_id: String,
    pub started_at: Instant,
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = BotConfig::load_with_path(config_path).await?;
    let locale = cfg.load_locale(&path).await?;
    let ledger = build_ledger(&cfg)?;
    TelegramAdapter::new(&cfg.telegram.bot_token)?;
    tracing::info!(
        config_path = %path.display(),
        ledger_backend = ledger.backend(),
        ledger_api_url = %cfg.ledger.api_url,
        locale_path = ?cfg.locale.path,
        locale_help_chars = locale.messages.help.chars().count(),
        what_is_new_until = ?cfg.announcements.what_is_new_until,
        health_enabled = cfg.server.enabled,
        health_port = cfg.server.port,
        "config ok"
    );
    Ok(())
}

fn build_ledger(cfg: &BotConfig) -> Result<Arc<dyn LedgerGateway>> {
    let ledger: Arc<dyn LedgerGateway> = match cfg.ledger.mode {
        LedgerMode::Graphql => Arc::new(
            LedgerClient::new(
                &cfg.ledger.api_url,
                Duration::from_secs(cfg.ledger.timeout_secs),
            )
            .map_err(|e| anyhow::anyhow!("build ledger client: {e}"))?,
        ),
        LedgerMode::Memory => {
            tracing::warn!("using the in-memory ledger; balances are lost on restart");
            Arc::new(MemoryLedger::new(cfg.ledger.starting_balance))
        }
    };
    Ok(ledger)
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, cfg_path) = BotConfig::load_with_path(config_path).await?;
    let started_at = Instant::now();
    let locale = Arc::new(cfg.load_locale(&cfg_path).await?);
    tracing::info!(
        config_path = %cfg_path.display(),
        ledger_mode = ?cfg.ledger.mode,
        ledger_timeout_secs = cfg.ledger.timeout_secs,
        long_poll_timeout_secs = cfg.telegram.long_poll_timeout_secs,
        inline_cache_time_secs = cfg.inline.cache_time_secs,
        what_is_new_until = ?cfg.announcements.what_is_new_until,
        health_enabled = cfg.server.enabled,
        health_port = cfg.server.port,
        "server configuration loaded"
    );

    let listener = if cfg.server.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
        Some(preflight_bind_listener(addr).await?)
    } else {
        None
    };

    let ledger = build_ledger(&cfg)?;
    let transport: Arc<dyn ChatTransport> = Arc::new(
        TelegramAdapter::new(&cfg.telegram.bot_token)?
            .with_long_poll_timeout(cfg.telegram.long_poll_timeout_secs)?,
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();
    transport
        .start(inbound_tx, shutdown.child_token())
        .await?;

    let state = Arc::new(AppState {
        ledger_backend: ledger.backend().to_string(),
        channel_id: transport.channel_id().to_string(),
        started_at,
    });
    let gateway = Arc::new(Gateway::new(&cfg, locale, ledger, transport, inbound_rx));
    let gateway_handle = gateway.start(shutdown.child_token());
    tracing::info!(
        channel = %state.channel_id,
        ledger_backend = %state.ledger_backend,
        "gateway started"
    );

    match listener {
        Some(listener) => {
            let addr = listener.local_addr()?;
            let trace_layer = TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        method = %request.method(),
                        uri = %request.uri()
                    )
                })
                .on_request(|request: &Request<_>, _span: &tracing::Span| {
                    tracing::debug!(
                        method = %request.method(),
                        uri = %request.uri(),
                        "http request started"
                    );
                })
                .on_response(
                    |response: &Response, latency: Duration, _span: &tracing::Span| {
                        tracing::info!(
                            status = response.status().as_u16(),
                            latency_ms = latency.as_millis() as u64,
                            "http request completed"
                        );
                    },
                )
                .on_failure(
                    |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                        tracing::error!(
                            error_class = %error,
                            latency_ms = latency.as_millis() as u64,
                            "http request failed"
                        );
                    },
                );
            let app = routes::router()
                .layer(Extension(state))
                .layer(trace_layer);
            tracing::info!(%addr, "health endpoint serving");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
                .await?;
            tracing::info!("http server shutdown completed");
        }
        None => shutdown_signal(shutdown.clone()).await,
    }

    shutdown.cancel();
    match gateway_handle.await {
        Ok(()) => tracing::info!("gateway shutdown completed"),
        Err(e) => tracing::error!(error = %e, "gateway task join failed during shutdown"),
    }

    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => {}
        }
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::build_ledger;
    use crate::config::{BotConfig, LedgerMode};

    #[test]
    fn ledger_backend_follows_mode() {
        let mut cfg = BotConfig::default();
        cfg.ledger.mode = LedgerMode::Memory;
        assert_eq!(build_ledger(&cfg).expect("memory").backend(), "memory");

        cfg.ledger.mode = LedgerMode::Graphql;
        cfg.ledger.api_url = "https://bank.example/api".to_string();
        assert_eq!(build_ledger(&cfg).expect("graphql").backend(), "graphql");

        cfg.ledger.api_url = "not a url".to_string();
        assert!(build_ledger(&cfg).is_err());
    }
}
