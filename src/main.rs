//! Rollcall - WhatsApp 考勤机器人服务
//!
//! 配置（config/default.toml 或环境变量）:
//! - ROLLCALL__DATABASE__PATH: SQLite 数据库路径（默认 absensi_sekolah.db）
//! - ROLLCALL__BOT__SESSION_TIMEOUT_SECS: 会话空闲过期秒数（默认不过期）
//! - ONESENDER_URL / ONESENDER_API_KEY: 出站消息网关
//! - PORT: 监听端口（默认 5000）
//!
//! 启动: cargo run --bin rollcall [-- path/to/config.toml]

#[cfg(feature = "whatsapp")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use rollcall::config::load_config;
    use rollcall::engine::{ConversationEngine, EngineSettings, SystemClock};
    use rollcall::integrations::onesender::{create_router, OneSenderClient, WebhookState};
    use rollcall::roster::SqliteStore;
    use rollcall::session::SessionStore;
    use tokio_util::sync::CancellationToken;

    rollcall::observability::init();

    let cfg = load_config(std::env::args().nth(1).map(PathBuf::from)).context("Failed to load config")?;

    let store = Arc::new(
        SqliteStore::open(&cfg.database.path, cfg.database.max_connections)
            .await
            .with_context(|| format!("Failed to open database {}", cfg.database.path.display()))?,
    );
    if cfg.database.seed_sample_data {
        store.seed_sample_data().await.context("Failed to seed sample data")?;
    }

    let session_timeout = cfg.bot.session_timeout();
    let sessions = Arc::new(SessionStore::new(session_timeout));
    let engine = Arc::new(ConversationEngine::new(
        store.clone(),
        store.clone(),
        sessions.clone(),
        Arc::new(SystemClock),
        EngineSettings::from(&cfg.bot),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = session_timeout.map(|timeout| {
        let interval = (timeout / 2).max(Duration::from_secs(1));
        sessions.clone().spawn_sweeper(interval, shutdown.child_token())
    });

    let state = Arc::new(WebhookState {
        engine,
        notifier: Arc::new(OneSenderClient::new(&cfg.onesender)?),
    });
    let app = create_router(state);

    let addr = cfg.app.bind_addr()?;
    tracing::info!(
        "{} listening on http://{}",
        cfg.app.name.as_deref().unwrap_or("Rollcall"),
        addr
    );
    tracing::info!("Webhook URL: http://YOUR_HOST:{}/webhook", addr.port());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
            token.cancel();
        })
        .await?;

    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    store.close().await;

    Ok(())
}

#[cfg(not(feature = "whatsapp"))]
fn main() {
    eprintln!("请使用 --features whatsapp 编译: cargo run --bin rollcall --features whatsapp");
    std::process::exit(1);
}
