use live_cursors::config::RelayConfig;
use live_cursors::relay;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env();
    let state = relay::RelayState::new(&config);
    let app = relay::app(state);

    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, subscriber_capacity = config.subscriber_capacity, "live-cursors relay listening");
    axum::serve(listener, app).await.expect("server failed");
}
