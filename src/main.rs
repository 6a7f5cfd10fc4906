use callbridge::application::{CallAuthorityAdapter, CallRegistry};
use callbridge::config::Config;
use callbridge::domain::shared::value_objects::CallId;
use callbridge::infrastructure::authority::SimulatedAuthority;
use callbridge::infrastructure::metrics::init_metrics;
use callbridge::infrastructure::service::SimulatedCallService;
use callbridge::interface::bridge::CallKitPlugin;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting CallBridge");
    info!("Configuration loaded: {:?}", config);

    let metrics = init_metrics()?;

    // Wire the authority, registry, adapter and bridge
    let capacity = config.events.channel_capacity;
    let authority = SimulatedAuthority::spawn(config.provider.clone());
    let registry = Arc::new(CallRegistry::with_capacity(authority.clone(), capacity));
    let adapter = CallAuthorityAdapter::with_capacity(
        registry,
        authority.clone(),
        Arc::new(SimulatedCallService::new()),
        capacity,
    );
    let plugin = CallKitPlugin::new(adapter);

    let mut callbacks = plugin.register();
    let printer = tokio::spawn(async move {
        while let Some(payload) = callbacks.recv().await {
            match serde_json::to_string(&payload) {
                Ok(json) => info!("Callback: {}", json),
                Err(e) => warn!("Failed to serialize callback: {}", e),
            }
        }
    });

    demo_outgoing_call(&plugin, &authority).await?;
    demo_incoming_call(&plugin, &authority).await?;

    // Let the printer drain before rendering metrics
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Metrics snapshot:\n{}", metrics.render());

    drop(plugin);
    printer.abort();

    info!("CallBridge demo finished");
    Ok(())
}

async fn demo_outgoing_call(
    plugin: &CallKitPlugin,
    authority: &SimulatedAuthority,
) -> anyhow::Result<()> {
    info!("=== Outgoing call ===");

    let id = plugin.start_call(&[json!("Alice"), json!(false)]).await?;
    authority.settle().await;
    info!("Started call {}", id);

    plugin.call_connected(&[json!(id)])?;

    let call_id: CallId = id.parse()?;
    authority.set_held(call_id, true)?;
    authority.settle().await;
    authority.set_held(call_id, false)?;
    authority.settle().await;

    plugin.end_call(&[json!(id)]).await?;
    authority.settle().await;

    for report in authority.outgoing_reports() {
        info!("Reported {:?} for {} at {:?}", report.kind, report.call_id, report.at);
    }
    Ok(())
}

async fn demo_incoming_call(
    plugin: &CallKitPlugin,
    authority: &SimulatedAuthority,
) -> anyhow::Result<()> {
    info!("=== Incoming call ===");

    let id = plugin
        .report_incoming_call(&[
            json!("Bob"),
            json!(false),
            json!(false),
            json!(false),
            json!(true),
            json!(true),
        ])
        .await?;
    info!("Reported incoming call {}", id);

    authority.answer(id.parse()?)?;
    authority.settle().await;
    plugin.finish_ring(&[])?;

    // The system tears everything down, e.g. after a crash of its daemon
    authority.reset();
    authority.settle().await;

    for record in authority.action_log() {
        info!(
            "Action {} for {}: {:?}{}",
            record.kind,
            record.call_id,
            record.outcome,
            if record.timed_out { " (timed out)" } else { "" }
        );
    }
    Ok(())
}
