use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rust_ofp13::app::{EchoResponder, FlowMonitor, LearningSwitch};
use rust_ofp13::ofp_controller::{ControllerConfig, OfpController, DEFAULT_PORT,
                                 DEFAULT_QUEUE_CAPACITY};

/// OpenFlow 1.3 learning-switch controller.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to listen on for switch connections.
    #[arg(long, env = "OFP_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "OFP_PORT", default_value_t = DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..=65535))]
    port: u16,
    /// Outbound messages buffered per switch before senders wait.
    #[arg(long, env = "OFP_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
    /// Seconds between statistics polls; 0 disables the flow monitor.
    #[arg(long, env = "OFP_FLOW_MONITOR_INTERVAL", default_value_t = 0)]
    flow_monitor_interval: u64,
    /// Log filter, e.g. `info` or `rust_ofp13=debug`. Falls back to RUST_LOG.
    #[arg(long, env = "OFP_LOG")]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.log {
        Some(ref directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let controller = OfpController::new(ControllerConfig {
        host: cli.host,
        port: cli.port,
        queue_capacity: cli.queue_capacity,
    });
    controller.register_application(Arc::new(EchoResponder));
    controller.register_application(Arc::new(LearningSwitch::new()));
    if cli.flow_monitor_interval > 0 {
        let interval = Duration::from_secs(cli.flow_monitor_interval);
        controller.register_application(Arc::new(FlowMonitor::new(interval)));
    }

    controller.run().await?;
    Ok(())
}
