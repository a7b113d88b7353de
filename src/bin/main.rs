use clap::Parser;

use task_router_core::cli::{self, Cli};
use task_router_core::observability::{self, ObservabilityConfig};

#[tokio::main]
async fn main() {
    observability::init(&ObservabilityConfig::default());

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        eprintln!("{{\"code\":\"{}\",\"message\":\"{}\"}}", err.code(), err);
        std::process::exit(1);
    }
}
