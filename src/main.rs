mod server;

use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use portico::{ApiRelay, RouteTable, StatsRegistry, WebProxy};

#[derive(Debug, Parser)]
#[command(
    name = "portico",
    version,
    about = "Prefix-routing API gateway with a generic web proxy"
)]
struct Cli {
    /// Address to bind the gateway to.
    #[arg(long, env = "PORTICO_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Port to bind the gateway to.
    #[arg(long, env = "PORTICO_PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let routes = Arc::new(RouteTable::builtin());
    let stats = StatsRegistry::new(routes.prefixes().map(str::to_owned));
    let relay = ApiRelay::new(routes, stats);
    let proxy = WebProxy::new()?;

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    server::serve(addr, relay, proxy).await
}
