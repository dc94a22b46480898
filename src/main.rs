use clap::Parser;

use mcp_gateway::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = mcp_gateway::run(args).await {
        eprintln!("mcp-gateway: fatal error: {e:#}");
        std::process::exit(1);
    }
}
