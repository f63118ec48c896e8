use orgcrawl::{command_argument_builder, handle_crawl};
use orgcrawl_core::print_banner;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    let quiet = matches.get_flag("quiet");

    // RUST_LOG overrides; by default only warnings so the spinner stays readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if quiet { "error" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if !quiet {
        print_banner();
    }

    handle_crawl(&matches).await;
}
