#[tokio::main]
async fn main() {
    if let Err(e) = covenant_token::cli::run().await {
        eprintln!("Error: {}: {}", e.kind(), e);
        std::process::exit(1);
    }
}
