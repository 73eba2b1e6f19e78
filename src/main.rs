#[tokio::main]
async fn main() {
    if let Err(e) = medsafe::run().await {
        tracing::error!("{e}");
        eprintln!("medsafe: {e}");
        std::process::exit(1);
    }
}
