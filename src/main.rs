#[tokio::main]
async fn main() -> anyhow::Result<()> {
    price_sentinel_lib::cli::run().await
}
