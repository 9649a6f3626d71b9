#[tokio::main]
async fn main() -> std::io::Result<()> {
    turret_client::run_with_config().await
}
