#[tokio::main]
async fn main() -> anyhow::Result<()> {
    content_router::run().await
}
