#[tokio::main]
async fn main() -> anyhow::Result<()> {
    study_sync::run().await
}
