use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    headline_lab::run().await
}
