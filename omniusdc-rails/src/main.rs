//! USDC Rail Service
//!
//! Entry point for the unified balance and attestation tracking service.

use omniusdc_rails::main_entry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    main_entry::run_server().await
}
