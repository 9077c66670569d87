//! # HealthSync Agent Entry Point
//!
//! Background daemon that uploads the daily health report.
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load configuration (TOML + `HEALTHSYNC_*` environment)
//! 3. Open the database & run migrations
//! 4. Build the sync engine
//! 5. Register the schedule
//! 6. Wait for Ctrl+C / SIGTERM

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The actual setup is in lib.rs so the wiring can be tested
    healthsync_agent::run().await
}
