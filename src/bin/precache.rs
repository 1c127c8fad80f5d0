//! precache CLI - pre-cache assets and serve them cache-first.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[tokio::main]
async fn main() -> precache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    precache::cli::run().await
}
