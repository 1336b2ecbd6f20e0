use std::sync::{Arc, Mutex};

use anyhow::Result;

use liwanag_backend::{config::Config, db::Db, web};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env()?;

    let mut db = Db::connect(&config.database_url)?;
    db.run_migrations()?;
    db.ensure_device_key(&config.device_api_key)?;

    let db = Arc::new(Mutex::new(db));
    log::info!("listening on {}", config.bind_addr);
    web::new_http_server(db, config).await?;
    Ok(())
}
