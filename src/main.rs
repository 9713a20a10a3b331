use rocket::{launch, routes};
use std::sync::Arc;

use doppler_auction::bootstrap::AppState;
use doppler_auction::config::Config;
use doppler_auction::web::routes::{auction, health, slugs, trade};

#[launch]
fn rocket() -> _ {
    env_logger::init();

    // Load configuration
    let config = Config::from_env()
        .expect("Failed to load configuration");

    // Build application state: simulated pool plus the initialized auction
    let app_state = Arc::new(
        AppState::new(&config)
            .expect("Failed to initialize auction")
    );
    log::info!("serving auction {} on port {}", app_state.pool_id, config.port);

    // Configure Rocket
    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", "0.0.0.0"));

    rocket::custom(figment)
        .manage(app_state)
        .mount("/", routes![auction, slugs, trade, health])
}
