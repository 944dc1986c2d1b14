pub mod analytics;
pub mod app;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod proxy;
pub mod queries;
pub mod sales;
pub mod state;
pub mod stock;
pub mod ui;

pub use app::router;
pub use config::Settings;
pub use proxy::ProxyClient;
pub use state::AppState;
