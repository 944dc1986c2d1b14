use crate::analytics::SalesAggregator;
use crate::config::Settings;
use crate::proxy::ProxyClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client: ProxyClient,
    pub aggregator: Arc<SalesAggregator>,
}

impl AppState {
    pub fn new(settings: Settings, client: ProxyClient) -> Self {
        let aggregator = SalesAggregator::new(settings.category_names());
        Self {
            settings: Arc::new(settings),
            client,
            aggregator: Arc::new(aggregator),
        }
    }
}
