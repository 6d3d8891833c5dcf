use std::sync::Arc;
use tokio::sync::broadcast;

use washbay_booking::BookingCoordinator;
use washbay_core::repository::CapacityStore;
use washbay_core::ScheduleRules;
use washbay_shared::models::events::CapacityChangedEvent;
use washbay_store::RedisClient;

#[derive(Clone)]
pub struct AppState {
    pub capacity: Arc<dyn CapacityStore>,
    pub coordinator: Arc<BookingCoordinator>,
    pub redis: Arc<RedisClient>,
    pub capacity_tx: broadcast::Sender<CapacityChangedEvent>,
    pub admin_token: String,
    pub rules: ScheduleRules,
}
