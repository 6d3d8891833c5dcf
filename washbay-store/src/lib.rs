pub mod app_config;
pub mod capacity_repo;
pub mod database;
pub mod memory;
pub mod redis_repo;
pub mod reservation_repo;

pub use capacity_repo::PgCapacityStore;
pub use database::DbClient;
pub use memory::MemoryStore;
pub use redis_repo::{RedisClient, RedisRateGuard};
pub use reservation_repo::PgReservationLedger;
