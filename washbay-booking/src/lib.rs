pub mod coordinator;
pub mod notify;
pub mod rate;

pub use coordinator::BookingCoordinator;
pub use notify::LogNotifier;
pub use rate::MemoryRateGuard;
