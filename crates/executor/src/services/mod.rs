pub mod execution_service;
pub mod snapshot;
pub mod telegram_service;
pub mod trading_loop;
