pub mod fee_engine;
pub mod orchestrator;
pub mod payment_service;
pub mod providers;
pub mod quote_service;
pub mod rate_service;
pub mod webhook_dispatcher;
