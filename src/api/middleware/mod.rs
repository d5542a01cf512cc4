pub mod idempotency;
pub mod trace_id;
pub mod user_context;

pub use idempotency::idempotency_middleware;
pub use trace_id::trace_id_middleware;
pub use user_context::AuthContext;
