pub mod cache;
pub mod db;
pub mod job_queue;
pub mod logging;
