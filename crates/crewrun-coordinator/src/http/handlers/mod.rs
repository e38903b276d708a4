//! HTTP request handlers.

mod health;
mod stream;
mod tasks;
mod workers;

pub use health::{health_check, metrics_handler};
pub use stream::stream;
pub use tasks::{broadcast, coordination_status, list_activities, list_records, submit_plan, submit_task};
pub use workers::{
    get_worker, list_workers, recover_worker, remove_worker, send_message, set_worker_offline,
    spawn_worker,
};
