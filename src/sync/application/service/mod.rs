pub mod batch_scheduler;
pub mod periodic_driver;
pub mod reconciler;
pub mod run_guard;
pub mod task_recorder;
