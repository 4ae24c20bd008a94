pub mod resync_loop;
pub mod task_runner;
