mod backlog_test;
mod batching_test;
mod linking_test;
mod scheduler_test;
