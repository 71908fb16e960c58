pub mod executions;
