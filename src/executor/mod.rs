//! Background Task Processing
//!
//! Every node owns a single FIFO of background work, drained by one sequential
//! loop. Handlers stay short by pushing anything slow (file ingestion, file
//! sync, job scheduling and execution) onto the queue.
//!
//! ## Submodules
//! - **`types`**: the closed set of task variants.
//! - **`queue`**: the FIFO itself.
//! - **`executor`**: the drain loop and per-task execution.

pub mod executor;
pub mod queue;
pub mod types;
