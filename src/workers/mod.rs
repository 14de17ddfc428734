mod block_worker;
mod receipt_worker;

pub use block_worker::BlockWorkerPool;
pub use receipt_worker::ReceiptWorkerPool;
