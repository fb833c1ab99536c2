pub mod documents;
pub mod tasks;
pub mod workers;

pub use documents::{PostgresDocumentRepository, RegisterOutcome};
pub use tasks::{MAX_DOCUMENTS_LIMIT, PostgresTaskRepository};
pub use workers::PostgresWorkerRepository;
