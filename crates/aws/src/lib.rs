pub mod batch;
pub mod clients;
pub mod error;
pub mod format;
pub mod paginate;

pub use batch::describe_in_batches;
pub use clients::AwsClients;
pub use error::AwsError;
pub use paginate::{collect_pages, collect_pages_capped, Page};
