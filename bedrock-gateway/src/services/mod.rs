pub mod clients;
pub mod providers;
pub mod search;

pub use clients::{ClientInitError, ServiceClients};
pub use providers::TextProvider;
pub use search::SearchClient;
