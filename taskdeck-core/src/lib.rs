pub mod due_date;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod validation;

pub use due_date::*;
pub use errors::*;
pub use models::*;
pub use protocol::*;
