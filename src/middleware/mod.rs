pub mod audit;
pub mod response;
pub mod session;

pub use audit::audit_requests;
pub use response::{ApiResponse, Rows, Table};
pub use session::{check_connection, extract_cookie, ApiUser, Session};
