pub mod jwt;
pub mod middleware;
pub mod policy;

pub use middleware::AuthUser;
