// handlers/mod.rs - HTTP handlers
//
// session: public endpoints (login, logout, health)
// org, role, audit: applications mounted under /v1/auth through the app registry
pub mod audit;
pub mod org;
pub mod role;
pub mod session;
