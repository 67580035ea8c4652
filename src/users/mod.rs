//! Users resource: in-memory store and its routes

pub mod handlers;
pub mod model;
pub mod service;

pub use model::{NewUser, User};
pub use service::{UserError, UserService};
