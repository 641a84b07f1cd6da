mod handler;
mod model;

pub use handler::{check_id, login, register};
