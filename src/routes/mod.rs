pub mod admin;
pub mod auth;
pub mod friend;
pub mod health;
pub mod history;
pub mod message;
pub mod notification;
pub mod user;
