mod handler;
mod model;

pub use handler::{archive, get_scene, list_years};
pub use model::HistoryScene;
