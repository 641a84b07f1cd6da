mod handler;
mod model;

pub use handler::{list_notifications, mark_all_read, spawn_retention_task};
pub use model::{NewNotification, Notification, NotificationType, NotificationView};
