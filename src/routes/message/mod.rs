mod handler;
mod model;

pub use handler::{
    delete_message, get_mailbox, get_message, get_sent, report_message, send_message,
    update_position,
};
pub use model::{MAX_CONTENT_CHARS, Message, NewMessage};
