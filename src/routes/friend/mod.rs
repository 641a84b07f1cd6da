mod handler;
mod model;

pub use handler::{
    check_friend, get_decor, incoming_requests, list_friends, respond, send_request, sent_requests,
};
pub use model::{FriendLink, FriendStatus, OnboardingBot, RespondAction};
