mod handler;
mod model;

pub use handler::{
    get_me, save_scene_layout, search, select_scene, set_background, update_nickname,
    update_password,
};
pub use model::{
    MAX_NICKNAME_CHANGES, MAX_PASSWORD_CHANGES, Position, Profile, PublicUser, SceneLayout, User,
    UserRole, lockout_after, validate_handle, validate_nickname, validate_password,
};
