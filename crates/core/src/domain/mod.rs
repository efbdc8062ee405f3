pub mod conversation;
pub mod reply;
