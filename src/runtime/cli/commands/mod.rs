pub mod chats;
pub mod conversation;
pub mod decode;
pub mod retrieval;
pub mod settings;
