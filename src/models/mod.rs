pub mod file;
pub mod message;

pub use file::StoredFile;
pub use message::Message;
