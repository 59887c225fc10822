// Domain layer modules
pub mod image_record;
pub mod relay_message;

// Re-exports
pub use image_record::{ImageRecord, TableName, TableNameError, file_extension};
pub use relay_message::RelayMessage;
