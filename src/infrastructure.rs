// Infrastructure layer modules
pub mod config;
pub mod logging;
pub mod metadata_store;
pub mod object_storage;
pub mod sns_ops;
pub mod sqs_ops;
pub mod ssm_ops;

// Re-exports
pub use config::{AppConfig, ConfigError, ConfigSource, EnvParameterSource, ParameterSource};
pub use logging::init_logging;
pub use metadata_store::{SqliteMetadataStore, StoreError};
pub use object_storage::{ObjectStorage, S3ObjectStorage, StorageError, StoredObject};
pub use sns_ops::{NotificationTopic, SnsNotificationTopic, Subscription, TopicError};
pub use sqs_ops::{MessageQueue, QueueError, SqsMessageQueue};
pub use ssm_ops::SsmParameterSource;
