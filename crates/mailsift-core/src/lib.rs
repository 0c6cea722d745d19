pub mod classifier;
pub mod config;
pub mod db;
pub mod engine;
pub mod features;
pub mod gateway;
pub mod imap;
pub mod jobs;
pub mod journal;
pub mod migrations;
pub mod scheduler;
pub mod telemetry;
pub mod training;

pub use classifier::{Classifier, ClassifierError, HttpClassifier, MockClassifier, Prediction};
pub use config::{
    AdminConfig, AppConfig, ClassifierConfig, Config, ConfigError, ImapConfig, JobsConfig,
    PathsConfig, ProfileConfig,
};
pub use db::{Database, DbError};
pub use engine::{CorrectionError, Engine, EngineSettings};
pub use features::{
    FeatureError, MessageFeatures, Role, determine_role, extract_features, format_model_input,
};
pub use gateway::{GatewayError, MailGateway, MockGateway};
pub use imap::ImapGateway;
pub use jobs::{
    JobError, RecheckReport, ReclassifyReport, Reconciliation, RunDetail, RunStatus, RunSummary,
    reconcile,
};
pub use journal::{Journal, JournalError, MessageRecord, NewRecord};
pub use migrations::{MigrationError, run_migrations};
pub use scheduler::{SchedulerConfig, run_scheduler};
pub use telemetry::{TelemetryError, init_logging};
pub use training::{TrainingDataError, TrainingEmitter};
