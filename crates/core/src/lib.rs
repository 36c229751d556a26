pub mod accounts;
pub mod artifact;
pub mod auth;
pub mod backend;
pub mod batch;
pub mod config;
mod db;
pub mod engine;
pub mod intake;
pub mod job;
pub mod metrics;
pub mod quota;
pub mod testing;

pub use accounts::{Account, AccountStore, Entitlement, SqliteAccountStore, Tier, TrialWindow};
pub use artifact::{ArtifactConfig, ArtifactStore, FsArtifactStore, InputStaging};
pub use auth::{
    create_resolver, AuthError, AuthRequest, Identity, IdentityKind, IdentityResolver,
};
pub use backend::{Backend, BackendSet, OutputFormat};
pub use batch::{Batch, BatchStore, SqliteBatchStore};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use engine::{ConversionEngine, EngineDeps, EngineError};
pub use intake::{IntakeConfig, IntakeValidator, ValidationError};
pub use job::{ConversionJob, JobState, JobStore, SqliteJobStore};
pub use quota::{QuotaConfig, QuotaLedger, SqliteQuotaLedger};
