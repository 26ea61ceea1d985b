//! vPGM Common - verbalized probabilistic graphical model inference core.
//!
//! Compiles a question skeleton and a declarative template into a prompt,
//! asks an external language model (the oracle) to fill in latent and answer
//! posteriors, and accepts the reply only if it is well-formed JSON that
//! matches the template and whose distributions are valid. No inference is
//! computed locally; the oracle's output is checked, never produced.

pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod oracle;
pub mod orchestrator;
pub mod prompt;
pub mod schemas;
pub mod skeleton;
pub mod template;
pub mod validate;

pub use config::Config;
pub use dataset::{Dataset, QuestionRecord};
pub use error::{AttemptError, ConfigError, NotFoundError, VpgmError};
pub use extract::{extract_json, parse_reply, ExtractionError};
pub use oracle::{FakeOracle, HttpOracle, Oracle, OracleBackend, OracleError, OracleParams};
pub use orchestrator::{Orchestrator, RetryPolicy};
pub use prompt::compile_prompt;
pub use schemas::*;
pub use skeleton::{Observed, QuestionMeta, Skeleton};
pub use template::{Template, TemplateDocument, DEFAULT_TEMPLATE_ID};
pub use validate::{
    validate_distribution, validate_instance, DistributionError, Instance, ValidationError,
    DEFAULT_TOLERANCE,
};
