//! Retry orchestrator.
//!
//! One attempt walks `Invoking -> Extracting -> Validating`. Any gate
//! failing makes the attempt a retryable failure; the next attempt starts
//! over with a fresh oracle call on the same prompt after a fixed delay.
//! Nothing from a failed attempt is carried into the next one. When the
//! attempt budget is spent the run ends with `ExhaustedRetries` holding the
//! last failure.

use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::error::{AttemptError, VpgmError};
use crate::extract::parse_reply;
use crate::oracle::{Oracle, OracleParams};
use crate::prompt::compile_prompt;
use crate::skeleton::Skeleton;
use crate::template::{Template, TemplateDocument};
use crate::validate::{Instance, DEFAULT_TOLERANCE};

/// Attempt budget and fixed inter-attempt delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Where an attempt currently is. The payload is the previous gate's output.
enum Step {
    Invoking,
    Extracting(String),
    Validating(Value),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Invoking => "invoking",
            Step::Extracting(_) => "extracting",
            Step::Validating(_) => "validating",
        }
    }
}

/// Drives compile -> (invoke -> extract -> validate)* for one oracle.
pub struct Orchestrator<'a> {
    oracle: &'a dyn Oracle,
    params: OracleParams,
    policy: RetryPolicy,
    tolerance: f64,
}

impl<'a> Orchestrator<'a> {
    pub fn new(oracle: &'a dyn Oracle, params: OracleParams) -> Self {
        Self {
            oracle,
            params,
            policy: RetryPolicy::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolve `template_id` and run. An unknown id fails before any oracle call.
    pub fn infer(
        &self,
        templates: &TemplateDocument,
        template_id: &str,
        skeleton: &Skeleton,
    ) -> Result<Instance, VpgmError> {
        let template = templates.resolve(template_id)?;
        self.run(skeleton, template)
    }

    /// Run the bounded retry loop for one skeleton.
    pub fn run(&self, skeleton: &Skeleton, template: &Template) -> Result<Instance, VpgmError> {
        let prompt = compile_prompt(skeleton, template);
        let max_attempts = self.policy.effective_max_attempts();
        let question = skeleton.question_meta.scienceqa_id.as_str();

        debug!(
            "Compiled prompt for {} ({} chars, template {})",
            question,
            prompt.len(),
            skeleton.template_id
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&prompt, template) {
                Ok(instance) => {
                    info!(
                        "vPGM inference for {} succeeded on attempt {}/{} (selected: {})",
                        question,
                        attempt,
                        max_attempts,
                        instance.selected_answer()
                    );
                    return Ok(instance);
                }
                Err(last) if attempt >= max_attempts => {
                    warn!(
                        "vPGM inference for {} exhausted {} attempts, last {} error: {}",
                        question,
                        attempt,
                        last.kind(),
                        last
                    );
                    return Err(VpgmError::ExhaustedRetries {
                        attempts: attempt,
                        last,
                    });
                }
                Err(e) => {
                    debug!(
                        "Attempt {}/{} for {} failed ({}): {}",
                        attempt,
                        max_attempts,
                        question,
                        e.kind(),
                        e
                    );
                    if !self.policy.backoff.is_zero() {
                        thread::sleep(self.policy.backoff);
                    }
                }
            }
        }
    }

    /// Run every skeleton in order; the first unrecoverable one fails the batch.
    pub fn run_batch(&self, skeletons: &[Skeleton], template: &Template) -> Result<Vec<Instance>, VpgmError> {
        let mut results = Vec::with_capacity(skeletons.len());
        for (i, skeleton) in skeletons.iter().enumerate() {
            match self.run(skeleton, template) {
                Ok(instance) => results.push(instance),
                Err(e) => {
                    warn!("Batch stopped at item {} of {}: {}", i + 1, skeletons.len(), e);
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    fn attempt(&self, prompt: &str, template: &Template) -> Result<Instance, AttemptError> {
        let mut step = Step::Invoking;
        loop {
            trace!("attempt state: {}", step.name());
            step = match step {
                Step::Invoking => Step::Extracting(self.oracle.invoke(prompt, &self.params)?),
                Step::Extracting(raw) => Step::Validating(parse_reply(&raw)?),
                Step::Validating(value) => {
                    return Ok(Instance::validate(value, template, self.tolerance)?);
                }
            };
        }
    }
}
