//! Creative generation workflow.
//!
//! A run is a small state machine over [`WorkflowState`]. After every step the
//! transition function [`next_node`] inspects the state and picks the next
//! node; each node returns a [`StepUpdate`] that [`WorkflowState::apply`]
//! merges field by field. Nodes never return errors: remote failures become
//! data in the update, so a run always ends with a structured outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bfl::{wait_for_result, ImageGenerator, WaitPolicy};
use crate::error::{ErrorState, WorkflowError};
use crate::models::{AdCopy, Creative, CreativeRequest, JobState, Options, Persona, Product, Profile};
use crate::openai::CopyGenerator;
use crate::{persona, prompt};

/// Upper bound on transitions; a run visits each node at most once.
const MAX_TRANSITIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Start,
    InferPersona,
    GenerateImage,
    GenerateCopy,
    Error,
    End,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Image job submitted but not awaited; the creative carries the fallback image.
    Pending,
    Success,
    Fallback,
    Error,
}

/// Partial creative produced by one step. `None` fields leave the target untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreativeUpdate {
    pub image_url: Option<String>,
    pub copy: Option<AdCopy>,
    pub persona: Option<Persona>,
    pub color_palette: Option<Vec<String>>,
    pub image_prompt: Option<String>,
    pub polling_url: Option<String>,
    pub request_id: Option<String>,
    pub job_state: Option<JobState>,
}

impl Creative {
    pub fn merge(&mut self, update: CreativeUpdate) {
        fn keep<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        keep(&mut self.image_url, update.image_url);
        keep(&mut self.copy, update.copy);
        keep(&mut self.persona, update.persona);
        keep(&mut self.image_prompt, update.image_prompt);
        keep(&mut self.polling_url, update.polling_url);
        keep(&mut self.request_id, update.request_id);
        keep(&mut self.job_state, update.job_state);
        if let Some(palette) = update.color_palette {
            self.color_palette = palette;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepUpdate {
    pub persona: Option<Persona>,
    pub creative: Option<CreativeUpdate>,
    pub error: Option<ErrorState>,
    /// Non-fatal failure that degraded the result.
    pub degraded: Option<ErrorState>,
    pub status: Option<WorkflowStatus>,
    pub warnings: Vec<String>,
}

impl StepUpdate {
    fn failed(err: &WorkflowError) -> Self {
        Self { error: Some(ErrorState::from(err)), ..Default::default() }
    }
}

/// Mutable record owned by a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub persona: Option<Persona>,
    pub creative: Option<Creative>,
    pub error: Option<ErrorState>,
    pub degraded: Option<ErrorState>,
    pub status: Option<WorkflowStatus>,
    pub warnings: Vec<String>,
}

impl WorkflowState {
    /// Merges a step's output. Fields already set are only replaced by new values, never cleared.
    pub fn apply(&mut self, update: StepUpdate) {
        if update.persona.is_some() {
            self.persona = update.persona;
        }
        if let Some(creative) = update.creative {
            self.creative.get_or_insert_with(Creative::default).merge(creative);
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if update.degraded.is_some() {
            self.degraded = update.degraded;
        }
        if update.status.is_some() {
            self.status = update.status;
        }
        self.warnings.extend(update.warnings);
    }
}

/// Picks the next node from the current state.
pub fn next_node(state: &WorkflowState) -> Node {
    if state.error.is_some() {
        Node::Error
    } else if state.persona.is_none() {
        Node::InferPersona
    } else if state.creative.is_none() {
        Node::GenerateImage
    } else if state.creative.as_ref().is_some_and(|c| c.copy.is_none()) {
        Node::GenerateCopy
    } else {
        Node::End
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub submit_timeout: Duration,
    pub copy_timeout: Duration,
    /// Block until the image job finishes instead of returning a pending creative.
    pub wait_for_image: bool,
    pub wait: WaitPolicy,
    pub default_tone: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(45),
            copy_timeout: Duration::from_secs(15),
            wait_for_image: true,
            wait: WaitPolicy::default(),
            default_tone: "friendly".to_string(),
        }
    }
}

/// Result handed back to callers.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorkflowOutcome {
    pub invocation_id: Uuid,
    pub success: bool,
    pub status: WorkflowStatus,
    pub persona: Option<Persona>,
    pub creative: Option<Creative>,
    pub error: Option<ErrorState>,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl WorkflowOutcome {
    /// Outcome for a request that never reached the workflow, such as a body that failed to decode.
    pub fn rejected(err: &WorkflowError) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            success: false,
            status: WorkflowStatus::Error,
            persona: None,
            creative: None,
            error: Some(ErrorState::from(err)),
            warnings: Vec::new(),
            generated_at: Utc::now(),
        }
    }
}

struct Inputs<'a> {
    profile: Option<&'a Profile>,
    product: Option<&'a Product>,
    options: &'a Options,
}

pub struct CreativeWorkflow {
    images: Arc<dyn ImageGenerator>,
    copy: Arc<dyn CopyGenerator>,
    settings: WorkflowSettings,
}

impl CreativeWorkflow {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        copy: Arc<dyn CopyGenerator>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { images, copy, settings }
    }

    pub fn images(&self) -> &Arc<dyn ImageGenerator> {
        &self.images
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub async fn run(&self, request: CreativeRequest) -> WorkflowOutcome {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("workflow", %invocation_id);
        self.run_inner(invocation_id, request).instrument(span).await
    }

    async fn run_inner(&self, invocation_id: Uuid, request: CreativeRequest) -> WorkflowOutcome {
        let options = request.options.clone().unwrap_or_default();
        let inputs = Inputs {
            profile: request.profile.as_ref(),
            product: request.product.as_ref(),
            options: &options,
        };

        let mut state = WorkflowState::default();
        let mut node = Node::Start;
        let mut transitions = 0;

        loop {
            let next = next_node(&state);
            debug!(from = ?node, to = ?next, "transition");
            node = next;

            let update = match node {
                Node::InferPersona => infer_persona(&inputs),
                Node::GenerateImage => self.generate_image(&state, &inputs).await,
                Node::GenerateCopy => self.generate_copy(&state, &inputs).await,
                Node::Error => {
                    if let Some(err) = &state.error {
                        error!(kind = ?err.kind, "❌ Workflow stopped: {}", err.message);
                    }
                    break;
                }
                Node::Start | Node::End => break,
            };
            state.apply(update);

            transitions += 1;
            if transitions >= MAX_TRANSITIONS && state.error.is_none() {
                state.apply(StepUpdate::failed(&WorkflowError::Stalled(transitions)));
            }
        }

        finish(invocation_id, state)
    }

    async fn generate_image(&self, state: &WorkflowState, inputs: &Inputs<'_>) -> StepUpdate {
        let (Some(persona), Some(profile), Some(product)) =
            (state.persona, inputs.profile, inputs.product)
        else {
            return StepUpdate::failed(&WorkflowError::MissingInput("persona"));
        };

        let image_prompt = prompt::build_image_prompt(persona, product, profile);
        let (width, height) = inputs.options.aspect.dimensions();
        info!(%persona, width, height, "🎯 Generating image with prompt: {}", image_prompt);

        let base = CreativeUpdate {
            persona: Some(persona),
            color_palette: Some(product.colorways.clone()),
            image_prompt: Some(image_prompt.clone()),
            ..Default::default()
        };
        let fallback_url = inputs.options.fallback_image_url.clone();

        let mut job = match self
            .images
            .submit(&image_prompt, width, height, self.settings.submit_timeout)
            .await
        {
            Ok(job) => job,
            Err(e) => return degrade_to_fallback(base, fallback_url, WorkflowError::Image(e)),
        };

        let base = CreativeUpdate {
            request_id: Some(job.request_id.clone()),
            polling_url: job.polling_url.clone(),
            job_state: Some(job.state),
            ..base
        };

        if !self.settings.wait_for_image {
            info!(request_id = %job.request_id, "🔄 Image job submitted, returning pending creative");
            return StepUpdate {
                creative: Some(CreativeUpdate { image_url: Some(fallback_url), ..base }),
                status: Some(WorkflowStatus::Pending),
                ..Default::default()
            };
        }

        let waited = wait_for_result(self.images.as_ref(), &mut job, self.settings.wait).await;
        let base = CreativeUpdate { job_state: Some(job.state), ..base };
        match waited {
            Ok(url) => {
                info!(request_id = %job.request_id, "✅ Image generated");
                StepUpdate {
                    creative: Some(CreativeUpdate { image_url: Some(url), ..base }),
                    ..Default::default()
                }
            }
            Err(e) => degrade_to_fallback(base, fallback_url, WorkflowError::Image(e)),
        }
    }

    async fn generate_copy(&self, state: &WorkflowState, inputs: &Inputs<'_>) -> StepUpdate {
        let (Some(persona), Some(profile), Some(product)) =
            (state.persona, inputs.profile, inputs.product)
        else {
            return StepUpdate::failed(&WorkflowError::MissingInput("persona"));
        };

        let tone = inputs
            .options
            .copy_tone
            .as_deref()
            .or(profile.copy_tone.as_deref())
            .unwrap_or(self.settings.default_tone.as_str());

        match self
            .copy
            .generate(product, persona, profile, tone, self.settings.copy_timeout)
            .await
        {
            Ok(copy) => {
                info!(subject = %copy.subject, "📝 Copy generated");
                StepUpdate {
                    creative: Some(CreativeUpdate { copy: Some(copy), ..Default::default() }),
                    ..Default::default()
                }
            }
            Err(e) => {
                let err = WorkflowError::Copy(e);
                warn!("⚠️ {}, leaving copy empty", err);
                StepUpdate {
                    creative: Some(CreativeUpdate {
                        copy: Some(AdCopy::default()),
                        ..Default::default()
                    }),
                    warnings: vec![err.to_string()],
                    ..Default::default()
                }
            }
        }
    }
}

fn infer_persona(inputs: &Inputs<'_>) -> StepUpdate {
    let (profile, product) = match (inputs.profile, inputs.product) {
        (Some(profile), Some(product)) => (profile, product),
        (None, _) => return StepUpdate::failed(&WorkflowError::MissingInput("profile")),
        (_, None) => return StepUpdate::failed(&WorkflowError::MissingInput("product")),
    };

    let persona = persona::classify(profile, product);
    info!(%persona, contact_id = %profile.contact_id, "👤 Persona inferred");
    StepUpdate { persona: Some(persona), ..Default::default() }
}

fn degrade_to_fallback(base: CreativeUpdate, fallback_url: String, err: WorkflowError) -> StepUpdate {
    warn!("⚠️ {}, using fallback image {}", err, fallback_url);
    StepUpdate {
        creative: Some(CreativeUpdate { image_url: Some(fallback_url), ..base }),
        degraded: Some(ErrorState::from(&err)),
        status: Some(WorkflowStatus::Fallback),
        warnings: vec![err.to_string()],
        ..Default::default()
    }
}

fn finish(invocation_id: Uuid, state: WorkflowState) -> WorkflowOutcome {
    let WorkflowState { persona, creative, error, degraded, status, warnings } = state;

    let status = if error.is_some() {
        WorkflowStatus::Error
    } else {
        status.unwrap_or(WorkflowStatus::Success)
    };
    let creative = match status {
        WorkflowStatus::Error => creative.filter(Creative::is_usable),
        _ => creative,
    };

    info!(?status, warnings = warnings.len(), "🏁 Workflow finished");
    WorkflowOutcome {
        invocation_id,
        success: status != WorkflowStatus::Error,
        status,
        persona,
        creative,
        error: error.or(degraded),
        warnings,
        generated_at: Utc::now(),
    }
}
