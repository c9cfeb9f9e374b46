//! Scripted in-memory backend used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::backend::{LoadedModel, ModelBackend};
use super::types::{GenerationParams, LoadSpec, ModelError};
use crate::family::ModelFamily;

/// What a scripted family does when it is loaded
#[derive(Debug, Clone)]
pub enum Script {
    FailLoad(&'static str),
    FailGenerate(&'static str),
    Reply(&'static str),
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(LoadSpec),
    Generate {
        family: ModelFamily,
        prompt: String,
        params: GenerationParams,
    },
}

/// Backend double that follows a per-family script and records every call.
/// Families without a script fail to load.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<ModelFamily, Script>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, family: ModelFamily, script: Script) -> Self {
        self.scripts.insert(family, script);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loaded_families(&self) -> Vec<ModelFamily> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Load(spec) => Some(spec.family),
                Call::Generate { .. } => None,
            })
            .collect()
    }

    pub fn generate_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Generate { .. }))
            .count()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn load(&self, spec: &LoadSpec) -> Result<Box<dyn LoadedModel>, ModelError> {
        self.calls.lock().unwrap().push(Call::Load(spec.clone()));

        match self.scripts.get(&spec.family) {
            None => Err(ModelError::LoadError(format!(
                "{} is not scripted",
                spec.family
            ))),
            Some(Script::FailLoad(message)) => Err(ModelError::LoadError(message.to_string())),
            Some(script) => Ok(Box::new(ScriptedModel {
                family: spec.family,
                script: script.clone(),
                calls: Arc::clone(&self.calls),
            })),
        }
    }

    fn backend_type(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedModel {
    family: ModelFamily,
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl LoadedModel for ScriptedModel {
    async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(Call::Generate {
            family: self.family,
            prompt: prompt.to_string(),
            params: params.clone(),
        });

        match &self.script {
            Script::Reply(text) => Ok(text.to_string()),
            Script::FailGenerate(message) => Err(ModelError::InferenceError(message.to_string())),
            Script::Hang => std::future::pending().await,
            Script::FailLoad(_) => unreachable!("load failures never produce a model"),
        }
    }
}
