//! Fixed-order staged pipelines
//!
//! A pipeline is a fixed sequence of named stages. Command-line flags select
//! a subset; selection never reorders, and an empty selection means every
//! stage. Each [`Step`] pairs a stage with the function that runs it and an
//! optional artifact check that runs whenever the stage, or any enabled stage
//! that consumes its output, is part of the run.

use crate::error::{Error, ErrorCode, Result};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info};

/// What a stage touches when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Invokes external tools
    RunsTools,
    /// Creates or rewrites files
    WritesFiles,
    /// Moves or deletes files and directories
    MovesFiles,
    /// Talks to the network
    Network,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Effect::RunsTools => "runs tools",
            Effect::WritesFiles => "writes files",
            Effect::MovesFiles => "moves files",
            Effect::Network => "network",
        };
        f.write_str(s)
    }
}

/// A stage identifier in a fixed pipeline order
pub trait Stage: Copy + Eq + fmt::Debug + 'static {
    /// Every stage, in execution order
    const ORDER: &'static [Self];

    /// Flag name (`--<name>`)
    fn name(self) -> &'static str;

    /// One-line help text
    fn description(self) -> &'static str;

    /// Stages whose output this stage consumes
    fn depends_on(self) -> &'static [Self] {
        &[]
    }

    /// Declared side effects
    fn effects(self) -> &'static [Effect] {
        &[]
    }

    /// Stage called `name`, if any
    fn from_name(name: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|s| s.name() == name)
    }

    /// Index in [`Stage::ORDER`]
    fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or(usize::MAX)
    }
}

/// Enablement vector over a stage order
#[derive(Clone, PartialEq, Eq)]
pub struct Selection<S: Stage> {
    enabled: Vec<bool>,
    _stage: PhantomData<S>,
}

impl<S: Stage> Selection<S> {
    /// Every stage enabled
    pub fn all() -> Self {
        Self {
            enabled: vec![true; S::ORDER.len()],
            _stage: PhantomData,
        }
    }

    /// No stage enabled
    pub fn none() -> Self {
        Self {
            enabled: vec![false; S::ORDER.len()],
            _stage: PhantomData,
        }
    }

    /// Build from flag names; no names means a full run
    pub fn from_names<I, N>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut selection = Self::none();
        let mut any = false;
        for name in names {
            let name = name.as_ref().trim_start_matches("--").to_lowercase();
            let stage = S::from_name(&name).ok_or_else(|| {
                Error::new(ErrorCode::UnknownStage, format!("{} not a valid step", name))
                    .with_suggestion(format!(
                        "Valid steps are: {}",
                        S::ORDER.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
                    ))
            })?;
            selection.enable(stage);
            any = true;
        }
        Ok(if any { selection } else { Self::all() })
    }

    /// Build from explicit stages; an empty list means a full run
    pub fn from_stages(stages: &[S]) -> Self {
        if stages.is_empty() {
            return Self::all();
        }
        let mut selection = Self::none();
        for stage in stages {
            selection.enable(*stage);
        }
        selection
    }

    pub fn enable(&mut self, stage: S) {
        if let Some(slot) = self.enabled.get_mut(stage.position()) {
            *slot = true;
        }
    }

    pub fn disable(&mut self, stage: S) {
        if let Some(slot) = self.enabled.get_mut(stage.position()) {
            *slot = false;
        }
    }

    pub fn is_enabled(&self, stage: S) -> bool {
        self.enabled.get(stage.position()).copied().unwrap_or(false)
    }

    /// Whether every stage is enabled
    pub fn is_full(&self) -> bool {
        self.enabled.iter().all(|e| *e)
    }

    /// Enabled stages in pipeline order
    pub fn stages(&self) -> Vec<S> {
        S::ORDER
            .iter()
            .copied()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    /// Whether the output of `stage` must exist after its slot
    ///
    /// True when the stage itself runs or any enabled stage consumes it.
    pub fn needs_output_of(&self, stage: S) -> bool {
        self.is_enabled(stage)
            || S::ORDER
                .iter()
                .any(|t| self.is_enabled(*t) && t.depends_on().contains(&stage))
    }
}

impl<S: Stage> fmt::Debug for Selection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages()).finish()
    }
}

/// Function executing a stage against an immutable context
pub type StageFn<C> = fn(&C) -> Result<()>;

/// A stage bound to its implementation
pub struct Step<S, C: ?Sized> {
    pub stage: S,
    pub run: StageFn<C>,
    pub verify: Option<StageFn<C>>,
}

impl<S: Stage, C: ?Sized> Step<S, C> {
    pub fn new(stage: S, run: StageFn<C>) -> Self {
        Self {
            stage,
            run,
            verify: None,
        }
    }

    /// Attach the check validating this stage's output artifact
    pub fn verified_by(mut self, verify: StageFn<C>) -> Self {
        self.verify = Some(verify);
        self
    }
}

/// An ordered list of steps
pub struct Pipeline<S, C: ?Sized> {
    steps: Vec<Step<S, C>>,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport<S> {
    pub executed: Vec<S>,
    pub verified: Vec<S>,
}

impl<S> Default for RunReport<S> {
    fn default() -> Self {
        Self {
            executed: Vec::new(),
            verified: Vec::new(),
        }
    }
}

impl<S: Stage, C: ?Sized> Pipeline<S, C> {
    /// Steps are kept in the stage order regardless of the order given
    pub fn new(mut steps: Vec<Step<S, C>>) -> Self {
        steps.sort_by_key(|s| s.stage.position());
        Self { steps }
    }

    pub fn stages(&self) -> impl Iterator<Item = S> + '_ {
        self.steps.iter().map(|s| s.stage)
    }

    /// Run the selected steps, stopping at the first failure
    pub fn run(&self, selection: &Selection<S>, ctx: &C) -> Result<RunReport<S>> {
        self.run_observed(selection, ctx, |_, _, _| {})
    }

    /// Run, calling `observe(index, total, stage)` before each executed step
    pub fn run_observed<F>(
        &self,
        selection: &Selection<S>,
        ctx: &C,
        mut observe: F,
    ) -> Result<RunReport<S>>
    where
        F: FnMut(usize, usize, S),
    {
        let total = self
            .steps
            .iter()
            .filter(|s| selection.is_enabled(s.stage))
            .count();
        let mut report = RunReport::default();
        debug!(stages = total, full = selection.is_full(), "pipeline selection");

        for step in &self.steps {
            if selection.is_enabled(step.stage) {
                observe(report.executed.len() + 1, total, step.stage);
                info!(stage = step.stage.name(), "running stage");
                (step.run)(ctx)
                    .map_err(|e| e.with_context(format!("step `{}`", step.stage.name())))?;
                report.executed.push(step.stage);
            }

            if let Some(verify) = step.verify {
                if selection.needs_output_of(step.stage) {
                    debug!(stage = step.stage.name(), "verifying stage output");
                    verify(ctx)?;
                    report.verified.push(step.stage);
                }
            }
        }

        Ok(report)
    }
}

/// Human-readable plan: one line per enabled stage with its effects
pub fn describe_plan<S: Stage>(selection: &Selection<S>) -> Vec<String> {
    selection
        .stages()
        .into_iter()
        .map(|s| {
            let effects = s
                .effects()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            if effects.is_empty() {
                format!("{:<10} {}", s.name(), s.description())
            } else {
                format!("{:<10} {} ({})", s.name(), s.description(), effects)
            }
        })
        .collect()
}
