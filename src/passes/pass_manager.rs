use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::annotation::{AnnotationOutcome, AnnotationReport};
use crate::cfg::Function;
use crate::error::{Error, Result};
use crate::session::ProfileSession;

/// Result of running a pass on one function
#[derive(Debug, Clone)]
pub struct PassResult {
    /// Name of the pass
    pub name: String,
    /// Time spent in the pass
    pub duration: Duration,
    /// Whether the pass changed the function's counts
    pub changed: bool,
    /// Annotation outcome, for passes that annotate
    pub report: Option<AnnotationReport>,
}

impl PassResult {
    pub fn unchanged(name: &str) -> Self {
        Self {
            name: name.to_string(),
            duration: Duration::new(0, 0),
            changed: false,
            report: None,
        }
    }
}

/// Statistics from running passes over one or more functions
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    /// Results from each pass run
    pub pass_results: Vec<PassResult>,
    /// Functions whose sample counts were accepted
    pub functions_annotated: usize,
    /// Functions whose sample counts were discarded
    pub functions_rejected: usize,
    /// Total time spent in passes
    pub total_duration: Duration,
}

impl PassStats {
    /// Create a new stats object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pass result
    pub fn add_pass_result(&mut self, result: PassResult) {
        if let Some(report) = &result.report {
            match report.outcome {
                AnnotationOutcome::Smoothed => self.functions_annotated += 1,
                AnnotationOutcome::Rejected => self.functions_rejected += 1,
            }
        }
        self.total_duration += result.duration;
        self.pass_results.push(result);
    }

    /// Fold another stats object into this one
    pub fn merge(&mut self, other: PassStats) {
        for result in other.pass_results {
            self.add_pass_result(result);
        }
    }

    /// Annotation reports of all runs, as a JSON array
    pub fn reports_json(&self) -> Result<String> {
        let reports: Vec<&AnnotationReport> = self
            .pass_results
            .iter()
            .filter_map(|result| result.report.as_ref())
            .collect();
        Ok(serde_json::to_string_pretty(&reports)?)
    }
}

/// A per-function pass of the profiling pipeline
pub trait ProfilePass: Send + Sync {
    /// Name of the pass
    fn name(&self) -> &str;

    /// Whether the pass runs at all for this compilation
    fn gate(&self, session: &ProfileSession) -> bool;

    /// Run the pass on one function
    fn execute(&self, session: &ProfileSession, function: &mut Function) -> Result<PassResult>;

    /// Names of passes that must run before this one
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Runs registered profile passes over functions in dependency order
pub struct PassManager {
    /// Registered passes
    passes: Vec<Box<dyn ProfilePass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Create a pass manager without passes
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Register a pass
    pub fn register_pass(&mut self, pass: Box<dyn ProfilePass>) {
        self.passes.push(pass);
    }

    /// Register the sample annotation pass and the dump pass
    pub fn with_default_passes(mut self) -> Self {
        use crate::passes::profile_dump::ProfileDumpPass;
        use crate::passes::sample_profile::SampleProfilePass;

        self.register_pass(Box::new(SampleProfilePass::default()));
        self.register_pass(Box::new(ProfileDumpPass::new()));
        self
    }

    /// Run every pass on one function
    pub fn run_on_function(&self, session: &mut ProfileSession, function: &mut Function) -> Result<PassStats> {
        let sorted = self.sort_passes_by_dependencies()?;
        let stats = Self::run_sorted(&sorted, session, function)?;
        Self::publish_summaries(session, &stats);
        Ok(stats)
    }

    /// Run every pass on each function in order
    pub fn run_on_functions(&self, session: &mut ProfileSession, functions: &mut [Function]) -> Result<PassStats> {
        let sorted = self.sort_passes_by_dependencies()?;
        let mut stats = PassStats::new();
        for function in functions.iter_mut() {
            let function_stats = Self::run_sorted(&sorted, session, function)?;
            Self::publish_summaries(session, &function_stats);
            stats.merge(function_stats);
        }
        log::debug!(
            "{} functions annotated, {} rejected in {:?}",
            stats.functions_annotated,
            stats.functions_rejected,
            stats.total_duration
        );
        Ok(stats)
    }

    /// Run every pass on all functions in parallel.
    ///
    /// The session is only read while functions are processed; summaries are
    /// published afterwards in function order.
    pub fn par_run_on_functions(&self, session: &mut ProfileSession, functions: &mut [Function]) -> Result<PassStats> {
        let sorted = self.sort_passes_by_dependencies()?;
        let shared: &ProfileSession = session;
        let per_function = functions
            .par_iter_mut()
            .map(|function| Self::run_sorted(&sorted, shared, function))
            .collect::<Result<Vec<_>>>()?;

        let mut stats = PassStats::new();
        for function_stats in per_function {
            Self::publish_summaries(session, &function_stats);
            stats.merge(function_stats);
        }
        Ok(stats)
    }

    fn run_sorted(passes: &[&dyn ProfilePass], session: &ProfileSession, function: &mut Function) -> Result<PassStats> {
        let mut stats = PassStats::new();
        for pass in passes {
            if !pass.gate(session) {
                continue;
            }
            let start = Instant::now();
            let mut result = pass.execute(session, function)?;
            result.duration = start.elapsed();
            stats.add_pass_result(result);
        }
        Ok(stats)
    }

    fn publish_summaries(session: &mut ProfileSession, stats: &PassStats) {
        for result in &stats.pass_results {
            if let Some(summary) = result.report.as_ref().and_then(|report| report.summary) {
                session.publish_summary(summary);
            }
        }
    }

    /// Order passes so that every pass runs after its dependencies
    fn sort_passes_by_dependencies(&self) -> Result<Vec<&dyn ProfilePass>> {
        let pass_map: HashMap<&str, &dyn ProfilePass> = self
            .passes
            .iter()
            .map(|pass| (pass.name(), pass.as_ref()))
            .collect();

        let mut sorted = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();
        for pass in &self.passes {
            Self::dfs_sort(pass.name(), &pass_map, &mut visited, &mut visiting, &mut sorted)?;
        }
        Ok(sorted)
    }

    /// DFS helper for topological sort
    fn dfs_sort<'a>(
        pass_name: &'a str,
        pass_map: &HashMap<&'a str, &'a dyn ProfilePass>,
        visited: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        sorted: &mut Vec<&'a dyn ProfilePass>,
    ) -> Result<()> {
        if visited.contains(pass_name) {
            return Ok(());
        }
        if !visiting.insert(pass_name) {
            return Err(Error::InvalidGraph(format!(
                "Cycle detected in profile pass dependencies: {}",
                pass_name
            )));
        }

        let pass = pass_map[pass_name];
        for dep in pass.dependencies() {
            let Some((&dep_name, _)) = pass_map.get_key_value(dep) else {
                return Err(Error::InvalidGraph(format!(
                    "Profile pass '{}' depends on '{}', which is not registered",
                    pass_name, dep
                )));
            };
            Self::dfs_sort(dep_name, pass_map, visited, visiting, sorted)?;
        }

        visiting.remove(pass_name);
        visited.insert(pass_name);
        sorted.push(pass);
        Ok(())
    }
}
