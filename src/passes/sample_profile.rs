use crate::annotation::{AnnotationOutcome, CfgAnnotator};
use crate::cfg::Function;
use crate::error::Result;
use crate::passes::pass_manager::{PassResult, ProfilePass};
use crate::session::ProfileSession;
use crate::smoothing::{
    EdgeDerivationSmoother, FlowSmoother, ProbabilityEstimator, UniformProbabilityEstimator,
};

/// Annotates each function's CFG from the sample profile
pub struct SampleProfilePass {
    name: String,
    smoother: Box<dyn FlowSmoother>,
    estimator: Box<dyn ProbabilityEstimator>,
}

impl Default for SampleProfilePass {
    fn default() -> Self {
        Self::new(
            Box::new(EdgeDerivationSmoother),
            Box::new(UniformProbabilityEstimator),
        )
    }
}

impl SampleProfilePass {
    /// Create the pass with the host's flow smoother and static estimator
    pub fn new(smoother: Box<dyn FlowSmoother>, estimator: Box<dyn ProbabilityEstimator>) -> Self {
        Self {
            name: "sample_profile".to_string(),
            smoother,
            estimator,
        }
    }
}

impl ProfilePass for SampleProfilePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn gate(&self, session: &ProfileSession) -> bool {
        session.is_enabled()
    }

    fn execute(&self, session: &ProfileSession, function: &mut Function) -> Result<PassResult> {
        let Some(store) = session.store() else {
            return Ok(PassResult::unchanged(&self.name));
        };

        let annotator = CfgAnnotator::new(store, self.smoother.as_ref(), self.estimator.as_ref());
        match annotator.execute(function) {
            Ok(report) => Ok(PassResult {
                changed: report.outcome == AnnotationOutcome::Smoothed,
                report: Some(report),
                ..PassResult::unchanged(&self.name)
            }),
            Err(error) => {
                log::warn!(
                    "Sample profile annotation of {} failed, counts discarded: {}",
                    function.name,
                    error
                );
                Ok(PassResult::unchanged(&self.name))
            }
        }
    }
}
