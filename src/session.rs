use crate::index::SampleStore;
use crate::model::ProfileSummary;
use crate::options::SampleProfileOptions;
use crate::parser::SampleProfileReader;

/// Sample profile state of one compilation.
///
/// Created once before any function is compiled and dropped when the
/// compilation ends. Loading never fails the compilation: every error
/// leaves a session with sample profiling disabled.
#[derive(Debug, Clone)]
pub struct ProfileSession {
    options: SampleProfileOptions,
    store: Option<SampleStore>,
    profile_info: Option<ProfileSummary>,
}

impl ProfileSession {
    /// Resolve the options and read the profile if sample profiling is on
    pub fn initialize(mut options: SampleProfileOptions) -> Self {
        options.resolve_conflicts();
        if !options.sample_profile {
            return Self::disabled(options);
        }

        let path = options.profile_path().to_path_buf();
        let store = match SampleProfileReader::read_profile(&path) {
            Ok(store) => store,
            Err(error) => {
                log::warn!("{}", error);
                SampleStore::default()
            }
        };
        Self::with_store(options, store)
    }

    /// Build a session over an already loaded store
    pub fn with_store(mut options: SampleProfileOptions, store: SampleStore) -> Self {
        options.resolve_conflicts();
        if !options.sample_profile {
            return Self::disabled(options);
        }

        if store.num_samples() == 0 {
            log::info!(
                "No available data in the sample file {}. Disable sample profile now.",
                options.profile_path().display()
            );
            options.sample_profile = false;
            return Self::disabled(options);
        }

        log::info!(
            "There are {} samples in file {}.",
            store.num_samples(),
            options.profile_path().display()
        );
        Self {
            options,
            store: Some(store),
            profile_info: None,
        }
    }

    fn disabled(options: SampleProfileOptions) -> Self {
        Self {
            options,
            store: None,
            profile_info: None,
        }
    }

    pub fn options(&self) -> &SampleProfileOptions {
        &self.options
    }

    /// Whether functions should be annotated from samples
    pub fn is_enabled(&self) -> bool {
        self.options.sample_profile && self.store.is_some()
    }

    pub fn store(&self) -> Option<&SampleStore> {
        self.store.as_ref()
    }

    /// Summary published by the last successfully annotated function
    pub fn profile_info(&self) -> Option<&ProfileSummary> {
        self.profile_info.as_ref()
    }

    pub fn publish_summary(&mut self, summary: ProfileSummary) {
        self.profile_info = Some(summary);
    }

    /// Release the profile at the end of the compilation
    pub fn finish(self) {
        if let Some(store) = &self.store {
            log::debug!(
                "Releasing sample profile: {} samples, flat index {:?}, inline index {:?}",
                store.num_samples(),
                store.flat_statistics(),
                store.inline_statistics()
            );
        }
    }
}
