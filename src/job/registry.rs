//! Job type registry.
//!
//! Maps a descriptor job-type name to a constructor. Populated with the
//! built-in job types at process start; embedders can register additional
//! types before assembling a pipeline.

use std::collections::BTreeMap;

use crate::job::initramfs::InitramfsJob;
use crate::job::Job;

pub type JobConstructor = fn() -> Box<dyn Job>;

pub struct JobRegistry {
    constructors: BTreeMap<&'static str, JobConstructor>,
}

impl JobRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with all built-in job types.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("initramfs", || Box::new(InitramfsJob::new()));
        registry
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &'static str, constructor: JobConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Instantiate a fresh, unconfigured job of type `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn Job>> {
        self.constructors.get(name).map(|constructor| constructor())
    }

    /// Registered type names, sorted.
    pub fn job_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_initramfs() {
        let registry = JobRegistry::builtin();
        let job = registry.create("initramfs").unwrap();
        assert_eq!(job.name(), "initramfs");
    }

    #[test]
    fn unknown_type_yields_none() {
        assert!(JobRegistry::builtin().create("partition").is_none());
    }

    #[test]
    fn job_types_are_sorted() {
        let mut registry = JobRegistry::builtin();
        registry.register("bootloader", || Box::new(InitramfsJob::new()));
        let names: Vec<_> = registry.job_types().collect();
        assert_eq!(names, vec!["bootloader", "initramfs"]);
    }

    #[test]
    fn each_create_returns_a_fresh_instance() {
        let registry = JobRegistry::builtin();
        let first = registry.create("initramfs").unwrap();
        let second = registry.create("initramfs").unwrap();
        // Unconfigured instances display the generic template.
        assert_eq!(first.pretty_name(), second.pretty_name());
    }
}
