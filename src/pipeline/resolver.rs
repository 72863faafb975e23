//! Turns a classification into forward destinations.
//!
//! Pure function of the classification and the registry:
//! - unknown or disabled categories are dropped silently
//! - flat lists emit every address
//! - project maps match normalized project names, else fall back to `default`
//! - addresses are deduplicated first-seen-wins, order preserved

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::pipeline::registry::{CategoryRegistry, TargetSpec, normalize_project_name};
use crate::pipeline::types::{ClassificationResult, RoutingTarget};

/// Resolves forward targets against an immutable category registry.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    registry: Arc<CategoryRegistry>,
}

impl TargetResolver {
    pub fn new(registry: Arc<CategoryRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve the deduplicated, ordered list of targets for a classification.
    ///
    /// An empty result means "nothing to forward", never an error.
    pub fn resolve(&self, classification: &ClassificationResult) -> Vec<RoutingTarget> {
        let priority = classification.priority;
        let normalized_projects: Vec<String> = classification
            .project_names
            .iter()
            .map(|p| normalize_project_name(p))
            .filter(|p| !p.is_empty())
            .collect();

        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for name in &classification.categories {
            let Some(category) = self.registry.get_enabled(name) else {
                debug!(category = %name, "Skipping unknown or disabled category");
                continue;
            };

            let addresses = match &category.targets {
                TargetSpec::FlatList(addresses) => addresses.iter().collect::<Vec<_>>(),
                TargetSpec::ProjectMap { projects, default } => {
                    let matched: Vec<&String> = normalized_projects
                        .iter()
                        .filter_map(|project| projects.get(project))
                        .flatten()
                        .collect();
                    if !matched.is_empty() {
                        matched
                    } else if let Some(default) = default {
                        debug!(
                            category = %category.name,
                            projects = ?classification.project_names,
                            "No project route matched, using default"
                        );
                        default.iter().collect()
                    } else {
                        debug!(
                            category = %category.name,
                            "No project route matched and no default configured"
                        );
                        Vec::new()
                    }
                }
            };

            for address in addresses {
                if seen.insert(address.to_lowercase()) {
                    targets.push(RoutingTarget::new(address.clone(), priority));
                }
            }
        }

        targets
    }
}
