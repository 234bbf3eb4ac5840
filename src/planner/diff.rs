//! Diff engine for comparing desired vs observed stack state.
//!
//! This module computes, per managed container and volume, the difference
//! between the declaration and the last snapshot read from the control
//! plane, and the partial service patch that closes it.

use std::collections::BTreeMap;
use tracing::debug;

use crate::api::{ObservedService, ServicePatch, StackSnapshot};
use crate::config::{ConfigHasher, ContainerSpec, DesiredStack, Mount, PortMapping, StackOwnership};
use crate::error::ContainerFailure;

use super::scope::ManagedScope;

/// Registry prefixes the control plane adds to images on its own.
const IMPLICIT_IMAGE_PREFIXES: &[&str] = &["docker.io/", "library/"];

/// Engine for computing diffs between desired and observed states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Kind of remote entry a diff applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A stack service.
    Service,
    /// A stack volume.
    Volume,
}

/// Difference for a single service or volume.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Logical name.
    pub name: String,
    /// What the entry is.
    pub kind: ResourceKind,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Per-field details.
    pub details: Vec<DiffDetail>,
    /// Fields to send for a created or updated service.
    pub patch: Option<ServicePatch>,
    /// Hash of the desired container, if any.
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Entry needs to be created.
    Create,
    /// Entry needs an in-place update.
    Update,
    /// Entry needs to be removed.
    Remove,
    /// Entry is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Observed value.
    pub old_value: Option<String>,
    /// Desired value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All diffs, services before volumes.
    pub diffs: Vec<ResourceDiff>,
    /// Containers that could not be diffed.
    pub failures: Vec<ContainerFailure>,
}

/// Desired ports and mounts in their canonical, sorted form.
struct Canonical {
    ports: Vec<String>,
    mounts: Vec<String>,
}

/// Strips registry prefixes the control plane adds implicitly.
///
/// `docker.io/library/nginx:latest`, `library/nginx:latest` and
/// `nginx:latest` all compare equal.
#[must_use]
pub fn normalize_image(image: &str) -> &str {
    let mut image = image.trim();
    for prefix in IMPLICIT_IMAGE_PREFIXES {
        if let Some(rest) = image.strip_prefix(prefix) {
            image = rest;
        }
    }
    image
}

/// Canonicalizes observed ports. Values the server reports in a form we do
/// not understand are compared verbatim.
fn canonical_observed_ports(ports: &[String]) -> Vec<String> {
    let mut ports: Vec<String> = ports
        .iter()
        .map(|p| PortMapping::parse(p).map_or_else(|_| p.clone(), |m| m.to_string()))
        .collect();
    ports.sort();
    ports.dedup();
    ports
}

fn canonical_observed_mounts(mounts: &[String]) -> Vec<String> {
    let mut mounts: Vec<String> = mounts
        .iter()
        .map(|m| Mount::parse(m).map_or_else(|_| m.clone(), |parsed| parsed.to_string()))
        .collect();
    mounts.sort();
    mounts.dedup();
    mounts
}

fn render_list(list: &[String]) -> String {
    format!("[{}]", list.join(", "))
}

fn render_env_keys(env: &BTreeMap<String, String>) -> String {
    render_list(&env.keys().cloned().collect::<Vec<_>>())
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between a desired stack and a scoped snapshot.
    ///
    /// Every container is diffed even after a failure so that all build
    /// problems are reported together.
    #[must_use]
    pub fn compute_diff(
        &self,
        scope: &ManagedScope,
        desired: &DesiredStack,
        observed: &StackSnapshot,
    ) -> DiffResult {
        let mut result = DiffResult::default();

        for (name, spec) in &desired.containers {
            match self.diff_container(name, spec, observed.service(name), scope.ownership(), desired) {
                Ok(diff) => result.diffs.push(diff),
                Err(mut failures) => result.failures.append(&mut failures),
            }
        }

        if scope.ownership() == StackOwnership::Exclusive {
            for service in &observed.services {
                if !desired.containers.contains_key(&service.service_name) {
                    debug!("Service {} is not declared, removing", service.service_name);
                    result.diffs.push(ResourceDiff {
                        name: service.service_name.clone(),
                        kind: ResourceKind::Service,
                        diff_type: DiffType::Remove,
                        details: vec![],
                        patch: None,
                        new_hash: None,
                    });
                }
            }
        }

        for name in desired.volumes.keys() {
            let diff_type = if observed.has_volume(name) {
                DiffType::NoChange
            } else {
                DiffType::Create
            };
            result.diffs.push(ResourceDiff {
                name: name.clone(),
                kind: ResourceKind::Volume,
                diff_type,
                details: vec![],
                patch: None,
                new_hash: None,
            });
        }

        if scope.ownership() == StackOwnership::Exclusive {
            for volume in &observed.volumes {
                if !desired.volumes.contains_key(&volume.name) {
                    result.diffs.push(ResourceDiff {
                        name: volume.name.clone(),
                        kind: ResourceKind::Volume,
                        diff_type: DiffType::Remove,
                        details: vec![],
                        patch: None,
                        new_hash: None,
                    });
                }
            }
        }

        result
    }

    /// Diffs a single container against its observed counterpart.
    ///
    /// # Errors
    ///
    /// Returns every build failure found for this container.
    pub fn diff_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
        observed: Option<&ObservedService>,
        ownership: StackOwnership,
        desired: &DesiredStack,
    ) -> std::result::Result<ResourceDiff, Vec<ContainerFailure>> {
        let canonical = Self::canonicalize(name, spec, ownership, desired)?;
        let new_hash = Some(self.hasher.hash_container(spec));

        let (diff_type, patch, details) = match observed {
            None => {
                debug!("Service {name} needs to be created");
                let (patch, details) = Self::create_patch(spec, canonical);
                (DiffType::Create, patch, details)
            }
            Some(observed) => {
                let (patch, details) = Self::update_patch(spec, canonical, observed);
                if patch.is_empty() {
                    debug!("Service {name} is up to date");
                    (DiffType::NoChange, patch, details)
                } else {
                    debug!("Service {name} needs update ({})", patch.changed_fields().join(", "));
                    (DiffType::Update, patch, details)
                }
            }
        };

        Ok(ResourceDiff {
            name: name.to_string(),
            kind: ResourceKind::Service,
            diff_type,
            details,
            patch: (diff_type != DiffType::NoChange).then_some(patch),
            new_hash,
        })
    }

    /// Validates a container and brings ports and mounts to canonical form.
    fn canonicalize(
        name: &str,
        spec: &ContainerSpec,
        ownership: StackOwnership,
        desired: &DesiredStack,
    ) -> std::result::Result<Canonical, Vec<ContainerFailure>> {
        let mut failures = Vec::new();
        let mut fail = |reason: String| {
            failures.push(ContainerFailure {
                name: name.to_string(),
                reason,
            });
        };

        if spec.image.trim().is_empty() {
            fail(String::from("image must not be empty"));
        }

        let mut ports = Vec::with_capacity(spec.ports.len());
        for port in &spec.ports {
            match PortMapping::parse(port) {
                Ok(mapping) => ports.push(mapping.to_string()),
                Err(reason) => fail(reason),
            }
        }
        ports.sort();
        ports.dedup();

        let mut mounts = Vec::with_capacity(spec.mounts.len());
        for mount in &spec.mounts {
            match Mount::parse(mount) {
                Ok(parsed) => {
                    if ownership == StackOwnership::Exclusive
                        && parsed.is_volume()
                        && !desired.volumes.contains_key(&parsed.source)
                    {
                        fail(format!("mount uses undeclared volume '{}'", parsed.source));
                    } else {
                        mounts.push(parsed.to_string());
                    }
                }
                Err(reason) => fail(reason),
            }
        }
        mounts.sort();
        mounts.dedup();

        if failures.is_empty() {
            Ok(Canonical { ports, mounts })
        } else {
            Err(failures)
        }
    }

    /// Builds the patch for a service that does not exist yet.
    fn create_patch(spec: &ContainerSpec, canonical: Canonical) -> (ServicePatch, Vec<DiffDetail>) {
        let patch = ServicePatch {
            image: Some(spec.image.clone()),
            command: spec.command.clone(),
            entrypoint: spec.entrypoint.clone(),
            environment: (!spec.environment.is_empty()).then(|| spec.environment.clone()),
            ports: (!canonical.ports.is_empty()).then_some(canonical.ports),
            volumes: (!canonical.mounts.is_empty()).then_some(canonical.mounts),
            description: spec.description.clone(),
        };

        let details = vec![DiffDetail {
            field: String::from("service"),
            old_value: None,
            new_value: Some(spec.image.clone()),
        }];

        (patch, details)
    }

    /// Builds a patch containing only the fields that differ.
    fn update_patch(
        spec: &ContainerSpec,
        canonical: Canonical,
        observed: &ObservedService,
    ) -> (ServicePatch, Vec<DiffDetail>) {
        let mut patch = ServicePatch::default();
        let mut details = Vec::new();

        if normalize_image(&spec.image) != normalize_image(&observed.image) {
            details.push(DiffDetail {
                field: String::from("image"),
                old_value: Some(observed.image.clone()),
                new_value: Some(spec.image.clone()),
            });
            patch.image = Some(spec.image.clone());
        }

        if let Some(command) = spec.command.as_ref().filter(|c| **c != observed.command) {
            details.push(DiffDetail {
                field: String::from("command"),
                old_value: Some(render_list(&observed.command)),
                new_value: Some(render_list(command)),
            });
            patch.command = Some(command.clone());
        }

        if let Some(entrypoint) = spec.entrypoint.as_ref().filter(|e| **e != observed.entrypoint) {
            details.push(DiffDetail {
                field: String::from("entrypoint"),
                old_value: Some(render_list(&observed.entrypoint)),
                new_value: Some(render_list(entrypoint)),
            });
            patch.entrypoint = Some(entrypoint.clone());
        }

        if spec.environment != observed.environment {
            details.push(DiffDetail {
                field: String::from("environment"),
                old_value: Some(render_env_keys(&observed.environment)),
                new_value: Some(render_env_keys(&spec.environment)),
            });
            patch.environment = Some(spec.environment.clone());
        }

        let observed_ports = canonical_observed_ports(&observed.ports);
        if canonical.ports != observed_ports {
            details.push(DiffDetail {
                field: String::from("ports"),
                old_value: Some(render_list(&observed_ports)),
                new_value: Some(render_list(&canonical.ports)),
            });
            patch.ports = Some(canonical.ports);
        }

        let observed_mounts = canonical_observed_mounts(&observed.volumes);
        if canonical.mounts != observed_mounts {
            details.push(DiffDetail {
                field: String::from("mounts"),
                old_value: Some(render_list(&observed_mounts)),
                new_value: Some(render_list(&canonical.mounts)),
            });
            patch.volumes = Some(canonical.mounts);
        }

        if let Some(description) = spec
            .description
            .as_ref()
            .filter(|d| **d != observed.description)
        {
            details.push(DiffDetail {
                field: String::from("description"),
                old_value: Some(observed.description.clone()),
                new_value: Some(description.clone()),
            });
            patch.description = Some(description.clone());
        }

        (patch, details)
    }
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diffs.iter().any(|d| d.diff_type != DiffType::NoChange)
    }

    /// Returns the number of entries of the given diff type.
    #[must_use]
    pub fn count(&self, diff_type: DiffType) -> usize {
        self.diffs.iter().filter(|d| d.diff_type == diff_type).count()
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ObservedVolume;

    fn container(image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            ..ContainerSpec::default()
        }
    }

    fn observed(name: &str, image: &str) -> ObservedService {
        ObservedService {
            id: format!("svc-{name}"),
            service_name: name.to_string(),
            image: image.to_string(),
            ..ObservedService::default()
        }
    }

    fn desired_with(name: &str, spec: ContainerSpec) -> DesiredStack {
        let mut desired = DesiredStack::default();
        desired.containers.insert(name.to_string(), spec);
        desired
    }

    fn diff_one(
        spec: &ContainerSpec,
        observed: Option<&ObservedService>,
    ) -> std::result::Result<ResourceDiff, Vec<ContainerFailure>> {
        let desired = desired_with("web", spec.clone());
        DiffEngine::new().diff_container("web", spec, observed, StackOwnership::SharedDefault, &desired)
    }

    #[test]
    fn test_normalize_image() {
        assert_eq!(normalize_image("nginx:latest"), "nginx:latest");
        assert_eq!(normalize_image("library/nginx:latest"), "nginx:latest");
        assert_eq!(normalize_image("docker.io/library/nginx:latest"), "nginx:latest");
        assert_eq!(normalize_image("ghcr.io/acme/api:1"), "ghcr.io/acme/api:1");
    }

    #[test]
    fn test_implicit_image_prefix_is_not_drift() {
        let diff = diff_one(
            &container("nginx:latest"),
            Some(&observed("web", "library/nginx:latest")),
        )
        .expect("diff should build");

        assert_eq!(diff.diff_type, DiffType::NoChange);
        assert!(diff.patch.is_none());
    }

    #[test]
    fn test_create_includes_only_set_fields() {
        let diff = diff_one(&container("nginx:latest"), None).expect("diff should build");
        let patch = diff.patch.expect("create has a patch");

        assert_eq!(diff.diff_type, DiffType::Create);
        assert_eq!(patch.changed_fields(), vec!["image"]);
    }

    #[test]
    fn test_update_contains_only_changed_fields() {
        let mut spec = container("nginx:1.27");
        spec.environment.insert(String::from("MODE"), String::from("prod"));
        spec.ports = vec![String::from("443"), String::from("80/tcp")];

        let mut current = observed("web", "nginx:1.27");
        current.ports = vec![String::from("80/tcp"), String::from("443/tcp")];

        let diff = diff_one(&spec, Some(&current)).expect("diff should build");
        let patch = diff.patch.expect("update has a patch");

        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(patch.changed_fields(), vec!["environment"]);
        assert_eq!(diff.details[0].field, "environment");
    }

    #[test]
    fn test_unset_optional_fields_are_not_managed() {
        let mut current = observed("web", "nginx:1.27");
        current.command = vec![String::from("nginx"), String::from("-g")];
        current.description = String::from("set elsewhere");

        let diff = diff_one(&container("nginx:1.27"), Some(&current)).expect("diff should build");
        assert_eq!(diff.diff_type, DiffType::NoChange);

        let mut spec = container("nginx:1.27");
        spec.command = Some(vec![]);
        let diff = diff_one(&spec, Some(&current)).expect("diff should build");
        assert_eq!(
            diff.patch.expect("command cleared").command,
            Some(Vec::<String>::new())
        );
    }

    #[test]
    fn test_build_failures_are_collected_per_container() {
        let mut spec = container(" ");
        spec.ports = vec![String::from("http"), String::from("80")];
        spec.mounts = vec![String::from("data")];

        let failures = diff_one(&spec, None).expect_err("container is invalid");

        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|f| f.name == "web"));
    }

    #[test]
    fn test_exclusive_requires_declared_volumes() {
        let mut spec = container("postgres:16");
        spec.mounts = vec![String::from("pgdata:/var/lib/postgresql/data")];
        let desired = desired_with("db", spec.clone());

        let failures = DiffEngine::new()
            .diff_container("db", &spec, None, StackOwnership::Exclusive, &desired)
            .expect_err("volume not declared");
        assert!(failures[0].reason.contains("pgdata"));
    }

    #[test]
    fn test_compute_diff_exclusive_removes_undeclared() {
        let desired = desired_with("web", container("nginx:1.27"));
        let scope = ManagedScope::new(StackOwnership::Exclusive, &desired);
        let snapshot = StackSnapshot {
            id: String::from("st-1"),
            services: vec![observed("web", "nginx:1.27"), observed("old", "busybox")],
            volumes: vec![ObservedVolume {
                name: String::from("scratch"),
            }],
        };

        let result = DiffEngine::new().compute_diff(&scope, &desired, &snapshot);

        assert!(result.failures.is_empty());
        assert_eq!(result.count(DiffType::Remove), 2);
        assert_eq!(result.count(DiffType::NoChange), 1);
        assert!(result.has_changes());
    }

    #[test]
    fn test_compute_diff_collects_all_failures() {
        let mut desired = desired_with("api", container(""));
        desired.containers.insert(String::from("web"), container("nginx"));
        desired.containers.insert(
            String::from("worker"),
            ContainerSpec {
                ports: vec![String::from("99999")],
                ..container("worker:1")
            },
        );
        let scope = ManagedScope::new(StackOwnership::SharedDefault, &desired);
        let snapshot = StackSnapshot {
            id: String::from("st-1"),
            ..StackSnapshot::default()
        };

        let result = DiffEngine::new().compute_diff(&scope, &desired, &snapshot);

        let names: Vec<&str> = result.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["api", "worker"]);
        assert_eq!(result.count(DiffType::Create), 1);
    }
}
