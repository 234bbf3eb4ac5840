//! Desired-state fingerprints.
//!
//! Plans and outcomes carry a short fingerprint of the desired stack so two
//! runs against the same declaration are easy to correlate.

use sha2::{Digest, Sha256};

use super::spec::{ContainerSpec, DesiredStack, StackConfig};

/// Hasher for computing desired-state fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a declared stack, including its identity and
    /// ownership.
    #[must_use]
    pub fn hash_stack(&self, stack: &StackConfig) -> String {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, stack.name.as_bytes());
        update_field(&mut hasher, stack.stack_id.as_bytes());
        update_field(&mut hasher, stack.ownership.to_string().as_bytes());
        update_field(&mut hasher, self.hash_desired(&stack.desired).as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Computes a hash of desired containers and volumes.
    ///
    /// Maps are ordered, and ports and mounts are hashed sorted, so
    /// declaration order never changes the result.
    #[must_use]
    pub fn hash_desired(&self, desired: &DesiredStack) -> String {
        let mut hasher = Sha256::new();

        for (name, container) in &desired.containers {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, self.hash_container(container).as_bytes());
        }

        hasher.update([0xff]);
        for name in desired.volumes.keys() {
            update_field(&mut hasher, name.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single container.
    #[must_use]
    pub fn hash_container(&self, container: &ContainerSpec) -> String {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, container.image.as_bytes());
        update_optional_list(&mut hasher, container.command.as_deref());
        update_optional_list(&mut hasher, container.entrypoint.as_deref());

        for (key, value) in &container.environment {
            update_field(&mut hasher, key.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        let mut ports: Vec<&String> = container.ports.iter().collect();
        ports.sort_unstable();
        hasher.update([0xfe]);
        for port in ports {
            update_field(&mut hasher, port.as_bytes());
        }

        let mut mounts: Vec<&String> = container.mounts.iter().collect();
        mounts.sort_unstable();
        hasher.update([0xfd]);
        for mount in mounts {
            update_field(&mut hasher, mount.as_bytes());
        }

        match &container.description {
            Some(description) => {
                hasher.update([1u8]);
                update_field(&mut hasher, description.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(if container.no_recreate_on_change { [1u8] } else { [0u8] });

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Length-prefixes a field so adjacent fields cannot run together.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn update_optional_list(hasher: &mut Sha256, list: Option<&[String]>) {
    match list {
        Some(items) => {
            hasher.update([1u8]);
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                update_field(hasher, item.as_bytes());
            }
        }
        None => hasher.update([0u8]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackOwnership;

    fn create_test_container(image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            ports: vec![String::from("80"), String::from("443")],
            ..ContainerSpec::default()
        }
    }

    fn create_test_stack(name: &str) -> StackConfig {
        let mut desired = DesiredStack::default();
        desired
            .containers
            .insert(String::from("web"), create_test_container("nginx:1.27"));
        StackConfig {
            name: name.to_string(),
            stack_id: String::from("st-1"),
            ownership: StackOwnership::SharedDefault,
            desired,
        }
    }

    #[test]
    fn test_stack_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let stack = create_test_stack("shop");

        assert_eq!(hasher.hash_stack(&stack), hasher.hash_stack(&stack));
    }

    #[test]
    fn test_port_order_does_not_matter() {
        let hasher = ConfigHasher::new();
        let a = create_test_container("nginx:1.27");
        let mut b = a.clone();
        b.ports.reverse();

        assert_eq!(hasher.hash_container(&a), hasher.hash_container(&b));
    }

    #[test]
    fn test_unset_and_empty_command_differ() {
        let hasher = ConfigHasher::new();
        let unset = create_test_container("nginx:1.27");
        let mut empty = unset.clone();
        empty.command = Some(vec![]);

        assert_ne!(hasher.hash_container(&unset), hasher.hash_container(&empty));
    }

    #[test]
    fn test_ownership_changes_stack_hash() {
        let hasher = ConfigHasher::new();
        let shared = create_test_stack("shop");
        let mut exclusive = shared.clone();
        exclusive.ownership = StackOwnership::Exclusive;

        assert_ne!(hasher.hash_stack(&shared), hasher.hash_stack(&exclusive));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}
