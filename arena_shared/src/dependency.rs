//! System dependency resolution.
//!
//! Computes a total execution order for a set of systems from their declared
//! prerequisites. Pure and deterministic: it runs once when a room's system
//! set is built, never per tick.

use std::collections::HashSet;

/// Upper bound on resolution passes over the candidate ring, as a multiple
/// of the system count. Exhausting it means a cycle or a prerequisite that
/// was never declared.
const MAX_RESOLVE_PASSES: usize = 8;

/// Static declaration of one system: its kind name and the kinds it must
/// run after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemDecl {
    pub name: &'static str,
    pub requires: &'static [&'static str],
}

/// Dependency resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// No valid order exists within the pass bound: the declarations
    /// contain a cycle or reference an unknown prerequisite.
    Unresolvable { unresolved: Vec<String> },
}

impl std::fmt::Display for DependencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyError::Unresolvable { unresolved } => {
                write!(f, "could not resolve system order for: {}", unresolved.join(", "))
            }
        }
    }
}

impl std::error::Error for DependencyError {}

/// Resolves a valid execution order over the declarations, returned as
/// indices into the input slice.
///
/// Candidates are visited round-robin in ascending prerequisite count
/// (stable by input order); a system is placed once all its prerequisites
/// are. The scan is bounded, so cyclic or dangling declarations surface as
/// [`DependencyError::Unresolvable`] instead of spinning.
pub fn resolve_dependency_order(decls: &[SystemDecl]) -> Result<Vec<usize>, DependencyError> {
    let mut ring: Vec<usize> = (0..decls.len()).collect();
    ring.sort_by_key(|&i| decls[i].requires.len());

    let mut order: Vec<usize> = Vec::with_capacity(decls.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut left: HashSet<usize> = ring.iter().copied().collect();

    let max_steps = decls.len() * MAX_RESOLVE_PASSES;
    let mut cursor = 0;
    for _ in 0..max_steps {
        if left.is_empty() {
            break;
        }
        let index = ring[cursor % ring.len()];
        cursor += 1;
        if !left.contains(&index) {
            continue;
        }
        let decl = &decls[index];
        if decl.requires.iter().all(|name| placed.contains(name)) {
            order.push(index);
            placed.insert(decl.name);
            left.remove(&index);
        }
    }

    if left.is_empty() {
        Ok(order)
    } else {
        let mut unresolved: Vec<String> = left
            .iter()
            .map(|&i| decls[i].name.to_string())
            .collect();
        unresolved.sort();
        Err(DependencyError::Unresolvable { unresolved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO: SystemDecl = SystemDecl { name: "foo", requires: &[] };
    const BAR: SystemDecl = SystemDecl { name: "bar", requires: &[] };
    const BAZ: SystemDecl = SystemDecl { name: "baz", requires: &["foo"] };
    const BAY: SystemDecl = SystemDecl { name: "bay", requires: &["foo"] };
    const BAK: SystemDecl = SystemDecl { name: "bak", requires: &["bay", "baz"] };
    const BAX: SystemDecl = SystemDecl { name: "bax", requires: &[] };

    fn names(decls: &[SystemDecl], order: &[usize]) -> Vec<&'static str> {
        order.iter().map(|&i| decls[i].name).collect()
    }

    #[test]
    fn resolves_in_declaration_then_dependency_order() {
        let decls = [FOO, BAY, BAZ, BAR, BAK, BAX];
        let order = resolve_dependency_order(&decls).unwrap();
        assert_eq!(names(&decls, &order), ["foo", "bar", "bax", "bay", "baz", "bak"]);

        let decls = [FOO, BAR, BAZ, BAY, BAK, BAX];
        let order = resolve_dependency_order(&decls).unwrap();
        assert_eq!(names(&decls, &order), ["foo", "bar", "bax", "baz", "bay", "bak"]);
    }

    #[test]
    fn chain_submitted_backwards_resolves_forwards() {
        let decls = [
            SystemDecl { name: "c", requires: &["b"] },
            SystemDecl { name: "b", requires: &["a"] },
            SystemDecl { name: "a", requires: &[] },
        ];
        let order = resolve_dependency_order(&decls).unwrap();
        assert_eq!(names(&decls, &order), ["a", "b", "c"]);
    }

    #[test]
    fn every_system_follows_its_prerequisites() {
        let decls = [FOO, BAY, BAZ, BAR, BAK, BAX];
        let order = resolve_dependency_order(&decls).unwrap();
        let names = names(&decls, &order);
        for decl in &decls {
            let at = names.iter().position(|n| *n == decl.name).unwrap();
            for req in decl.requires {
                assert!(names.iter().position(|n| n == req).unwrap() < at);
            }
        }
    }

    #[test]
    fn cycle_is_unresolvable() {
        let decls = [
            SystemDecl { name: "a", requires: &["b"] },
            SystemDecl { name: "b", requires: &["a"] },
        ];
        let err = resolve_dependency_order(&decls).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Unresolvable {
                unresolved: vec!["a".to_string(), "b".to_string()],
            }
        );
    }

    #[test]
    fn unknown_prerequisite_is_unresolvable() {
        let decls = [SystemDecl { name: "a", requires: &["ghost"] }];
        assert!(resolve_dependency_order(&decls).is_err());
    }

    #[test]
    fn empty_input_resolves_empty() {
        assert_eq!(resolve_dependency_order(&[]).unwrap(), Vec::<usize>::new());
    }
}
