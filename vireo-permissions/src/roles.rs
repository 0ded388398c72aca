//! Role hierarchy
//!
//! Roles form a DAG of `parent -> [children]` edges. A parent can do
//! everything its children can do, plus whatever is granted to it directly.
//! Grants never flow the other way: a child gains nothing from its parents.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{ConfigError, ConfigResult};

/// Immutable role inheritance graph.
///
/// Built once at startup; the transitive closure of every role is computed
/// up front so lookups during a permission check are a single map access.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use vireo_permissions::RoleGraph;
///
/// let mut hierarchy = BTreeMap::new();
/// hierarchy.insert("corridor".to_string(), vec!["manager".to_string()]);
/// hierarchy.insert("manager".to_string(), vec!["officer".to_string()]);
///
/// let graph = RoleGraph::new(&hierarchy).unwrap();
/// assert!(graph.inherits("corridor", "officer"));
/// assert!(!graph.inherits("officer", "corridor"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    /// Direct children of every known role.
    children: BTreeMap<String, BTreeSet<String>>,

    /// Transitive children of every known role (excluding the role itself).
    closures: HashMap<String, BTreeSet<String>>,
}

impl RoleGraph {
    /// Build the graph from a `parent -> [children]` map.
    ///
    /// Children that have no entry of their own are added as leaves.
    ///
    /// # Errors
    ///
    /// - `InvalidRoleName` for empty names or names containing whitespace
    /// - `CycleDetected` if any role (transitively) contains itself
    pub fn new(hierarchy: &BTreeMap<String, Vec<String>>) -> ConfigResult<Self> {
        let mut children: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (parent, kids) in hierarchy {
            validate_role_name(parent)?;
            let entry = children.entry(parent.clone()).or_default();
            for kid in kids {
                validate_role_name(kid)?;
                entry.insert(kid.clone());
            }
        }

        let leaves: Vec<String> = children
            .values()
            .flatten()
            .filter(|kid| !children.contains_key(*kid))
            .cloned()
            .collect();
        for leaf in leaves {
            children.entry(leaf).or_default();
        }

        if let Some(cycle) = find_cycle(&children) {
            return Err(ConfigError::CycleDetected(cycle));
        }

        let closures = children
            .keys()
            .map(|role| (role.clone(), closure_of(&children, role)))
            .collect();

        Ok(Self { children, closures })
    }

    /// Check whether `role` transitively includes `candidate`.
    ///
    /// Not reflexive: `inherits(r, r)` is false. A role's own grants are
    /// covered by [`RoleGraph::effective_roles`].
    pub fn inherits(&self, role: &str, candidate: &str) -> bool {
        self.closures
            .get(role)
            .map_or(false, |closure| closure.contains(candidate))
    }

    /// All roles reachable from `role`, excluding `role` itself.
    ///
    /// An undefined role has no inherited roles.
    pub fn inherited_roles(&self, role: &str) -> BTreeSet<String> {
        self.closures.get(role).cloned().unwrap_or_default()
    }

    /// The role itself plus everything it inherits.
    pub fn effective_roles(&self, role: &str) -> BTreeSet<String> {
        let mut roles = self.inherited_roles(role);
        roles.insert(role.to_string());
        roles
    }

    /// Union of [`RoleGraph::effective_roles`] over a set of roles.
    pub fn expand<'a, I>(&self, roles: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut expanded = BTreeSet::new();
        for role in roles {
            expanded.insert(role.clone());
            if let Some(closure) = self.closures.get(role) {
                expanded.extend(closure.iter().cloned());
            }
        }
        expanded
    }

    /// Check if any of `roles` is, or inherits, one of `granted`.
    pub fn any_grants<'a, I>(&self, roles: I, granted: &BTreeSet<String>) -> Option<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for role in roles {
            if granted.contains(role) {
                return Some(role.clone());
            }
            if let Some(closure) = self.closures.get(role) {
                if closure.iter().any(|inherited| granted.contains(inherited)) {
                    return Some(role.clone());
                }
            }
        }
        None
    }

    /// Direct children of a role.
    pub fn children(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.children.get(role)
    }

    /// Roles that inherit `role`, directly or transitively.
    pub fn ancestors(&self, role: &str) -> BTreeSet<String> {
        self.closures
            .iter()
            .filter(|(_, closure)| closure.contains(role))
            .map(|(parent, _)| parent.clone())
            .collect()
    }

    /// Check if a role appears anywhere in the hierarchy.
    pub fn contains(&self, role: &str) -> bool {
        self.children.contains_key(role)
    }

    /// All known role names, sorted.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Number of known roles.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if the graph has no roles.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Validate a role name.
pub(crate) fn validate_role_name(name: &str) -> ConfigResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidRoleName(name.to_string()));
    }
    Ok(())
}

/// Breadth-first transitive closure. Revisited roles are skipped.
fn closure_of(children: &BTreeMap<String, BTreeSet<String>>, start: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&str> = children
        .get(start)
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();

    while let Some(role) = queue.pop_front() {
        if !seen.insert(role.to_string()) {
            continue;
        }
        if let Some(next) = children.get(role) {
            queue.extend(next.iter().map(String::as_str));
        }
    }

    seen
}

/// Iterative depth-first search for a cycle.
///
/// Returns the cycle as a path whose first and last entries are the same role.
fn find_cycle(children: &BTreeMap<String, BTreeSet<String>>) -> Option<Vec<String>> {
    let mut done: HashSet<&str> = HashSet::new();

    for root in children.keys() {
        if done.contains(root.as_str()) {
            continue;
        }

        let mut path: Vec<&str> = vec![root.as_str()];
        let mut stack = vec![children[root].iter()];

        loop {
            let Some(iter) = stack.last_mut() else {
                break;
            };

            match iter.next() {
                Some(child) => {
                    let child = child.as_str();
                    if let Some(pos) = path.iter().position(|role| *role == child) {
                        let mut cycle: Vec<String> =
                            path[pos..].iter().map(|role| role.to_string()).collect();
                        cycle.push(child.to_string());
                        return Some(cycle);
                    }
                    if done.contains(child) {
                        continue;
                    }
                    path.push(child);
                    stack.push(children[child].iter());
                }
                None => {
                    stack.pop();
                    if let Some(finished) = path.pop() {
                        done.insert(finished);
                    }
                }
            }
        }
    }

    None
}
