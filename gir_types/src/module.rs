use indexmap::{IndexMap, IndexSet};
use serde_derive::{Deserialize, Serialize};

use crate::nodes::Node;

/// Everything parsed out of one `<namespace>`: the top-level entries plus the
/// side tables the parser accumulated (aliases, disguised records, include
/// and dependency names). Destroying a module destroys its whole tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub shared_library: Option<String>,
    pub c_prefix: Option<String>,
    /// `"Name-Version"` strings for every `<include>` this module pulled in,
    /// directly or transitively, in resolution order.
    pub dependencies: Vec<String>,
    /// Namespace names of the modules this one can see entries of.
    pub includes: Vec<String>,
    /// `Ns.Alias` → target name (qualified, or a basic spelling).
    pub aliases: IndexMap<String, String>,
    /// Qualified names of records declared `disguised="1"`.
    pub disguised: IndexSet<String>,
    pub entries: Vec<Node>,
}

impl Module {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            version: version.into(),
            shared_library: None,
            c_prefix: None,
            dependencies: Vec::new(),
            includes: Vec::new(),
            aliases: IndexMap::new(),
            disguised: IndexSet::new(),
            entries: Vec::new(),
        }
    }

    /// Entry lookup by bare name within this namespace.
    pub fn entry(&self, name: &str) -> Option<&Node> {
        self.entries.iter().find(|node| node.name == name)
    }

    /// 1-based directory index of an entry, the form cross-references use.
    pub fn entry_index(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|node| node.name == name)
            .map(|idx| (idx + 1) as u16)
    }

    /// Follow the alias chain for `name` (qualified with this namespace when
    /// bare). Cycles stop at the first repeated link. Returns the final
    /// spelling, which may be the input itself.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        let prefixed;
        let mut lookup: &str = if name.contains('.') {
            name
        } else {
            prefixed = format!("{}.{}", self.name, name);
            match self.aliases.get(prefixed.as_str()) {
                // A bare name that is not aliased stays bare.
                None => return name,
                Some(first) => first,
            }
        };
        let mut seen: Vec<&str> = vec![lookup];
        while let Some(target) = self.aliases.get(lookup) {
            if seen.iter().any(|s| *s == target.as_str()) {
                break;
            }
            lookup = target;
            seen.push(lookup);
        }
        lookup
    }

    pub fn is_disguised(&self, name: &str) -> bool {
        if name.contains('.') {
            self.disguised.contains(name)
        } else {
            self.disguised.contains(&format!("{}.{}", self.name, name))
        }
    }
}

/// Find a (possibly qualified) entry name among `module` and the other
/// parsed modules. Returns the owning module and the node.
pub fn find_node<'a>(
    module: &'a Module,
    modules: &'a [Module],
    name: &str,
) -> Option<(&'a Module, &'a Node)> {
    let mut parts = name.splitn(2, '.');
    let first = parts.next()?;
    match parts.next() {
        None => module.entry(first).map(|node| (module, node)),
        Some(rest) if first == module.name => module.entry(rest).map(|node| (module, node)),
        Some(rest) => modules
            .iter()
            .find(|m| m.name == first)
            .and_then(|m| m.entry(rest).map(|node| (m, node))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{FunctionNode, NodeKind};

    fn module_with(names: &[&str]) -> Module {
        let mut module = Module::new("X", "1.0");
        for name in names {
            module
                .entries
                .push(Node::new(*name, NodeKind::Function(FunctionNode::new(*name))));
        }
        module
    }

    #[test]
    fn entry_index_is_one_based() {
        let module = module_with(&["alpha", "beta"]);
        assert_eq!(module.entry_index("alpha"), Some(1));
        assert_eq!(module.entry_index("beta"), Some(2));
        assert_eq!(module.entry_index("gamma"), None);
    }

    #[test]
    fn alias_resolution_follows_chains() {
        let mut module = Module::new("X", "1.0");
        module.aliases.insert("X.A".into(), "X.B".into());
        module.aliases.insert("X.B".into(), "X.C".into());
        assert_eq!(module.resolve_alias("A"), "X.C");
        assert_eq!(module.resolve_alias("X.A"), "X.C");
        assert_eq!(module.resolve_alias("D"), "D");
    }

    #[test]
    fn alias_cycles_terminate() {
        let mut module = Module::new("X", "1.0");
        module.aliases.insert("X.A".into(), "X.B".into());
        module.aliases.insert("X.B".into(), "X.A".into());
        // Lands on one of the cycle participants rather than spinning.
        let resolved = module.resolve_alias("A");
        assert!(resolved == "X.A" || resolved == "X.B");
    }

    #[test]
    fn find_node_crosses_namespaces() {
        let x = module_with(&["local"]);
        let mut y = Module::new("Y", "2.0");
        y.entries
            .push(Node::new("Foreign", NodeKind::Function(FunctionNode::new("y_foreign"))));
        let modules = vec![x.clone(), y];

        let (owner, node) = find_node(&modules[0], &modules, "local").unwrap();
        assert_eq!(owner.name, "X");
        assert_eq!(node.name, "local");

        let (owner, node) = find_node(&modules[0], &modules, "Y.Foreign").unwrap();
        assert_eq!(owner.name, "Y");
        assert_eq!(node.name, "Foreign");

        assert!(find_node(&modules[0], &modules, "Z.Missing").is_none());
    }
}
