use std::fmt;

/// Qualified name for type identity during generation.
///
/// Used as primary key for catalog lookups. The managed naming convention
/// separates namespace segments with `.` and marks generic type definitions
/// with a backtick arity suffix (``List`1``).
///
/// # Examples
///
/// ```
/// use crossbind_core::QualifiedName;
///
/// let calc = QualifiedName::new("Calc", vec!["MyGame".into(), "Math".into()]);
/// assert_eq!(calc.to_string(), "MyGame.Math.Calc");
///
/// let list = QualifiedName::from_qualified_string("System.Collections.Generic.List`1");
/// assert_eq!(list.base_name(), "List");
/// assert_eq!(list.generic_arity(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    /// Simple name (e.g., "Calc", "List`1")
    pub name: String,
    /// Namespace path (e.g., ["MyGame", "Math"])
    /// Empty for the global namespace
    pub namespace: Vec<String>,
}

impl QualifiedName {
    /// Create a new qualified name with namespace.
    pub fn new(name: impl Into<String>, namespace: Vec<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
        }
    }

    /// Create a qualified name in the global namespace.
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Vec::new(),
        }
    }

    /// Create from a dotted string (e.g., "MyGame.Math.Calc").
    ///
    /// The last segment is the name, the rest is namespace. Empty segments are
    /// dropped, so ".MyGame.Calc" == "MyGame.Calc".
    pub fn from_qualified_string(s: &str) -> Self {
        let mut parts: Vec<String> = s
            .split('.')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        match parts.pop() {
            Some(name) => Self {
                name,
                namespace: parts,
            },
            None => Self::global(""),
        }
    }

    /// Check if this is in the global namespace.
    pub fn is_global(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Get the simple (unqualified) name, including any arity suffix.
    pub fn simple_name(&self) -> &str {
        &self.name
    }

    /// Get the simple name with the generic arity suffix stripped.
    pub fn base_name(&self) -> &str {
        match self.name.find('`') {
            Some(idx) => &self.name[..idx],
            None => &self.name,
        }
    }

    /// Number of generic parameters encoded in the arity suffix.
    pub fn generic_arity(&self) -> usize {
        self.name
            .find('`')
            .and_then(|idx| self.name[idx + 1..].parse().ok())
            .unwrap_or(0)
    }

    /// Same name with the arity suffix replaced by `arity`.
    ///
    /// An arity of zero strips the suffix.
    pub fn with_arity(&self, arity: usize) -> Self {
        let base = self.base_name();
        let name = if arity == 0 {
            base.to_string()
        } else {
            format!("{base}`{arity}")
        };
        Self {
            name,
            namespace: self.namespace.clone(),
        }
    }

    /// Get the namespace path.
    pub fn namespace_path(&self) -> &[String] {
        &self.namespace
    }

    /// Get the namespace as a dotted string.
    pub fn namespace_string(&self) -> String {
        self.namespace.join(".")
    }

    /// Namespace segments and base name concatenated without separators.
    ///
    /// This is the prefix every generated symbol for the type starts with,
    /// e.g. `MyGame.Math.Calc` -> `MyGameMathCalc`.
    pub fn symbol_prefix(&self) -> String {
        let mut out = String::new();
        for segment in &self.namespace {
            out.push_str(segment);
        }
        out.push_str(self.base_name());
        out
    }

    /// Compute the TypeHash of this qualified name.
    pub fn to_type_hash(&self) -> crate::TypeHash {
        crate::TypeHash::from_name(&self.to_string())
    }

    /// Create a child name within this namespace.
    ///
    /// Example: `MyGame.Math` + `Calc` = `MyGame.Math.Calc`
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut child_ns = self.namespace.clone();
        child_ns.push(self.name.clone());
        Self {
            name: name.into(),
            namespace: child_ns,
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace.join("."), self.name)
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        Self::from_qualified_string(s)
    }
}

impl From<String> for QualifiedName {
    fn from(s: String) -> Self {
        Self::from_qualified_string(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_name() {
        let name = QualifiedName::global("Calc");
        assert!(name.is_global());
        assert_eq!(name.to_string(), "Calc");
    }

    #[test]
    fn from_qualified_string() {
        let name = QualifiedName::from_qualified_string("MyGame.Math.Calc");
        assert_eq!(name.name, "Calc");
        assert_eq!(name.namespace, vec!["MyGame", "Math"]);

        let leading = QualifiedName::from_qualified_string(".MyGame.Math.Calc");
        assert_eq!(leading, name);

        let empty = QualifiedName::from_qualified_string("");
        assert_eq!(empty.name, "");
        assert!(empty.is_global());
    }

    #[test]
    fn generic_suffix() {
        let name = QualifiedName::from_qualified_string("System.Collections.Generic.Dictionary`2");
        assert_eq!(name.base_name(), "Dictionary");
        assert_eq!(name.generic_arity(), 2);
        assert_eq!(name.with_arity(0).name, "Dictionary");

        let plain = QualifiedName::from_qualified_string("System.Int32");
        assert_eq!(plain.generic_arity(), 0);
        assert_eq!(plain.with_arity(1).name, "Int32`1");
    }

    #[test]
    fn symbol_prefix_strips_separators_and_arity() {
        let name = QualifiedName::from_qualified_string("System.Collections.Generic.List`1");
        assert_eq!(name.symbol_prefix(), "SystemCollectionsGenericList");
    }

    #[test]
    fn child_name() {
        let parent = QualifiedName::new("Math", vec!["MyGame".into()]);
        assert_eq!(parent.child("Calc").to_string(), "MyGame.Math.Calc");
    }
}
