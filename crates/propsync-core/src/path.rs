//! Object paths
//!
//! An object path addresses a node of the data graph with dotted segments and
//! optional bracketed array indices, e.g. `items[2].settings`. Paths are parsed
//! once into an [`ObjectPath`] and compared structurally afterwards.
//!
//! The legacy root namespace token (`root.user.name` vs `user.name`) is
//! stripped in one place only, [`PathResolver::normalize`].

use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default root namespace token stripped from incoming paths
pub const DEFAULT_ROOT_NAMESPACE: &str = "root";

/// An array index attached to one segment of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathIndex {
    /// Position of the segment the index follows.
    pub segment_index: usize,
    /// The array index itself.
    pub array_index: usize,
}

/// A parsed object path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    segments: Vec<String>,
    indices: Vec<PathIndex>,
}

impl ObjectPath {
    /// The empty path, addressing the whole model
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string (no namespace handling)
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        let mut indices = Vec::new();

        for (segment_index, part) in trimmed.split('.').enumerate() {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };

            if name.is_empty() {
                let reason = if rest.is_empty() {
                    "empty segment"
                } else {
                    "array index without a segment name"
                };
                return Err(Error::invalid_path(path, reason));
            }
            if name.contains(']') {
                return Err(Error::invalid_path(path, format!("stray ']' in '{name}'")));
            }
            segments.push(name.to_string());

            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return Err(Error::invalid_path(
                        path,
                        format!("unexpected '{rest}' after array index"),
                    ));
                }
                let close = rest
                    .find(']')
                    .ok_or_else(|| Error::invalid_path(path, "unclosed '['"))?;
                let digits = &rest[1..close];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::invalid_path(
                        path,
                        format!("array index '{digits}' is not a number"),
                    ));
                }
                let array_index = digits
                    .parse()
                    .map_err(|_| Error::invalid_path(path, "array index out of range"))?;
                indices.push(PathIndex {
                    segment_index,
                    array_index,
                });
                rest = &rest[close + 1..];
            }
        }

        Ok(Self { segments, indices })
    }

    /// Build a path from parts, keeping only indices that point at a segment
    pub fn from_parts(segments: Vec<String>, indices: Vec<PathIndex>) -> Self {
        let len = segments.len();
        let mut indices: Vec<PathIndex> = indices
            .into_iter()
            .filter(|ix| ix.segment_index < len)
            .collect();
        indices.sort_by_key(|ix| ix.segment_index);
        Self { segments, indices }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn indices(&self) -> &[PathIndex] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// The first `count` segments with their indices
    pub fn prefix(&self, count: usize) -> Self {
        let count = count.min(self.segments.len());
        Self {
            segments: self.segments[..count].to_vec(),
            indices: self
                .indices
                .iter()
                .copied()
                .filter(|ix| ix.segment_index < count)
                .collect(),
        }
    }

    /// Append a property (which may itself be a dotted/bracketed path)
    pub fn with_property(&self, property: &str) -> Result<Self> {
        if self.is_empty() {
            return Self::parse(property);
        }
        if property.trim().is_empty() {
            return Ok(self.clone());
        }
        Self::parse(&format!("{self}.{property}"))
    }

    /// Split off the trailing segment as a property name
    pub fn split_last(&self) -> Result<(Self, String)> {
        let Some(last) = self.segments.last() else {
            return Err(Error::invalid_path("", "path has no segments"));
        };
        let last_index = self.segments.len() - 1;
        if self.indices.iter().any(|ix| ix.segment_index == last_index) {
            return Err(Error::invalid_path(
                self.to_string(),
                "property segment carries an array index",
            ));
        }
        Ok((self.prefix(last_index), last.clone()))
    }

    /// Whether `self` continues `ancestor` directly with an array index
    ///
    /// `items[0].name` continues `items` this way; `items.count` and
    /// `otherArray[0]` do not. An empty ancestor never matches.
    pub fn is_array_descendant_of(&self, ancestor: &ObjectPath) -> bool {
        let k = ancestor.segments.len();
        let m = ancestor.indices.len();
        if k == 0 || self.segments.len() < k || self.indices.len() <= m {
            return false;
        }
        self.segments[..k] == ancestor.segments[..]
            && self.indices[..m] == ancestor.indices[..]
            && self.indices[m].segment_index == k - 1
    }

    /// Whether `self` equals `prefix` or lies below it
    pub fn starts_with(&self, prefix: &ObjectPath) -> bool {
        let k = prefix.segments.len();
        if k == 0 {
            return true;
        }
        if self.segments.len() < k || self.segments[..k] != prefix.segments[..] {
            return false;
        }

        let within: Vec<PathIndex> = self
            .indices
            .iter()
            .copied()
            .filter(|ix| ix.segment_index < k)
            .collect();
        let m = prefix.indices.len();
        within.len() >= m
            && within[..m] == prefix.indices[..]
            && within[m..].iter().all(|ix| ix.segment_index == k - 1)
    }
}

impl ObjectPath {
    /// The node this path addresses inside `root`
    pub fn lookup<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.lookup_below(&ObjectPath::root(), root)
    }

    /// Walk down from `value`, the node at `ancestor`, to the node this path addresses
    ///
    /// None when this path is not at or below `ancestor`, or the node is missing.
    pub fn lookup_below<'v>(&self, ancestor: &ObjectPath, value: &'v Value) -> Option<&'v Value> {
        if !self.starts_with(ancestor) {
            return None;
        }
        let k = ancestor.segments.len();
        let mut indices = self.indices[ancestor.indices.len()..].iter().peekable();
        let mut current = value;
        while let Some(ix) = indices.next_if(|ix| ix.segment_index < k) {
            current = current.get(ix.array_index)?;
        }
        for (i, segment) in self.segments.iter().enumerate().skip(k) {
            current = current.get(segment.as_str())?;
            while let Some(ix) = indices.next_if(|ix| ix.segment_index == i) {
                current = current.get(ix.array_index)?;
            }
        }
        Some(current)
    }

    /// Write `value` at this path inside `root`, creating intermediate objects
    /// and array slots; returns the previous value (`Null` when absent)
    ///
    /// An index equal to the array length appends.
    pub fn assign(&self, root: &mut Value, value: Value) -> Result<Value> {
        let mut current = root;

        for (i, segment) in self.segments.iter().enumerate() {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            let object = current.as_object_mut().ok_or_else(|| {
                Error::invalid_path(
                    self.to_string(),
                    format!("'{segment}' is not inside an object"),
                )
            })?;
            current = object.entry(segment.clone()).or_insert(Value::Null);

            for ix in self.indices.iter().filter(|ix| ix.segment_index == i) {
                if current.is_null() {
                    *current = Value::Array(Vec::new());
                }
                let array = current.as_array_mut().ok_or_else(|| {
                    Error::invalid_path(self.to_string(), format!("'{segment}' is not an array"))
                })?;
                if ix.array_index == array.len() {
                    array.push(Value::Null);
                }
                current = array.get_mut(ix.array_index).ok_or_else(|| {
                    Error::invalid_path(
                        self.to_string(),
                        format!("index {} out of bounds for '{segment}'", ix.array_index),
                    )
                })?;
            }
        }

        Ok(std::mem::replace(current, value))
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut indices = self.indices.iter().peekable();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
            while let Some(ix) = indices.next_if(|ix| ix.segment_index == i) {
                write!(f, "[{}]", ix.array_index)?;
            }
        }
        Ok(())
    }
}

impl FromStr for ObjectPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Does a change at `(change_path, change_property)` concern a value binding
/// on `(binding_path, binding_property)`?
///
/// True for an exact match, or when the changed node is an array that the
/// binding addresses an element of. Both the change's object path and its full
/// path (object path + property) are considered as the changed array.
pub fn matches_change(
    binding_path: &ObjectPath,
    binding_property: &str,
    change_path: &ObjectPath,
    change_property: &str,
) -> bool {
    if binding_path == change_path && binding_property == change_property {
        return true;
    }
    if binding_path.is_array_descendant_of(change_path) {
        return true;
    }
    change_path
        .with_property(change_property)
        .is_ok_and(|changed| binding_path.is_array_descendant_of(&changed))
}

/// Does a change concern a subtree observer rooted at `subtree`?
///
/// The empty subtree observes everything. Otherwise the changed node must lie
/// inside the subtree, or be an ancestor that replaced it.
pub fn matches_subtree(
    subtree: &ObjectPath,
    change_path: &ObjectPath,
    change_property: &str,
) -> bool {
    if subtree.is_empty() {
        return true;
    }
    match change_path.with_property(change_property) {
        Ok(changed) => changed.starts_with(subtree) || subtree.starts_with(&changed),
        Err(_) => change_path.starts_with(subtree),
    }
}

/// Path parsing and object graph access
///
/// The binding engine only needs parsing, normalization and splitting; value
/// access is used by model owners.
pub trait PathResolver {
    /// Strip the legacy root namespace token, if present
    fn normalize<'a>(&self, path: &'a str) -> &'a str;

    /// Parse a normalized path
    fn parse_object_path(&self, path: &str) -> Result<ObjectPath> {
        ObjectPath::parse(self.normalize(path))
    }

    /// Serialize the prefix described by `segments`/`indices` back to a string
    fn create_object_path(&self, segments: &[String], indices: &[PathIndex]) -> String {
        ObjectPath::from_parts(segments.to_vec(), indices.to_vec()).to_string()
    }

    /// Split a full path into its object path and trailing property
    fn split_property(&self, path: &str) -> Result<(ObjectPath, String)> {
        let parsed = self.parse_object_path(path)?;
        if parsed.is_empty() {
            return Err(Error::invalid_path(path, "path has no segments"));
        }
        parsed
            .split_last()
            .map_err(|_| Error::invalid_path(path, "property segment carries an array index"))
    }

    /// Read the value at `path`
    fn get_value_from_path<'v>(&self, root: &'v Value, path: &str) -> Option<&'v Value> {
        self.parse_object_path(path).ok()?.lookup(root)
    }

    /// Write `value` at `path`, creating intermediate objects/array slots
    ///
    /// Returns the previous value (`Null` when the slot did not exist).
    fn set_value_at_path(&self, root: &mut Value, path: &str, value: Value) -> Result<Value> {
        self.parse_object_path(path)?.assign(root, value)
    }
}

/// Dotted/bracketed path resolver with an optional root namespace token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPathResolver {
    root_namespace: Option<String>,
}

impl DottedPathResolver {
    /// Resolver stripping `namespace` (empty disables stripping)
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            root_namespace: (!namespace.trim().is_empty()).then(|| namespace.trim().to_string()),
        }
    }

    /// Resolver that never strips anything
    pub fn without_namespace() -> Self {
        Self {
            root_namespace: None,
        }
    }

    pub fn root_namespace(&self) -> Option<&str> {
        self.root_namespace.as_deref()
    }
}

impl Default for DottedPathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_NAMESPACE)
    }
}

impl PathResolver for DottedPathResolver {
    fn normalize<'a>(&self, path: &'a str) -> &'a str {
        let path = path.trim();
        let Some(namespace) = self.root_namespace.as_deref() else {
            return path;
        };
        match path.strip_prefix(namespace) {
            Some("") => "",
            Some(rest) => rest.strip_prefix('.').unwrap_or(path),
            None => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> ObjectPath {
        ObjectPath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_segments_and_indices() {
        let path = p("items[2].settings");
        assert_eq!(path.segments(), &["items".to_string(), "settings".to_string()]);
        assert_eq!(
            path.indices(),
            &[PathIndex {
                segment_index: 0,
                array_index: 2
            }]
        );
        assert_eq!(path.to_string(), "items[2].settings");

        let nested = p(" grid[0][3].cell ");
        assert_eq!(nested.indices().len(), 2);
        assert_eq!(nested.to_string(), "grid[0][3].cell");

        assert!(p("").is_empty());
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["a..b", "a.", "[0]", "a[", "a[]", "a[x]", "a[-1]", "a[0]b", "a]"] {
            let err = ObjectPath::parse(bad).unwrap_err();
            assert!(err.is_wiring_error(), "{bad} should fail");
        }
    }

    #[test]
    fn test_prefix_and_create_object_path() {
        let path = p("a[1].b.c[2]");
        assert_eq!(path.prefix(2).to_string(), "a[1].b");
        assert_eq!(path.prefix(0), ObjectPath::root());

        let resolver = DottedPathResolver::default();
        let created = resolver.create_object_path(&path.segments()[..2], path.indices());
        assert_eq!(created, "a[1].b");
    }

    #[test]
    fn test_split_property() {
        let resolver = DottedPathResolver::default();

        let (object, property) = resolver.split_property("user.address.city").unwrap();
        assert_eq!(object.to_string(), "user.address");
        assert_eq!(property, "city");

        let (object, property) = resolver.split_property("title").unwrap();
        assert!(object.is_empty());
        assert_eq!(property, "title");

        assert!(resolver.split_property("").is_err());
        assert!(resolver.split_property("root").is_err());
        assert!(resolver.split_property("tags[0]").is_err());
    }

    #[test]
    fn test_normalize_root_namespace() {
        let resolver = DottedPathResolver::default();
        assert_eq!(resolver.normalize("root.user.name"), "user.name");
        assert_eq!(resolver.normalize("root"), "");
        assert_eq!(resolver.normalize("user.name"), "user.name");
        assert_eq!(resolver.normalize("rooted.value"), "rooted.value");
        assert_eq!(
            resolver.parse_object_path("root.items[1]").unwrap(),
            resolver.parse_object_path("items[1]").unwrap()
        );

        let plain = DottedPathResolver::without_namespace();
        assert_eq!(plain.normalize("root.user"), "root.user");
        assert_eq!(DottedPathResolver::new(""), plain);
    }

    #[test]
    fn test_array_descendant() {
        assert!(p("items[0]").is_array_descendant_of(&p("items")));
        assert!(p("items[0].sub").is_array_descendant_of(&p("items")));
        assert!(p("grid[0][1]").is_array_descendant_of(&p("grid[0]")));
        assert!(!p("items.count").is_array_descendant_of(&p("items")));
        assert!(!p("otherArray[0]").is_array_descendant_of(&p("items")));
        assert!(!p("items").is_array_descendant_of(&p("items")));
        assert!(!p("a[0].b[1]").is_array_descendant_of(&p("a.b")));
        assert!(!p("items[0]").is_array_descendant_of(&ObjectPath::root()));
    }

    #[test]
    fn test_starts_with() {
        assert!(p("user.address.city").starts_with(&p("user")));
        assert!(p("items[3].name").starts_with(&p("items")));
        assert!(p("items[3].name").starts_with(&p("items[3]")));
        assert!(!p("items[2].name").starts_with(&p("items[3]")));
        assert!(!p("a[0].b").starts_with(&p("a.b")));
        assert!(!p("username").starts_with(&p("user")));
        assert!(p("anything").starts_with(&ObjectPath::root()));
    }

    #[test]
    fn test_matches_change() {
        let binding = p("items[0]");
        // array replaced, addressed by object path
        assert!(matches_change(&binding, "name", &p("items"), "length"));
        // array replaced, addressed as a property of the root
        assert!(matches_change(&binding, "name", &ObjectPath::root(), "items"));
        assert!(!matches_change(&binding, "name", &p("otherArray"), "length"));
        assert!(!matches_change(&binding, "name", &ObjectPath::root(), "otherArray"));

        assert!(matches_change(&p("user"), "name", &p("user"), "name"));
        assert!(!matches_change(&p("user"), "name", &p("user"), "email"));
        assert!(!matches_change(&p("user"), "name", &p("account"), "name"));
    }

    #[test]
    fn test_matches_subtree() {
        assert!(matches_subtree(&ObjectPath::root(), &p("x"), "y"));
        assert!(matches_subtree(&p("user"), &p("user.address"), "city"));
        assert!(matches_subtree(&p("user"), &ObjectPath::root(), "user"));
        assert!(!matches_subtree(&p("user"), &p("account"), "name"));
    }

    #[test]
    fn test_get_and_set_value() {
        let resolver = DottedPathResolver::default();
        let mut model = json!({"user": {"name": "Ada"}, "items": [{"name": "a"}]});

        assert_eq!(
            resolver.get_value_from_path(&model, "root.user.name"),
            Some(&json!("Ada"))
        );
        assert_eq!(
            resolver.get_value_from_path(&model, "items[0].name"),
            Some(&json!("a"))
        );
        assert_eq!(resolver.get_value_from_path(&model, "items[5].name"), None);

        let old = resolver
            .set_value_at_path(&mut model, "user.name", json!("Grace"))
            .unwrap();
        assert_eq!(old, json!("Ada"));

        resolver
            .set_value_at_path(&mut model, "items[1].name", json!("b"))
            .unwrap();
        resolver
            .set_value_at_path(&mut model, "settings.theme", json!("dark"))
            .unwrap();
        assert_eq!(model["items"][1]["name"], json!("b"));
        assert_eq!(model["settings"]["theme"], json!("dark"));

        assert!(resolver
            .set_value_at_path(&mut model, "items[9].name", json!("x"))
            .is_err());
        assert!(resolver
            .set_value_at_path(&mut model, "user.name.first", json!("x"))
            .is_err());
    }

    #[test]
    fn test_lookup_below_replaced_node() {
        let replaced = json!([{"name": "x"}, {"name": "y"}]);
        assert_eq!(
            p("items[1].name").lookup_below(&p("items"), &replaced),
            Some(&json!("y"))
        );
        assert_eq!(p("items[0]").lookup_below(&p("items"), &replaced), Some(&replaced[0]));
        assert_eq!(p("items[4].name").lookup_below(&p("items"), &replaced), None);
        assert_eq!(p("other[0]").lookup_below(&p("items"), &replaced), None);

        let grid = json!([[1, 2], [3, 4]]);
        assert_eq!(p("grid[1][0]").lookup_below(&p("grid"), &grid), Some(&json!(3)));
        assert_eq!(p("grid[1][0]").lookup_below(&p("grid[1]"), &grid[1]), Some(&json!(3)));

        let model = json!({"user": {"tags": ["a", "b"]}});
        assert_eq!(p("user.tags[1]").lookup(&model), Some(&json!("b")));
        assert_eq!(p("user").lookup_below(&p("user"), &model["user"]), Some(&model["user"]));
    }
}
