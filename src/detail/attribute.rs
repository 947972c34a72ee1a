use slotmap::{Key, SecondaryMap};

/// Which element class an attribute is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribOwner {
    Vertex,
    Point,
    Primitive,
}

/// A named scalar attribute on points or primitives.
///
/// Elements without an explicit value read the attribute's default.
#[derive(Debug, Clone)]
pub struct ScalarAttribute<K: Key> {
    default: f64,
    values: SecondaryMap<K, f64>,
}

impl<K: Key> ScalarAttribute<K> {
    /// Creates an attribute with the given default value.
    #[must_use]
    pub fn new(default: f64) -> Self {
        Self {
            default,
            values: SecondaryMap::new(),
        }
    }

    /// Returns the value for `key`, or the default.
    #[must_use]
    pub fn get(&self, key: K) -> f64 {
        self.values.get(key).copied().unwrap_or(self.default)
    }

    /// Sets the value for `key`.
    pub fn set(&mut self, key: K, value: f64) {
        self.values.insert(key, value);
    }

    /// Drops the value stored for `key`.
    pub fn remove(&mut self, key: K) {
        self.values.remove(key);
    }
}

/// A named scalar attribute on vertices, stored per primitive.
#[derive(Debug, Clone)]
pub struct VertexAttribute<K: Key> {
    default: f64,
    values: SecondaryMap<K, Vec<f64>>,
}

impl<K: Key> VertexAttribute<K> {
    /// Creates an attribute with the given default value.
    #[must_use]
    pub fn new(default: f64) -> Self {
        Self {
            default,
            values: SecondaryMap::new(),
        }
    }

    /// Returns the value of vertex `index` of primitive `prim`, or the default.
    #[must_use]
    pub fn get(&self, prim: K, index: usize) -> f64 {
        self.values
            .get(prim)
            .and_then(|v| v.get(index))
            .copied()
            .unwrap_or(self.default)
    }

    /// Sets the value of vertex `index` of a primitive with `vertex_count` vertices.
    pub fn set(&mut self, prim: K, vertex_count: usize, index: usize, value: f64) {
        let default = self.default;
        if !self.values.contains_key(prim) {
            self.values.insert(prim, vec![default; vertex_count]);
        }
        if let Some(values) = self.values.get_mut(prim) {
            if values.len() < vertex_count {
                values.resize(vertex_count, default);
            }
            if let Some(slot) = values.get_mut(index) {
                *slot = value;
            }
        }
    }

    /// Returns all vertex values of a primitive, if any were set.
    #[must_use]
    pub fn values(&self, prim: K) -> Option<&[f64]> {
        self.values.get(prim).map(Vec::as_slice)
    }

    /// Drops the values stored for `prim`.
    pub fn remove(&mut self, prim: K) {
        self.values.remove(prim);
    }
}
