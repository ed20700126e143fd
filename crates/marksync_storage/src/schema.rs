//! Collection definitions and the schema registry.
//!
//! Both the device-local and the canonical schema are declared as a
//! [`Registry`] of [`CollectionDef`]s. The registry is built once at
//! startup and validated for internal consistency; nothing walks
//! collection metadata dynamically after that.

use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;

/// The type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean.
    Bool,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// Arbitrary structured JSON.
    Json,
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name.
    pub name: &'static str,
    /// Field type.
    pub field_type: FieldType,
    /// Whether the field may be absent.
    pub optional: bool,
}

/// A declared foreign-key edge from a field to another collection.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// The field carrying the foreign key.
    pub field: &'static str,
    /// The collection the key points into.
    pub target: &'static str,
}

/// How rows of a collection are identified.
#[derive(Debug, Clone)]
pub enum PrimaryKey {
    /// Store-assigned `u64` in the `id` field, returned from `create`.
    AutoId,
    /// Natural key composed of the named fields.
    Fields(&'static [&'static str]),
}

/// Definition of a single collection.
#[derive(Debug, Clone)]
pub struct CollectionDef {
    /// Collection name.
    pub name: &'static str,
    /// Primary key strategy.
    pub pk: PrimaryKey,
    /// Declared fields. The `id` field of auto-id collections is implicit.
    pub fields: Vec<FieldDef>,
    /// Declared relationship edges.
    pub relationships: Vec<Relationship>,
}

impl CollectionDef {
    /// Creates a new collection definition.
    pub fn new(name: &'static str, pk: PrimaryKey) -> Self {
        Self {
            name,
            pk,
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Adds a required field.
    pub fn field(mut self, name: &'static str, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name,
            field_type,
            optional: false,
        });
        self
    }

    /// Adds an optional field.
    pub fn field_opt(mut self, name: &'static str, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name,
            field_type,
            optional: true,
        });
        self
    }

    /// Adds a relationship edge. The field itself must also be declared.
    pub fn relationship(mut self, field: &'static str, target: &'static str) -> Self {
        self.relationships.push(Relationship { field, target });
        self
    }

    /// Returns true if the collection uses a store-assigned id.
    pub fn is_auto_id(&self) -> bool {
        matches!(self.pk, PrimaryKey::AutoId)
    }

    /// Returns the declared field with the given name.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the field is known to this collection.
    ///
    /// `id` is always known; it is implicit for auto-id collections and
    /// allowed as a declared field otherwise.
    pub fn has_field(&self, name: &str) -> bool {
        name == "id" || self.field_def(name).is_some()
    }
}

/// The full set of collections for one store.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    collections: BTreeMap<&'static str, CollectionDef>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from definitions and validates it.
    pub fn from_defs(defs: Vec<CollectionDef>) -> StorageResult<Self> {
        let mut registry = Self::new();
        for def in defs {
            registry.collections.insert(def.name, def);
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Returns the definition for a collection.
    pub fn get(&self, name: &str) -> StorageResult<&CollectionDef> {
        self.collections
            .get(name)
            .ok_or_else(|| StorageError::UnknownCollection(name.into()))
    }

    /// Returns true if the collection is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Iterates over all collection definitions.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionDef> {
        self.collections.values()
    }

    /// Returns the number of declared collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Returns true if no collections are declared.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Checks internal consistency: natural-key fields must be declared
    /// and relationship edges must name declared fields and collections.
    pub fn validate(&self) -> StorageResult<()> {
        for def in self.collections.values() {
            if let PrimaryKey::Fields(fields) = &def.pk {
                for field in *fields {
                    if !def.has_field(field) {
                        return Err(StorageError::UnknownField {
                            collection: def.name.into(),
                            field: (*field).into(),
                        });
                    }
                }
            }
            for rel in &def.relationships {
                if !def.has_field(rel.field) {
                    return Err(StorageError::UnknownField {
                        collection: def.name.into(),
                        field: rel.field.into(),
                    });
                }
                if !self.collections.contains_key(rel.target) {
                    return Err(StorageError::InvalidRelationship {
                        collection: def.name.into(),
                        field: rel.field.into(),
                        target: rel.target.into(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> CollectionDef {
        CollectionDef::new("pages", PrimaryKey::Fields(&["url"]))
            .field("url", FieldType::Text)
            .field_opt("title", FieldType::Text)
    }

    #[test]
    fn registry_lookup() {
        let registry = Registry::from_defs(vec![pages()]).unwrap();
        assert!(registry.contains("pages"));
        assert!(registry.get("pages").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(StorageError::UnknownCollection(_))
        ));
    }

    #[test]
    fn natural_key_fields_must_be_declared() {
        let bad = CollectionDef::new("tags", PrimaryKey::Fields(&["name", "url"]))
            .field("name", FieldType::Text);
        let result = Registry::from_defs(vec![bad]);
        assert!(matches!(result, Err(StorageError::UnknownField { .. })));
    }

    #[test]
    fn relationship_target_must_exist() {
        let bad = CollectionDef::new("entries", PrimaryKey::AutoId)
            .field("list", FieldType::Int)
            .relationship("list", "lists");
        let result = Registry::from_defs(vec![bad]);
        assert!(matches!(
            result,
            Err(StorageError::InvalidRelationship { .. })
        ));
    }

    #[test]
    fn relationship_resolves_when_target_declared() {
        let lists = CollectionDef::new("lists", PrimaryKey::AutoId).field("name", FieldType::Text);
        let entries = CollectionDef::new("entries", PrimaryKey::AutoId)
            .field("list", FieldType::Int)
            .relationship("list", "lists");
        let registry = Registry::from_defs(vec![lists, entries]).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn id_is_always_a_known_field() {
        let def = CollectionDef::new("lists", PrimaryKey::AutoId).field("name", FieldType::Text);
        assert!(def.has_field("id"));
        assert!(def.has_field("name"));
        assert!(!def.has_field("title"));
    }
}
