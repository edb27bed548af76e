//! Publication and collection registries.
//!
//! Everything is registered on a [`RegistryBuilder`] during startup and then
//! frozen into an immutable [`Registry`], which is shared by all connections
//! and read without locks.

mod method;

pub use method::{CollectionMethod, FnMethod, MethodContext, Methods};

use crate::error::{CoreError, CoreResult};
use crate::query::{PublicationOptions, Query};
use livedata_codec::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Produces the query of a publication from subscription params.
pub type QueryFn = Arc<dyn Fn(&Value) -> Query + Send + Sync>;

/// A named, parameterized query definition.
#[derive(Clone)]
pub struct Publication {
    name: String,
    produce: QueryFn,
}

impl Publication {
    /// Returns the publication name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the query for one subscription.
    pub fn query(&self, params: &Value) -> Query {
        (self.produce)(params)
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A registered collection and its method table.
#[derive(Debug, Clone)]
pub struct CollectionDef {
    name: String,
    methods: Methods,
}

impl CollectionDef {
    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a method.
    pub fn method(&self, name: &str) -> Option<&Arc<dyn CollectionMethod>> {
        self.methods.get(name)
    }

    /// Returns the method table.
    pub fn methods(&self) -> &Methods {
        &self.methods
    }
}

/// Collects registrations before the server starts.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    publications: BTreeMap<String, Publication>,
    collections: BTreeMap<String, CollectionDef>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a publication backed by a query function.
    pub fn register_publication<F>(&mut self, name: impl Into<String>, produce: F) -> CoreResult<()>
    where
        F: Fn(&Value) -> Query + Send + Sync + 'static,
    {
        let name = name.into();
        if self.publications.contains_key(&name) {
            return Err(CoreError::DuplicatePublication { name });
        }
        debug!(publication = %name, "publication registered");
        self.publications.insert(
            name.clone(),
            Publication {
                name,
                produce: Arc::new(produce),
            },
        );
        Ok(())
    }

    /// Publishes a registered collection with the given options.
    ///
    /// The collection defaults to the one named like the publication.
    pub fn publish(&mut self, name: impl Into<String>, options: PublicationOptions) -> CoreResult<()> {
        let name = name.into();
        let collection = options.collection.clone().unwrap_or_else(|| name.clone());
        if !self.collections.contains_key(&collection) {
            return Err(CoreError::UnknownCollection { name: collection });
        }
        self.register_publication(name, move |params| options.query(&collection, params))
    }

    /// Registers a collection and its method table.
    pub fn register_collection(&mut self, name: impl Into<String>, methods: Methods) -> CoreResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::AnonymousCollection);
        }
        if self.collections.contains_key(&name) {
            return Err(CoreError::DuplicateCollection { name });
        }
        debug!(collection = %name, methods = methods.len(), "collection registered");
        self.collections
            .insert(name.clone(), CollectionDef { name, methods });
        Ok(())
    }

    /// Freezes the registrations.
    pub fn build(self) -> Registry {
        Registry {
            publications: self.publications,
            collections: self.collections,
        }
    }
}

/// Immutable set of publications and collections.
#[derive(Debug, Default)]
pub struct Registry {
    publications: BTreeMap<String, Publication>,
    collections: BTreeMap<String, CollectionDef>,
}

impl Registry {
    /// Creates a builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up a publication by name.
    pub fn lookup(&self, name: &str) -> Option<&Publication> {
        self.publications.get(name)
    }

    /// Looks up a collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.get(name)
    }

    /// Returns publication names in order.
    pub fn publication_names(&self) -> impl Iterator<Item = &str> {
        self.publications.keys().map(String::as_str)
    }

    /// Returns collection names in order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}
