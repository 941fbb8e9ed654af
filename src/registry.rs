use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::{LayoutSchema, SchemaError, Slug};

///////////////////////////////////////////// RegistryError /////////////////////////////////////////

/// Errors raised while assembling the schema registry at startup.
///
/// Any registry error aborts startup; the process never serves with a
/// partially loaded registry.
#[derive(Debug)]
pub enum RegistryError {
    /// Two schemata canonicalize to the same name.
    DuplicateName(String),
    /// A schemata directory or file could not be read.
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying error message.
        message: String,
    },
    /// A schema document failed to parse or validate.
    Schema {
        /// The file that carried the schema.
        path: PathBuf,
        /// The validation error.
        source: SchemaError,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RegistryError::DuplicateName(name) => {
                write!(f, "a schema named {:?} is already registered", name)
            }
            RegistryError::Io { path, message } => {
                write!(f, "could not read {}: {}", path.display(), message)
            }
            RegistryError::Schema { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

//////////////////////////////////////////// SchemaRegistry ////////////////////////////////////////

/// The set of layout schemata known to this server.
///
/// The registry is populated once at startup, either file by file through
/// [`register`](SchemaRegistry::register) or wholesale through
/// [`load_dir`](SchemaRegistry::load_dir), and then shared behind an `Arc`.
/// Nothing mutates it afterwards: both mutators take `&mut self`, so a
/// shared registry is immutable by construction.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemata: BTreeMap<Slug, LayoutSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            schemata: BTreeMap::new(),
        }
    }

    /// Adds a schema to the registry.
    ///
    /// # Returns
    /// * `Ok(())` - Schema registered
    /// * `Err(RegistryError::DuplicateName)` - A schema with this name is
    ///   already registered
    pub fn register(&mut self, schema: LayoutSchema) -> Result<(), RegistryError> {
        if self.schemata.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateName(schema.name.to_string()));
        }
        self.schemata.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Loads every schema document in a directory.
    ///
    /// Files with a `.yaml` or `.yml` extension are parsed with the file
    /// stem as the default schema name; other files are ignored. Files are
    /// visited in path order so failures are deterministic. The first bad
    /// document fails the whole load.
    pub fn load_dir(dir: &Path) -> Result<SchemaRegistry, RegistryError> {
        let mut registry = SchemaRegistry::new();
        let entries = fs::read_dir(dir).map_err(|e| RegistryError::Io {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::Io {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let content = fs::read_to_string(&path).map_err(|e| RegistryError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let schema = LayoutSchema::parse_with_name(&stem, &content)
                .map_err(|source| RegistryError::Schema {
                    path: path.clone(),
                    source,
                })?;
            registry.register(schema)?;
        }

        Ok(registry)
    }

    /// Looks up a schema by name. The name is canonicalized first.
    pub fn get(&self, name: &str) -> Option<&LayoutSchema> {
        let key = Slug::new(name)?;
        self.schemata.get(&key)
    }

    /// Returns all schemata in name order.
    pub fn all(&self) -> impl Iterator<Item = &LayoutSchema> {
        self.schemata.values()
    }

    /// Returns the registered schema names in order.
    pub fn names(&self) -> Vec<Slug> {
        self.schemata.keys().cloned().collect()
    }

    /// Returns the number of registered schemata.
    pub fn len(&self) -> usize {
        self.schemata.len()
    }

    /// Returns true when no schemata are registered.
    pub fn is_empty(&self) -> bool {
        self.schemata.is_empty()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////// Routes //////////////////////////////////////////////

/// List item for registered schemata.
#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaListItem {
    /// Canonical schema name.
    pub name: Slug,
    /// The entity `tray` hangs beneath.
    #[serde(rename = "tray-parent")]
    pub tray_parent: Slug,
    /// Entity names in chain order, root first.
    pub entities: Vec<Slug>,
}

impl From<&LayoutSchema> for SchemaListItem {
    fn from(schema: &LayoutSchema) -> Self {
        SchemaListItem {
            name: schema.name.clone(),
            tray_parent: schema.tray_parent.clone(),
            entities: schema.chain(),
        }
    }
}

/// Lists all registered schemata.
async fn list_schemata(State(registry): State<Arc<SchemaRegistry>>) -> Json<Vec<SchemaListItem>> {
    Json(registry.all().map(SchemaListItem::from).collect())
}

/// Gets a schema by name.
async fn get_schema(
    State(registry): State<Arc<SchemaRegistry>>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<LayoutSchema>, (StatusCode, &'static str)> {
    match registry.get(&name) {
        Some(schema) => Ok(Json(schema.clone())),
        None => Err((StatusCode::NOT_FOUND, "schema not found")),
    }
}

////////////////////////////////////////////// Router //////////////////////////////////////////////

/// Creates an Axum router with read-only schema registry endpoints.
///
/// # Routes
/// - `GET /schema` - List all registered schemata
/// - `GET /schema/:name` - Get a schema by name
pub fn create_schema_router(registry: Arc<SchemaRegistry>) -> Router {
    Router::new()
        .route("/schema", get(list_schemata))
        .route("/schema/:name", get(get_schema))
        .with_state(registry)
}
