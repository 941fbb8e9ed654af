use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex, RwLock};

use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::data_store::DataStore;
use crate::farm::Farm;
use crate::http_utils::store_error;
use crate::registry::SchemaRegistry;
use crate::schema::{enclosure_slug, tray_slug};
use crate::slug::Slug;

////////////////////////////////////////////// EntityType //////////////////////////////////////////

/// Descriptor for one concrete layout entity type.
///
/// Every schema entity that canonicalizes to the same slug shares one
/// descriptor, so a single descriptor serves every schema that mentions the
/// entity. The descriptor deliberately does not record a parent type: the
/// parent relation is resolved per request through [`LayoutResolver`],
/// because different farms may run different active layouts.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityType {
    /// Canonical entity name.
    pub name: Slug,
    /// Storage type name derived from the slug, e.g. `plant-site` becomes
    /// `PlantSite`. Used in default object names.
    pub type_name: String,
}

///////////////////////////////////////////// CatalogError /////////////////////////////////////////

/// Errors raised while building the entity catalog. Both are fatal at
/// startup.
#[derive(Debug)]
pub enum CatalogError {
    /// An entity name canonicalized to the empty slug.
    InvalidName(String),
    /// Two distinct entities derive the same storage type name.
    NameCollision {
        /// The contested type name.
        type_name: String,
        /// The entity that claimed the name first.
        first: Slug,
        /// The entity that collided with it.
        second: Slug,
    },
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CatalogError::InvalidName(name) => {
                write!(f, "{:?} does not canonicalize to a usable entity name", name)
            }
            CatalogError::NameCollision {
                type_name,
                first,
                second,
            } => write!(
                f,
                "entities {:?} and {:?} both derive the storage type name {:?}",
                first.as_str(),
                second.as_str(),
                type_name
            ),
        }
    }
}

impl std::error::Error for CatalogError {}

///////////////////////////////////////////// EntityCatalog ////////////////////////////////////////

struct CatalogInner {
    by_slug: BTreeMap<Slug, Arc<EntityType>>,
    by_type_name: BTreeMap<String, Slug>,
}

/// The process-wide cache of generated entity type descriptors.
///
/// Built once at startup over every entity of every registered schema, not
/// just the active one, because a root deployment serves farms with
/// different active layouts from one process. [`ensure`](EntityCatalog::ensure)
/// is idempotent: asking for the same entity twice hands back the identical
/// `Arc<EntityType>`.
pub struct EntityCatalog {
    inner: Mutex<CatalogInner>,
}

impl EntityCatalog {
    /// Creates a catalog holding only the two implicit entities, `enclosure`
    /// and `tray`.
    pub fn new() -> Self {
        let mut by_slug = BTreeMap::new();
        let mut by_type_name = BTreeMap::new();
        for slug in [enclosure_slug(), tray_slug()] {
            let descriptor = Arc::new(EntityType {
                name: slug.clone(),
                type_name: slug.type_name(),
            });
            by_type_name.insert(descriptor.type_name.clone(), slug.clone());
            by_slug.insert(slug, descriptor);
        }
        Self {
            inner: Mutex::new(CatalogInner {
                by_slug,
                by_type_name,
            }),
        }
    }

    /// Builds a catalog covering every entity of every schema in the
    /// registry.
    pub fn build(registry: &SchemaRegistry) -> Result<EntityCatalog, CatalogError> {
        let catalog = EntityCatalog::new();
        for schema in registry.all() {
            for entity in schema.chain() {
                catalog.ensure(entity.as_str())?;
            }
        }
        Ok(catalog)
    }

    /// Returns the descriptor for an entity, creating it on first use.
    ///
    /// The name is canonicalized first, so every spelling of the same entity
    /// shares one descriptor. Two distinct entities whose slugs derive the
    /// same storage type name are a fatal collision.
    ///
    /// # Returns
    /// * `Ok(descriptor)` - The (possibly pre-existing) descriptor
    /// * `Err(CatalogError::InvalidName)` - The name canonicalizes to nothing
    /// * `Err(CatalogError::NameCollision)` - Another entity owns the type name
    pub fn ensure(&self, name: &str) -> Result<Arc<EntityType>, CatalogError> {
        let slug = Slug::new(name).ok_or_else(|| CatalogError::InvalidName(name.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.by_slug.get(&slug) {
            return Ok(existing.clone());
        }
        let type_name = slug.type_name();
        if let Some(owner) = inner.by_type_name.get(&type_name) {
            return Err(CatalogError::NameCollision {
                type_name,
                first: owner.clone(),
                second: slug,
            });
        }
        let descriptor = Arc::new(EntityType {
            name: slug.clone(),
            type_name: type_name.clone(),
        });
        inner.by_type_name.insert(type_name, slug.clone());
        inner.by_slug.insert(slug, descriptor.clone());
        Ok(descriptor)
    }

    /// Looks up a descriptor without creating one. The name is
    /// canonicalized first.
    pub fn get(&self, name: &str) -> Option<Arc<EntityType>> {
        let slug = Slug::new(name)?;
        self.inner.lock().unwrap().by_slug.get(&slug).cloned()
    }

    /// Returns every known entity name in slug order.
    pub fn names(&self) -> Vec<Slug> {
        self.inner.lock().unwrap().by_slug.keys().cloned().collect()
    }

    /// Returns the number of known entity types.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_slug.len()
    }

    /// Returns true when nothing has been registered. Never true in
    /// practice: the implicit entities are always present.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().by_slug.is_empty()
    }
}

impl Default for EntityCatalog {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////// FarmScope ///////////////////////////////////////////

/// Identifies which farm a request operates on.
///
/// On a leaf there is exactly one farm and the scope is its slug. On a root
/// the scope comes from the request. The scope travels as an explicit
/// argument; nothing in the crate keeps an ambient current-farm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FarmScope(String);

impl FarmScope {
    /// Creates a scope from a farm slug.
    pub fn new(slug: impl Into<String>) -> FarmScope {
        FarmScope(slug.into())
    }

    /// Returns the farm slug.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FarmScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

///////////////////////////////////////////// ActiveLayouts ////////////////////////////////////////

/// The per-farm record of which schema governs each farm's layout.
///
/// A leaf holds one entry for its own farm; a root holds one per registered
/// farm. Entries are recorded when a farm configures itself. The
/// immutability of a configured farm's layout is enforced by the farm save
/// path, not here; `record` itself overwrites freely so the save path can
/// re-record the same value.
pub struct ActiveLayouts {
    layouts: RwLock<HashMap<FarmScope, Slug>>,
}

impl ActiveLayouts {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            layouts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the active schema name for a farm, if one has been recorded.
    pub fn get(&self, scope: &FarmScope) -> Option<Slug> {
        self.layouts.read().unwrap().get(scope).cloned()
    }

    /// Records the active schema for a farm.
    pub fn record(&self, scope: FarmScope, layout: Slug) {
        self.layouts.write().unwrap().insert(scope, layout);
    }
}

impl Default for ActiveLayouts {
    fn default() -> Self {
        Self::new()
    }
}

//////////////////////////////////////////// LayoutResolver ////////////////////////////////////////

/// Answers layout tree questions for a given farm.
///
/// Resolution happens at access time against whatever layout the farm has
/// active, never at entity generation time, so one [`EntityType`] serves
/// every schema. `None` answers mean "no relation available", which is a
/// normal state on an unconfigured leaf, not an error.
#[derive(Clone)]
pub struct LayoutResolver {
    registry: Arc<SchemaRegistry>,
    layouts: Arc<ActiveLayouts>,
}

impl LayoutResolver {
    /// Creates a resolver over a registry and the active-layout map.
    pub fn new(registry: Arc<SchemaRegistry>, layouts: Arc<ActiveLayouts>) -> Self {
        Self { registry, layouts }
    }

    /// Returns the name of the schema active for a farm.
    pub fn active_schema_name(&self, scope: &FarmScope) -> Option<Slug> {
        let name = self.layouts.get(scope)?;
        // Tolerate a recorded layout that no longer matches a registered
        // schema rather than panicking a request.
        self.registry.get(name.as_str())?;
        Some(name)
    }

    /// Returns the parent entity type of `entity` under the farm's active
    /// layout. `None` when no layout is active, the entity is not part of
    /// it, or the entity is the root.
    pub fn parent_type_of(&self, scope: &FarmScope, entity: &str) -> Option<Slug> {
        let name = self.layouts.get(scope)?;
        let schema = self.registry.get(name.as_str())?;
        schema.parent_of(entity).cloned()
    }

    /// Returns the child entity type of `entity` under the farm's active
    /// layout. `None` when no layout is active, the entity is not part of
    /// it, or the entity is `tray`.
    pub fn child_type_of(&self, scope: &FarmScope, entity: &str) -> Option<Slug> {
        let name = self.layouts.get(scope)?;
        let schema = self.registry.get(name.as_str())?;
        schema.child_of(entity).cloned()
    }

    /// Returns true when the entity participates in the farm's active
    /// layout.
    pub fn entity_in_active_layout(&self, scope: &FarmScope, entity: &str) -> bool {
        let Some(name) = self.layouts.get(scope) else {
            return false;
        };
        match self.registry.get(name.as_str()) {
            Some(schema) => schema.contains(entity),
            None => false,
        }
    }
}

///////////////////////////////////////////// LayoutObject /////////////////////////////////////////

/// The common storage shape shared by every generated layout entity type.
///
/// `super_id` is the primary key shared across all entity types, so a
/// parent reference can point at any type and be checked against the
/// resolver at access time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutObject {
    /// Primary key, shared across every entity type.
    pub super_id: u64,
    /// Canonical name of the entity type this object belongs to.
    pub entity_type: Slug,
    /// Display name. Defaults to `"{farm} {Type} {id}"` on first save when
    /// left empty.
    pub name: String,
    /// Origin within the parent, meters.
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Extent, meters.
    pub length: f64,
    pub width: f64,
    pub height: f64,
    /// Optional 3-D model for presentation.
    pub model_id: Option<u64>,
    /// Super-id of the containing object. The expected type of the target
    /// is resolved through [`LayoutResolver`] when the reference is checked.
    pub parent: Option<u64>,
}

/// Client-supplied fields of a layout object. Everything is optional;
/// omitted numbers default to zero.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutObjectBody {
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub model_id: Option<u64>,
    pub parent: Option<u64>,
}

/////////////////////////////////////////////// Model3D ////////////////////////////////////////////

/// A 3-D model layout objects can reference for presentation.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Model3D {
    /// Assigned by the store on creation.
    pub id: u64,
    pub name: String,
    /// Path of the model file.
    pub file: String,
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

///////////////////////////////////////////// LayoutState //////////////////////////////////////////

/// Shared state for the layout routes.
#[derive(Clone)]
pub struct LayoutState {
    pub store: Arc<dyn DataStore>,
    pub catalog: Arc<EntityCatalog>,
    pub resolver: LayoutResolver,
}

////////////////////////////////////////////// Routes //////////////////////////////////////////////

/// Optional `?farm=` selector carried by scoped layout requests.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub farm: Option<String>,
}

/// Index of the layout surface: the active schema and the entity types on
/// offer.
#[derive(Debug, Serialize, Deserialize)]
pub struct LayoutIndex {
    /// Schema active for the requesting farm, if configured.
    pub active_layout: Option<Slug>,
    /// Entity names, in chain order when a layout is active, otherwise
    /// every catalog entry alphabetically.
    pub entities: Vec<Slug>,
}

/// Resolves the farm a request operates on: the `?farm=` selector when
/// given, otherwise the leaf's own farm.
fn scoped_farm(state: &LayoutState, query: &ScopeQuery) -> Result<Farm, (StatusCode, String)> {
    let Some(raw) = &query.farm else {
        return state.store.get_local_farm().map_err(store_error);
    };
    let slug = Slug::new(raw).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("{:?} is not a usable farm name", raw),
        )
    })?;
    let local = state.store.get_local_farm().map_err(store_error)?;
    if local.slug == slug.as_str() {
        return Ok(local);
    }
    let registered = state.store.list_registered_farms().map_err(store_error)?;
    registered
        .into_iter()
        .find(|farm| farm.slug == slug.as_str())
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no farm named {:?}", slug.as_str()),
            )
        })
}

fn display_name(farm: &Farm) -> String {
    match &farm.name {
        Some(name) => name.clone(),
        None => farm.slug.clone(),
    }
}

/// Checks a body's parent reference against the farm's active layout.
fn check_parent(
    state: &LayoutState,
    scope: &FarmScope,
    entity: &Slug,
    parent: Option<u64>,
) -> Result<(), (StatusCode, String)> {
    let Some(parent_id) = parent else {
        return Ok(());
    };
    let Some(active) = state.resolver.active_schema_name(scope) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("farm {:?} has no active layout", scope.as_str()),
        ));
    };
    if !state.resolver.entity_in_active_layout(scope, entity.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "{} is not part of the {} layout",
                entity.as_str(),
                active.as_str()
            ),
        ));
    }
    let Some(expected) = state.resolver.parent_type_of(scope, entity.as_str()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} objects do not take a parent", entity.as_str()),
        ));
    };
    let parent_obj = state
        .store
        .get_layout_object(parent_id)
        .map_err(store_error)?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("parent {} does not exist", parent_id),
            )
        })?;
    if parent_obj.entity_type != expected {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "the parent of a {} must be a {}, but {} is a {}",
                entity.as_str(),
                expected.as_str(),
                parent_id,
                parent_obj.entity_type.as_str()
            ),
        ));
    }
    Ok(())
}

/// Checks a body's model reference exists.
fn check_model(state: &LayoutState, model_id: Option<u64>) -> Result<(), (StatusCode, String)> {
    let Some(model_id) = model_id else {
        return Ok(());
    };
    state
        .store
        .get_model(model_id)
        .map_err(store_error)?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("model {} does not exist", model_id),
            )
        })?;
    Ok(())
}

/// Gets the layout index for the requesting farm.
async fn layout_index(
    State(state): State<LayoutState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<LayoutIndex>, (StatusCode, String)> {
    let farm = scoped_farm(&state, &query)?;
    let scope = FarmScope::new(farm.slug.clone());
    let active = state.resolver.active_schema_name(&scope);
    let entities = match &active {
        Some(name) => match state.resolver.registry.get(name.as_str()) {
            Some(schema) => schema.chain(),
            None => state.catalog.names(),
        },
        None => state.catalog.names(),
    };
    Ok(Json(LayoutIndex {
        active_layout: active,
        entities,
    }))
}

/// Lists every object of one entity type.
async fn list_layout_objects(
    State(state): State<LayoutState>,
    UrlPath(entity): UrlPath<String>,
) -> Result<Json<Vec<LayoutObject>>, (StatusCode, String)> {
    let Some(descriptor) = state.catalog.get(&entity) else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("{:?} is not a known entity type", entity),
        ));
    };
    state
        .store
        .list_layout_objects(&descriptor.name)
        .map(Json)
        .map_err(store_error)
}

/// Creates an object of one entity type under the farm's active layout.
async fn create_layout_object(
    State(state): State<LayoutState>,
    UrlPath(entity): UrlPath<String>,
    Query(query): Query<ScopeQuery>,
    Json(body): Json<LayoutObjectBody>,
) -> Result<Json<LayoutObject>, (StatusCode, String)> {
    let Some(descriptor) = state.catalog.get(&entity) else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("{:?} is not a known entity type", entity),
        ));
    };
    let farm = scoped_farm(&state, &query)?;
    let scope = FarmScope::new(farm.slug.clone());
    let Some(active) = state.resolver.active_schema_name(&scope) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("farm {:?} has no active layout", farm.slug),
        ));
    };
    if !state
        .resolver
        .entity_in_active_layout(&scope, descriptor.name.as_str())
    {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "{} is not part of the {} layout",
                descriptor.name.as_str(),
                active.as_str()
            ),
        ));
    }
    check_parent(&state, &scope, &descriptor.name, body.parent)?;
    check_model(&state, body.model_id)?;
    let object = LayoutObject {
        super_id: 0,
        entity_type: descriptor.name.clone(),
        name: body.name.unwrap_or_default(),
        x: body.x,
        y: body.y,
        z: body.z,
        length: body.length,
        width: body.width,
        height: body.height,
        model_id: body.model_id,
        parent: body.parent,
    };
    state
        .store
        .create_layout_object(object, &display_name(&farm))
        .map(Json)
        .map_err(store_error)
}

/// Fetches an object, insisting the path's entity type matches.
fn object_of_type(
    state: &LayoutState,
    entity: &str,
    id: u64,
) -> Result<LayoutObject, (StatusCode, String)> {
    let Some(descriptor) = state.catalog.get(entity) else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("{:?} is not a known entity type", entity),
        ));
    };
    let object = state
        .store
        .get_layout_object(id)
        .map_err(store_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no {} with id {}", descriptor.name.as_str(), id),
            )
        })?;
    if object.entity_type != descriptor.name {
        return Err((
            StatusCode::NOT_FOUND,
            format!("{} is not a {}", id, descriptor.name.as_str()),
        ));
    }
    Ok(object)
}

/// Gets one object by id.
async fn get_layout_object_by_id(
    State(state): State<LayoutState>,
    UrlPath((entity, id)): UrlPath<(String, u64)>,
) -> Result<Json<LayoutObject>, (StatusCode, String)> {
    object_of_type(&state, &entity, id).map(Json)
}

/// Replaces the client-supplied fields of one object.
async fn update_layout_object_by_id(
    State(state): State<LayoutState>,
    UrlPath((entity, id)): UrlPath<(String, u64)>,
    Query(query): Query<ScopeQuery>,
    Json(body): Json<LayoutObjectBody>,
) -> Result<Json<LayoutObject>, (StatusCode, String)> {
    let existing = object_of_type(&state, &entity, id)?;
    let farm = scoped_farm(&state, &query)?;
    let scope = FarmScope::new(farm.slug.clone());
    check_parent(&state, &scope, &existing.entity_type, body.parent)?;
    check_model(&state, body.model_id)?;
    let name = match body.name {
        Some(name) if !name.is_empty() => name,
        _ => existing.name.clone(),
    };
    let updated = LayoutObject {
        super_id: existing.super_id,
        entity_type: existing.entity_type.clone(),
        name,
        x: body.x,
        y: body.y,
        z: body.z,
        length: body.length,
        width: body.width,
        height: body.height,
        model_id: body.model_id,
        parent: body.parent,
    };
    state
        .store
        .update_layout_object(updated)
        .map(Json)
        .map_err(store_error)
}

/// Deletes one object. Objects that still contain children refuse to go.
async fn delete_layout_object_by_id(
    State(state): State<LayoutState>,
    UrlPath((entity, id)): UrlPath<(String, u64)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let existing = object_of_type(&state, &entity, id)?;
    match state.store.delete_layout_object(existing.super_id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            format!("no object with id {}", existing.super_id),
        )),
        Err(err) => Err(store_error(err)),
    }
}

/// Lists every 3-D model.
async fn list_models(
    State(state): State<LayoutState>,
) -> Result<Json<Vec<Model3D>>, (StatusCode, String)> {
    state.store.list_models().map(Json).map_err(store_error)
}

/// Creates a 3-D model.
async fn create_model(
    State(state): State<LayoutState>,
    Json(model): Json<Model3D>,
) -> Result<Json<Model3D>, (StatusCode, String)> {
    if model.name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "a model needs a name".to_string()));
    }
    if model.file.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "a model needs a file".to_string()));
    }
    state.store.create_model(model).map(Json).map_err(store_error)
}

/// Gets one model by id.
async fn get_model_by_id(
    State(state): State<LayoutState>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<Model3D>, (StatusCode, String)> {
    state
        .store
        .get_model(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no model with id {}", id)))
}

/// Replaces one model by id.
async fn update_model_by_id(
    State(state): State<LayoutState>,
    UrlPath(id): UrlPath<u64>,
    Json(mut model): Json<Model3D>,
) -> Result<Json<Model3D>, (StatusCode, String)> {
    if model.name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "a model needs a name".to_string()));
    }
    if model.file.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "a model needs a file".to_string()));
    }
    model.id = id;
    state.store.update_model(model).map(Json).map_err(store_error)
}

/// Deletes one model. Models still referenced by layout objects refuse to
/// go.
async fn delete_model_by_id(
    State(state): State<LayoutState>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.store.delete_model(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((StatusCode::NOT_FOUND, format!("no model with id {}", id))),
        Err(err) => Err(store_error(err)),
    }
}

////////////////////////////////////////////// Router //////////////////////////////////////////////

/// Creates an Axum router for the layout surface.
///
/// # Routes
/// - `GET /layout` - Active schema and entity types for the requesting farm
/// - `GET /layout/:entity` - List objects of one entity type
/// - `POST /layout/:entity` - Create an object under the active layout
/// - `GET /layout/:entity/:id` - Get one object
/// - `PUT /layout/:entity/:id` - Replace one object
/// - `DELETE /layout/:entity/:id` - Delete one object
/// - `GET /model3d`, `POST /model3d` - List and create 3-D models
/// - `GET /model3d/:id`, `PUT /model3d/:id`, `DELETE /model3d/:id`
///
/// Scoped routes accept `?farm=<slug>`; without it the leaf's own farm is
/// assumed.
pub fn create_layout_router(state: LayoutState) -> Router {
    Router::new()
        .route("/layout", get(layout_index))
        .route(
            "/layout/:entity",
            get(list_layout_objects).post(create_layout_object),
        )
        .route(
            "/layout/:entity/:id",
            get(get_layout_object_by_id)
                .put(update_layout_object_by_id)
                .delete(delete_layout_object_by_id),
        )
        .route("/model3d", get(list_models).post(create_model))
        .route(
            "/model3d/:id",
            get(get_model_by_id)
                .put(update_model_by_id)
                .delete(delete_model_by_id),
        )
        .with_state(state)
}
