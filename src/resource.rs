//! Resource taxonomy: the broad categories of matter and energy a farm
//! manages, the measurable properties of each, and the concrete resources
//! instruments attach to.
//!
//! Sensor and actuator types bind to a resource type through its
//! properties, so the taxonomy is the hinge between the layout tree and
//! the instrument surface. A stock taxonomy (air, water, light) is
//! installed at startup and rejects mutation; everything user-created is
//! fair game.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::data_store::{DataStore, DataStoreError};
use crate::http_utils::store_error;

////////////////////////////////////////////// Entities ////////////////////////////////////////////

/// A broad category of matter or energy, e.g. air or water.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceType {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Unique across all resource types.
    pub name: String,
    /// Stock entries are installed at startup and reject mutation.
    pub read_only: bool,
}

/// A measurable or controllable property of a resource type.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceProperty {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Short code, unique within the resource type, e.g. `temp`.
    pub code: String,
    /// Display name, unique within the resource type.
    pub name: String,
    /// The resource type this property belongs to. Immutable after
    /// creation.
    pub resource_type: u64,
    pub read_only: bool,
}

/// A concrete body of a resource type, optionally placed in the layout.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Ordinal among resources of the same type, 1-based, assigned on
    /// creation and never reused.
    pub index: u64,
    /// Defaults to `"{type} Resource {index}"` when left empty.
    pub name: String,
    /// The resource type. Immutable after creation.
    pub resource_type: u64,
    /// Super-id of the layout object holding this resource.
    pub location: Option<u64>,
}

/////////////////////////////////////////////// Seeds //////////////////////////////////////////////

/// The stock taxonomy every server starts with.
const DEFAULT_TAXONOMY: &[(&str, &[(&str, &str)])] = &[
    ("Air", &[("temp", "Temperature"), ("humid", "Humidity")]),
    (
        "Water",
        &[
            ("temp", "Temperature"),
            ("ph", "pH"),
            ("ec", "Electrical Conductivity"),
        ],
    ),
    ("Light", &[("inten", "Intensity")]),
];

/// Installs the stock resource taxonomy into a fresh store.
///
/// Every seeded entry is read-only. An `AlreadyExists` from the store means
/// the store was seeded before.
pub fn install_default_resources(store: &dyn DataStore) -> Result<(), DataStoreError> {
    for &(type_name, properties) in DEFAULT_TAXONOMY {
        let rt = store.create_resource_type(ResourceType {
            id: 0,
            name: type_name.to_string(),
            read_only: true,
        })?;
        for &(code, name) in properties {
            store.create_resource_property(ResourceProperty {
                id: 0,
                code: code.to_string(),
                name: name.to_string(),
                resource_type: rt.id,
                read_only: true,
            })?;
        }
    }
    Ok(())
}

////////////////////////////////////////////// Handlers ////////////////////////////////////////////

/// Lists every resource type.
async fn list_resource_types(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<ResourceType>>, (StatusCode, String)> {
    store.list_resource_types().map(Json).map_err(store_error)
}

/// Creates a resource type. The read-only flag is reserved for stock
/// entries and forced off.
async fn create_resource_type(
    State(store): State<Arc<dyn DataStore>>,
    Json(mut rt): Json<ResourceType>,
) -> Result<Json<ResourceType>, (StatusCode, String)> {
    rt.read_only = false;
    store.create_resource_type(rt).map(Json).map_err(store_error)
}

/// Gets one resource type by id.
async fn get_resource_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<ResourceType>, (StatusCode, String)> {
    store
        .get_resource_type(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no resource type with id {}", id),
            )
        })
}

/// Renames one resource type by id.
async fn update_resource_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut rt): Json<ResourceType>,
) -> Result<Json<ResourceType>, (StatusCode, String)> {
    rt.id = id;
    store.update_resource_type(rt).map(Json).map_err(store_error)
}

/// Deletes one resource type by id.
async fn delete_resource_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_resource_type(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            format!("no resource type with id {}", id),
        )),
        Err(err) => Err(store_error(err)),
    }
}

/// Lists every resource property.
async fn list_resource_properties(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<ResourceProperty>>, (StatusCode, String)> {
    store
        .list_resource_properties()
        .map(Json)
        .map_err(store_error)
}

/// Creates a resource property under an existing resource type.
async fn create_resource_property(
    State(store): State<Arc<dyn DataStore>>,
    Json(mut property): Json<ResourceProperty>,
) -> Result<Json<ResourceProperty>, (StatusCode, String)> {
    property.read_only = false;
    store
        .create_resource_property(property)
        .map(Json)
        .map_err(store_error)
}

/// Gets one resource property by id.
async fn get_resource_property_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<ResourceProperty>, (StatusCode, String)> {
    store
        .get_resource_property(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no resource property with id {}", id),
            )
        })
}

/// Updates one resource property by id. The owning resource type cannot
/// change.
async fn update_resource_property_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut property): Json<ResourceProperty>,
) -> Result<Json<ResourceProperty>, (StatusCode, String)> {
    property.id = id;
    store
        .update_resource_property(property)
        .map(Json)
        .map_err(store_error)
}

/// Deletes one resource property by id.
async fn delete_resource_property_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_resource_property(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            format!("no resource property with id {}", id),
        )),
        Err(err) => Err(store_error(err)),
    }
}

/// Lists every resource.
async fn list_resources(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<Resource>>, (StatusCode, String)> {
    store.list_resources().map(Json).map_err(store_error)
}

/// Creates a resource of an existing resource type.
async fn create_resource(
    State(store): State<Arc<dyn DataStore>>,
    Json(resource): Json<Resource>,
) -> Result<Json<Resource>, (StatusCode, String)> {
    store.create_resource(resource).map(Json).map_err(store_error)
}

/// Gets one resource by id.
async fn get_resource_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<Resource>, (StatusCode, String)> {
    store
        .get_resource(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no resource with id {}", id)))
}

/// Updates one resource by id. The resource type cannot change.
async fn update_resource_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut resource): Json<Resource>,
) -> Result<Json<Resource>, (StatusCode, String)> {
    resource.id = id;
    store.update_resource(resource).map(Json).map_err(store_error)
}

/// Deletes one resource by id.
async fn delete_resource_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_resource(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((StatusCode::NOT_FOUND, format!("no resource with id {}", id))),
        Err(err) => Err(store_error(err)),
    }
}

////////////////////////////////////////////// Router //////////////////////////////////////////////

/// Creates an Axum router for the resource taxonomy.
///
/// # Routes
/// - `GET /resourcetype`, `POST /resourcetype`
/// - `GET /resourcetype/:id`, `PUT /resourcetype/:id`, `DELETE /resourcetype/:id`
/// - `GET /resourceproperty`, `POST /resourceproperty`
/// - `GET /resourceproperty/:id`, `PUT /resourceproperty/:id`, `DELETE /resourceproperty/:id`
/// - `GET /resource`, `POST /resource`
/// - `GET /resource/:id`, `PUT /resource/:id`, `DELETE /resource/:id`
pub fn create_resource_router(store: Arc<dyn DataStore>) -> Router {
    Router::new()
        .route(
            "/resourcetype",
            get(list_resource_types).post(create_resource_type),
        )
        .route(
            "/resourcetype/:id",
            get(get_resource_type_by_id)
                .put(update_resource_type_by_id)
                .delete(delete_resource_type_by_id),
        )
        .route(
            "/resourceproperty",
            get(list_resource_properties).post(create_resource_property),
        )
        .route(
            "/resourceproperty/:id",
            get(get_resource_property_by_id)
                .put(update_resource_property_by_id)
                .delete(delete_resource_property_by_id),
        )
        .route("/resource", get(list_resources).post(create_resource))
        .route(
            "/resource/:id",
            get(get_resource_by_id)
                .put(update_resource_by_id)
                .delete(delete_resource_by_id),
        )
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_store::InMemoryDataStore;

    fn fresh_store() -> Arc<dyn DataStore> {
        Arc::new(InMemoryDataStore::new())
    }

    fn seeded_store() -> Arc<dyn DataStore> {
        let store = fresh_store();
        install_default_resources(store.as_ref()).unwrap();
        store
    }

    #[test]
    fn seeds_install_the_stock_taxonomy() {
        let store = seeded_store();
        let types = store.list_resource_types().unwrap();
        let names: Vec<&str> = types.iter().map(|rt| rt.name.as_str()).collect();
        assert_eq!(names, vec!["Air", "Water", "Light"]);
        assert!(types.iter().all(|rt| rt.read_only));

        let properties = store.list_resource_properties().unwrap();
        assert_eq!(properties.len(), 6);
        assert!(properties.iter().all(|p| p.read_only));

        let water = &types[1];
        let codes: Vec<&str> = properties
            .iter()
            .filter(|p| p.resource_type == water.id)
            .map(|p| p.code.as_str())
            .collect();
        assert_eq!(codes, vec!["temp", "ph", "ec"]);
    }

    #[test]
    fn seeding_twice_is_an_error() {
        let store = seeded_store();
        let err = install_default_resources(store.as_ref()).unwrap_err();
        assert_eq!(err, DataStoreError::AlreadyExists);
    }

    #[tokio::test]
    async fn seeded_entries_reject_changes_over_http() {
        let store = seeded_store();
        let air = store.list_resource_types().unwrap()[0].clone();

        let err = update_resource_type_by_id(
            State(store.clone()),
            UrlPath(air.id),
            Json(ResourceType {
                id: 0,
                name: "Atmosphere".to_string(),
                read_only: false,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let err = delete_resource_type_by_id(State(store), UrlPath(air.id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn types_round_trip_over_http() {
        let store = fresh_store();
        let created = create_resource_type(
            State(store.clone()),
            Json(ResourceType {
                id: 0,
                name: "Soil".to_string(),
                // Clients cannot mint stock entries.
                read_only: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.0.id, 1);
        assert!(!created.0.read_only);

        let renamed = update_resource_type_by_id(
            State(store.clone()),
            UrlPath(created.0.id),
            Json(ResourceType {
                id: 0,
                name: "Substrate".to_string(),
                read_only: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(renamed.0.name, "Substrate");

        let fetched = get_resource_type_by_id(State(store.clone()), UrlPath(created.0.id))
            .await
            .unwrap();
        assert_eq!(fetched.0, renamed.0);

        let gone = delete_resource_type_by_id(State(store.clone()), UrlPath(created.0.id))
            .await
            .unwrap();
        assert_eq!(gone, StatusCode::NO_CONTENT);
        let err = get_resource_type_by_id(State(store), UrlPath(created.0.id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_type_names_conflict() {
        let store = seeded_store();
        let err = create_resource_type(
            State(store),
            Json(ResourceType {
                id: 0,
                name: "Air".to_string(),
                read_only: false,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn properties_must_name_an_existing_type() {
        let store = fresh_store();
        let err = create_resource_property(
            State(store),
            Json(ResourceProperty {
                id: 0,
                code: "temp".to_string(),
                name: "Temperature".to_string(),
                resource_type: 9,
                read_only: false,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("resource type 9 does not exist"));
    }

    #[tokio::test]
    async fn properties_cannot_move_between_types() {
        let store = seeded_store();
        let types = store.list_resource_types().unwrap();
        let soil = create_resource_type(
            State(store.clone()),
            Json(ResourceType {
                id: 0,
                name: "Soil".to_string(),
                read_only: false,
            }),
        )
        .await
        .unwrap();
        let moisture = create_resource_property(
            State(store.clone()),
            Json(ResourceProperty {
                id: 0,
                code: "moist".to_string(),
                name: "Moisture".to_string(),
                resource_type: soil.0.id,
                read_only: false,
            }),
        )
        .await
        .unwrap();

        let err = update_resource_property_by_id(
            State(store),
            UrlPath(moisture.0.id),
            Json(ResourceProperty {
                id: 0,
                code: "moist".to_string(),
                name: "Moisture".to_string(),
                resource_type: types[0].id,
                read_only: false,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resources_default_their_names() {
        let store = seeded_store();
        let air = store.list_resource_types().unwrap()[0].clone();

        let first = create_resource(
            State(store.clone()),
            Json(Resource {
                resource_type: air.id,
                ..Resource::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(first.0.index, 1);
        assert_eq!(first.0.name, "Air Resource 1");

        let second = create_resource(
            State(store),
            Json(Resource {
                name: "North Duct".to_string(),
                resource_type: air.id,
                ..Resource::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(second.0.index, 2);
        assert_eq!(second.0.name, "North Duct");
    }

    #[tokio::test]
    async fn resource_locations_must_exist() {
        let store = seeded_store();
        let air = store.list_resource_types().unwrap()[0].clone();
        let err = create_resource(
            State(store),
            Json(Resource {
                resource_type: air.id,
                location: Some(44),
                ..Resource::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("layout object 44 does not exist"));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = fresh_store();
        let err = get_resource_by_id(State(store.clone()), UrlPath(5))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        let err = delete_resource_by_id(State(store), UrlPath(5))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn types_in_use_cannot_be_deleted() {
        let store = fresh_store();
        let soil = create_resource_type(
            State(store.clone()),
            Json(ResourceType {
                id: 0,
                name: "Soil".to_string(),
                read_only: false,
            }),
        )
        .await
        .unwrap();
        create_resource(
            State(store.clone()),
            Json(Resource {
                resource_type: soil.0.id,
                ..Resource::default()
            }),
        )
        .await
        .unwrap();

        let err = delete_resource_type_by_id(State(store), UrlPath(soil.0.id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }
}
