//! The farm itself.
//!
//! Every server owns exactly one [`Farm`] record describing the site it
//! runs: a human name, a slug derived from that name, the layout schema
//! the site committed to, and the root id handed out by the root server.
//! A fresh install is "unconfigured": no name, no layout, no root id.
//! Naming the farm configures it, and configuration is where all the
//! derived state gets computed: the slug is canonicalized from the name,
//! the server's own address is discovered, and the farm is announced to
//! the root server, which assigns the root id and the final spelling of
//! the slug.
//!
//! Once a farm has committed to a layout the layout is pinned. Layout
//! objects, resources, and instruments all hang off the chosen hierarchy,
//! so swapping schemas underneath them would orphan the whole tree.
//!
//! Root servers carry the other half of the picture: a registry of every
//! farm that has announced itself, addressed by root id.

use std::net::UdpSocket;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use log::warn;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::data_store::DataStore;
use crate::federation::{RootClient, reconcile};
use crate::http_utils::store_error;
use crate::layout::{ActiveLayouts, FarmScope};
use crate::registry::SchemaRegistry;
use crate::slug::{Slug, canonicalize};

/// Slug of a farm that has not been configured yet.
pub const UNCONFIGURED_SLUG: &str = "unconfigured";

/// Root server a leaf announces itself to when none is configured.
pub const DEFAULT_ROOT_SERVER: &str = "http://root.trellis.farm";

/// Root id assumed when running without a root server.
pub const DEVELOPMENT_ROOT_ID: u64 = 1;

////////////////////////////////////////////// Farm ////////////////////////////////////////////////

/// One growing site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Farm {
    /// Human name. A farm without one is unconfigured.
    pub name: Option<String>,
    /// Canonical form of the name, assigned on configuration.
    pub slug: String,
    /// Address this server is reachable at, discovered on configuration.
    pub ip: Option<String>,
    /// The layout schema the site committed to. Pinned once set.
    pub layout: Option<Slug>,
    /// Global id assigned by the root server.
    pub root_id: Option<u64>,
}

impl Farm {
    /// The record of a fresh install.
    pub fn unconfigured() -> Farm {
        Farm {
            name: None,
            slug: UNCONFIGURED_SLUG.to_string(),
            ip: None,
            layout: None,
            root_id: None,
        }
    }
}

impl Default for Farm {
    fn default() -> Farm {
        Farm::unconfigured()
    }
}

/// Discovers the address this host would use to reach the root server.
///
/// Connecting a UDP socket selects a local address without sending any
/// packets. When the root server's URL does not name a reachable host the
/// probe falls back to a well-known public address.
fn local_ip(root_server: &str) -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    let target = Url::parse(root_server).ok().and_then(|url| {
        url.host_str()
            .map(|host| (host.to_string(), url.port().unwrap_or(80)))
    });
    let connected = match target {
        Some((host, port)) => socket.connect((host.as_str(), port)).is_ok(),
        None => false,
    };
    if !connected && socket.connect(("8.8.8.8", 80)).is_err() {
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

////////////////////////////////////////////// State ///////////////////////////////////////////////

/// Shared state for the farm surface.
#[derive(Clone)]
pub struct FarmState {
    pub store: Arc<dyn DataStore>,
    pub registry: Arc<SchemaRegistry>,
    pub layouts: Arc<ActiveLayouts>,
    /// Client for the root server. `None` runs the leaf in development
    /// mode, which skips federation and assumes [`DEVELOPMENT_ROOT_ID`].
    pub root: Option<Arc<RootClient>>,
}

/// Folds an update into the current farm record.
///
/// The name and layout are client-writable and keep their current values
/// when the update leaves them unset. The slug, address, and root id are
/// derived and never taken from the client.
fn merge(current: Farm, update: Farm) -> Farm {
    Farm {
        name: update.name.or(current.name),
        slug: current.slug,
        ip: current.ip,
        layout: update.layout.or(current.layout),
        root_id: current.root_id,
    }
}

fn check_layout(
    state: &FarmState,
    current: &Farm,
    merged: &Farm,
) -> Result<(), (StatusCode, String)> {
    let Some(layout) = &merged.layout else {
        return Ok(());
    };
    if state.registry.get(layout.as_str()).is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("no schema named {:?}", layout.as_str()),
        ));
    }
    if current.layout.is_some() && current.layout != merged.layout {
        return Err((
            StatusCode::FORBIDDEN,
            "changing the layout of a configured farm is disallowed".to_string(),
        ));
    }
    Ok(())
}

////////////////////////////////////////////// Leaf ////////////////////////////////////////////////

/// Gets this server's own farm.
async fn get_farm(
    State(state): State<FarmState>,
) -> Result<Json<Farm>, (StatusCode, String)> {
    state.store.get_local_farm().map(Json).map_err(store_error)
}

/// Updates this server's own farm.
///
/// Naming the farm configures it: the slug is derived from the name, the
/// server's address is discovered, and the farm is announced to the root
/// server. An update that leaves the farm nameless keeps it unconfigured.
async fn update_farm(
    State(state): State<FarmState>,
    Json(body): Json<Farm>,
) -> Result<Json<Farm>, (StatusCode, String)> {
    let current = state.store.get_local_farm().map_err(store_error)?;
    let mut farm = merge(current.clone(), body);

    let Some(name) = farm.name.clone().filter(|name| !name.is_empty()) else {
        farm.slug = UNCONFIGURED_SLUG.to_string();
        let stored = state.store.commit_local_farm(&farm).map_err(store_error)?;
        return Ok(Json(stored));
    };

    let slug = canonicalize(&name);
    if slug.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("farm name {:?} does not canonicalize to a slug", name),
        ));
    }
    farm.slug = slug;

    check_layout(&state, &current, &farm)?;

    if farm.ip.is_none() {
        let probe = state
            .root
            .as_ref()
            .map(|client| client.base_url().to_string())
            .unwrap_or_else(|| DEFAULT_ROOT_SERVER.to_string());
        farm.ip = local_ip(&probe);
    }

    match &state.root {
        None => {
            if farm.root_id.is_none() {
                warn!(
                    "no root server configured; assuming development root id {}",
                    DEVELOPMENT_ROOT_ID
                );
                farm.root_id = Some(DEVELOPMENT_ROOT_ID);
            }
        }
        Some(client) => {
            let remote = match farm.root_id {
                None => client.register_farm(&farm).await,
                Some(root_id) => client.update_farm(root_id, &farm).await,
            }
            .map_err(|err| {
                (
                    StatusCode::BAD_GATEWAY,
                    format!("root server refused the farm: {}", err),
                )
            })?;
            farm = reconcile(farm, &remote);
        }
    }

    let stored = state.store.commit_local_farm(&farm).map_err(store_error)?;
    if let Some(layout) = &stored.layout {
        state
            .layouts
            .record(FarmScope::new(stored.slug.clone()), layout.clone());
    }
    Ok(Json(stored))
}

////////////////////////////////////////////// Registry ////////////////////////////////////////////

/// Lists every registered farm.
async fn list_farms(
    State(state): State<FarmState>,
) -> Result<Json<Vec<Farm>>, (StatusCode, String)> {
    state
        .store
        .list_registered_farms()
        .map(Json)
        .map_err(store_error)
}

/// Registers a farm, assigning its root id and deduplicating its slug.
async fn create_farm(
    State(state): State<FarmState>,
    Json(farm): Json<Farm>,
) -> Result<Json<Farm>, (StatusCode, String)> {
    if let Some(layout) = &farm.layout {
        if state.registry.get(layout.as_str()).is_none() {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("no schema named {:?}", layout.as_str()),
            ));
        }
    }
    let stored = state.store.register_farm(&farm).map_err(store_error)?;
    if let Some(layout) = &stored.layout {
        state
            .layouts
            .record(FarmScope::new(stored.slug.clone()), layout.clone());
    }
    Ok(Json(stored))
}

/// Gets one registered farm by root id.
async fn get_farm_by_root_id(
    State(state): State<FarmState>,
    UrlPath(root_id): UrlPath<u64>,
) -> Result<Json<Farm>, (StatusCode, String)> {
    state
        .store
        .get_registered_farm(root_id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no farm with root id {}", root_id),
            )
        })
}

/// Updates one registered farm by root id. The layout stays pinned.
async fn update_farm_by_root_id(
    State(state): State<FarmState>,
    UrlPath(root_id): UrlPath<u64>,
    Json(mut farm): Json<Farm>,
) -> Result<Json<Farm>, (StatusCode, String)> {
    farm.root_id = Some(root_id);
    if let Some(layout) = &farm.layout {
        if state.registry.get(layout.as_str()).is_none() {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("no schema named {:?}", layout.as_str()),
            ));
        }
    }
    let stored = state
        .store
        .update_registered_farm(&farm)
        .map_err(store_error)?;
    if let Some(layout) = &stored.layout {
        state
            .layouts
            .record(FarmScope::new(stored.slug.clone()), layout.clone());
    }
    Ok(Json(stored))
}

////////////////////////////////////////////// Routers /////////////////////////////////////////////

/// Creates an Axum router for a leaf server's own farm.
///
/// # Routes
/// - `GET /farm` - This server's farm
/// - `PUT /farm` - Update and, when named, configure it
pub fn create_farm_router(state: FarmState) -> Router {
    Router::new()
        .route("/farm", get(get_farm).put(update_farm))
        .with_state(state)
}

/// Creates an Axum router for a root server's farm registry.
///
/// # Routes
/// - `GET /farm`, `POST /farm`
/// - `GET /farm/:root_id`, `PUT /farm/:root_id`
pub fn create_farm_registry_router(state: FarmState) -> Router {
    Router::new()
        .route("/farm", get(list_farms).post(create_farm))
        .route(
            "/farm/:root_id",
            get(get_farm_by_root_id).put(update_farm_by_root_id),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_store::InMemoryDataStore;
    use crate::schema::LayoutSchema;

    fn test_registry() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(LayoutSchema::parse_with_name("tray", "tray-parent: enclosure\n").unwrap())
            .unwrap();
        registry
            .register(
                LayoutSchema::parse_with_name(
                    "aisle",
                    "entities:\n  - name: aisle\n    parent: enclosure\ntray-parent: aisle\n",
                )
                .unwrap(),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn dev_state() -> FarmState {
        FarmState {
            store: Arc::new(InMemoryDataStore::new()),
            registry: test_registry(),
            layouts: Arc::new(ActiveLayouts::new()),
            root: None,
        }
    }

    fn named(name: &str) -> Farm {
        Farm {
            name: Some(name.to_string()),
            ..Farm::default()
        }
    }

    fn named_with_layout(name: &str, layout: &str) -> Farm {
        Farm {
            name: Some(name.to_string()),
            layout: Some(Slug::new(layout).unwrap()),
            ..Farm::default()
        }
    }

    #[tokio::test]
    async fn a_fresh_leaf_is_unconfigured() {
        let state = dev_state();
        let farm = get_farm(State(state)).await.unwrap();
        assert_eq!(farm.0.slug, UNCONFIGURED_SLUG);
        assert_eq!(farm.0.name, None);
        assert_eq!(farm.0.root_id, None);
    }

    #[tokio::test]
    async fn naming_the_farm_configures_it() {
        let state = dev_state();
        let farm = update_farm(State(state.clone()), Json(named("Petting Zoo")))
            .await
            .unwrap();
        assert_eq!(farm.0.slug, "petting-zoo");
        assert_eq!(farm.0.root_id, Some(DEVELOPMENT_ROOT_ID));

        let read_back = get_farm(State(state)).await.unwrap();
        assert_eq!(read_back.0, farm.0);
    }

    #[tokio::test]
    async fn a_nameless_update_stays_unconfigured() {
        let state = dev_state();
        let farm = update_farm(State(state), Json(Farm::default()))
            .await
            .unwrap();
        assert_eq!(farm.0.slug, UNCONFIGURED_SLUG);
        assert_eq!(farm.0.root_id, None);
    }

    #[tokio::test]
    async fn unusable_names_are_rejected() {
        let state = dev_state();
        let err = update_farm(State(state), Json(named("???")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("does not canonicalize"));
    }

    #[tokio::test]
    async fn committing_to_a_layout_records_it() {
        let state = dev_state();
        let farm = update_farm(
            State(state.clone()),
            Json(named_with_layout("Petting Zoo", "tray")),
        )
        .await
        .unwrap();
        assert_eq!(farm.0.layout, Some(Slug::new("tray").unwrap()));
        assert_eq!(
            state.layouts.get(&FarmScope::new("petting-zoo")),
            Some(Slug::new("tray").unwrap())
        );
    }

    #[tokio::test]
    async fn unknown_layouts_are_rejected() {
        let state = dev_state();
        let err = update_farm(State(state), Json(named_with_layout("Petting Zoo", "grobot")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("no schema named"));
    }

    #[tokio::test]
    async fn a_committed_layout_is_pinned() {
        let state = dev_state();
        update_farm(
            State(state.clone()),
            Json(named_with_layout("Petting Zoo", "tray")),
        )
        .await
        .unwrap();

        let err = update_farm(State(state), Json(named_with_layout("Petting Zoo", "aisle")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
        assert!(err.1.contains("disallowed"));
    }

    #[tokio::test]
    async fn renaming_keeps_the_layout() {
        let state = dev_state();
        update_farm(
            State(state.clone()),
            Json(named_with_layout("Petting Zoo", "tray")),
        )
        .await
        .unwrap();

        let renamed = update_farm(State(state.clone()), Json(named("Larger Zoo")))
            .await
            .unwrap();
        assert_eq!(renamed.0.slug, "larger-zoo");
        assert_eq!(renamed.0.layout, Some(Slug::new("tray").unwrap()));
        assert_eq!(
            state.layouts.get(&FarmScope::new("larger-zoo")),
            Some(Slug::new("tray").unwrap())
        );
    }

    #[tokio::test]
    async fn registration_assigns_root_ids_and_dedups_slugs() {
        let state = dev_state();
        let first = create_farm(State(state.clone()), Json(named("Petting Zoo")))
            .await
            .unwrap();
        assert_eq!(first.0.root_id, Some(1));
        assert_eq!(first.0.slug, "petting-zoo");

        let second = create_farm(State(state.clone()), Json(named("Petting Zoo")))
            .await
            .unwrap();
        assert_eq!(second.0.root_id, Some(2));
        assert_eq!(second.0.slug, "petting-zoo-2");

        let listed = list_farms(State(state)).await.unwrap();
        assert_eq!(listed.0.len(), 2);
    }

    #[tokio::test]
    async fn nameless_registrations_are_rejected() {
        let state = dev_state();
        let err = create_farm(State(state), Json(Farm::default()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("without a name"));
    }

    #[tokio::test]
    async fn registered_layouts_are_recorded_per_farm() {
        let state = dev_state();
        let farm = create_farm(
            State(state.clone()),
            Json(named_with_layout("Petting Zoo", "tray")),
        )
        .await
        .unwrap();
        assert_eq!(
            state.layouts.get(&FarmScope::new(&farm.0.slug)),
            Some(Slug::new("tray").unwrap())
        );
    }

    #[tokio::test]
    async fn registered_layouts_are_pinned_too() {
        let state = dev_state();
        let farm = create_farm(
            State(state.clone()),
            Json(named_with_layout("Petting Zoo", "tray")),
        )
        .await
        .unwrap();

        let mut changed = farm.0.clone();
        changed.layout = Some(Slug::new("aisle").unwrap());
        let err = update_farm_by_root_id(
            State(state),
            UrlPath(farm.0.root_id.unwrap()),
            Json(changed),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_root_ids_are_not_found() {
        let state = dev_state();
        let err = get_farm_by_root_id(State(state.clone()), UrlPath(99))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let err = update_farm_by_root_id(State(state), UrlPath(99), Json(named("Ghost")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
