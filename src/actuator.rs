//! Actuators and their control state.
//!
//! An `ActuatorType` describes one kind of output device: the resource
//! properties it influences, whether it is binary or variable, and the
//! direction it pushes a measurement when active. An `Actuator` is one
//! installed device of such a type. Control loops run elsewhere; this
//! module exposes the two levers they honor: a manual override that pins
//! the output for a bounded time, and an append-only series of
//! `ActuatorState` records reporting what the device actually did.
//!
//! Overrides expire passively. Every read of an actuator compares the
//! override timeout against the clock and clears a stale override before
//! returning, so a crashed controller can never leave a device pinned
//! forever.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::data_store::DataStore;
use crate::http_utils::{now_timestamp, store_error};

////////////////////////////////////////////// Entities ////////////////////////////////////////////

/// One kind of output device and the properties it influences.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorType {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Short mnemonic, unique within the resource type.
    pub code: String,
    /// Unique within the resource type.
    pub name: String,
    /// The resource type this device acts on. Immutable after creation.
    pub resource_type: u64,
    /// Properties influenced when the device runs. Every entry must belong
    /// to `resource_type`.
    pub properties: Vec<u64>,
    /// Position in the control sequence when several types act on the same
    /// property.
    pub order: i64,
    /// True for on/off devices, false for variable-output ones.
    pub is_binary: bool,
    /// `1` if running the device raises the measured property, `-1` if it
    /// lowers it.
    pub effect_on_active: i64,
    pub read_only: bool,
    /// Control band half-width around the set point.
    pub threshold: f64,
    pub operating_range_min: f64,
    pub operating_range_max: f64,
}

/// One installed output device.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Actuator {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Ordinal among actuators of the same type, 1-based, assigned on
    /// creation and never reused.
    pub index: u64,
    /// Defaults to `"{type} {index}"` when left empty.
    pub name: String,
    /// The actuator type. Immutable after creation.
    pub actuator_type: u64,
    /// The resource this device acts on, which must hold the type's
    /// resource type.
    pub resource: Option<u64>,
    /// Pinned output while a manual override is live.
    pub override_value: Option<f64>,
    /// Absolute expiry of the override, epoch seconds.
    pub override_timeout: Option<i64>,
}

/// One record of what a device actually did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    /// The actuator this record belongs to.
    pub origin: u64,
    /// Epoch seconds.
    pub timestamp: i64,
    pub value: f64,
}

////////////////////////////////////////////// Handlers ////////////////////////////////////////////

/// Lists every actuator type.
async fn list_actuator_types(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<ActuatorType>>, (StatusCode, String)> {
    store.list_actuator_types().map(Json).map_err(store_error)
}

/// Creates an actuator type over existing properties.
async fn create_actuator_type(
    State(store): State<Arc<dyn DataStore>>,
    Json(mut at): Json<ActuatorType>,
) -> Result<Json<ActuatorType>, (StatusCode, String)> {
    at.read_only = false;
    store.create_actuator_type(at).map(Json).map_err(store_error)
}

/// Gets one actuator type by id.
async fn get_actuator_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<ActuatorType>, (StatusCode, String)> {
    store
        .get_actuator_type(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no actuator type with id {}", id),
            )
        })
}

/// Updates one actuator type by id. The resource type cannot change.
async fn update_actuator_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut at): Json<ActuatorType>,
) -> Result<Json<ActuatorType>, (StatusCode, String)> {
    at.id = id;
    store.update_actuator_type(at).map(Json).map_err(store_error)
}

/// Deletes one actuator type by id.
async fn delete_actuator_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_actuator_type(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            format!("no actuator type with id {}", id),
        )),
        Err(err) => Err(store_error(err)),
    }
}

/// Lists every actuator, expiring stale overrides on the way out.
async fn list_actuators(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<Actuator>>, (StatusCode, String)> {
    store
        .list_actuators(now_timestamp())
        .map(Json)
        .map_err(store_error)
}

/// Creates an actuator of an existing type.
async fn create_actuator(
    State(store): State<Arc<dyn DataStore>>,
    Json(actuator): Json<Actuator>,
) -> Result<Json<Actuator>, (StatusCode, String)> {
    store.create_actuator(actuator).map(Json).map_err(store_error)
}

/// Gets one actuator by id, expiring a stale override first.
async fn get_actuator_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<Actuator>, (StatusCode, String)> {
    store
        .get_actuator(id, now_timestamp())
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no actuator with id {}", id)))
}

/// Updates one actuator by id. The actuator type cannot change and the
/// override fields are untouched.
async fn update_actuator_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut actuator): Json<Actuator>,
) -> Result<Json<Actuator>, (StatusCode, String)> {
    actuator.id = id;
    store.update_actuator(actuator).map(Json).map_err(store_error)
}

/// Deletes one actuator by id, cascading to its state records.
async fn delete_actuator_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_actuator(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((StatusCode::NOT_FOUND, format!("no actuator with id {}", id))),
        Err(err) => Err(store_error(err)),
    }
}

fn actuator_exists(store: &Arc<dyn DataStore>, id: u64) -> Result<(), (StatusCode, String)> {
    store
        .get_actuator(id, now_timestamp())
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no actuator with id {}", id)))?;
    Ok(())
}

/// Body of an override post. The duration is in seconds and counts from
/// the moment the request lands.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OverrideBody {
    value: Option<f64>,
    duration: Option<i64>,
}

/// Pins an actuator's output for a bounded time.
async fn post_override(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(body): Json<OverrideBody>,
) -> Result<Json<Actuator>, (StatusCode, String)> {
    let (Some(value), Some(duration)) = (body.value, body.duration) else {
        return Err((
            StatusCode::BAD_REQUEST,
            "an override needs both a value and a duration".to_string(),
        ));
    };
    if duration < 1 {
        return Err((
            StatusCode::BAD_REQUEST,
            "the override duration must be at least one second".to_string(),
        ));
    }
    let timeout = now_timestamp() + duration;
    store
        .set_override(id, value, timeout)
        .map(Json)
        .map_err(store_error)
}

/// Body of a state post. The timestamp defaults to the server clock.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StateBody {
    value: Option<f64>,
    timestamp: Option<i64>,
}

/// Gets the latest state record of one actuator.
async fn get_latest_state(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<ActuatorState>, (StatusCode, String)> {
    actuator_exists(&store, id)?;
    store
        .latest_actuator_state(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                "no state has been recorded for this actuator yet".to_string(),
            )
        })
}

/// Appends a state record to one actuator.
async fn post_state(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(body): Json<StateBody>,
) -> Result<Json<ActuatorState>, (StatusCode, String)> {
    actuator_exists(&store, id)?;
    let Some(value) = body.value else {
        return Err((StatusCode::BAD_REQUEST, "a value is required".to_string()));
    };
    let state = ActuatorState {
        origin: id,
        timestamp: body.timestamp.unwrap_or_else(now_timestamp),
        value,
    };
    store
        .record_actuator_state(state)
        .map(Json)
        .map_err(store_error)
}

/// `?since=` and `?before=` window for history reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryQuery {
    since: Option<i64>,
    before: Option<i64>,
}

/// Gets the state records of one actuator strictly inside a time window.
///
/// `since` is required; `before` defaults to the current time. Both bounds
/// are exclusive.
async fn get_state_history(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ActuatorState>>, (StatusCode, String)> {
    actuator_exists(&store, id)?;
    let Some(since) = query.since else {
        return Err((
            StatusCode::BAD_REQUEST,
            "a since timestamp is required".to_string(),
        ));
    };
    let before = query.before.unwrap_or_else(now_timestamp);
    store
        .actuator_state_history(id, since, before)
        .map(Json)
        .map_err(store_error)
}

////////////////////////////////////////////// Router //////////////////////////////////////////////

/// Creates an Axum router for the actuator surface.
///
/// # Routes
/// - `GET /actuatortype`, `POST /actuatortype`
/// - `GET /actuatortype/:id`, `PUT /actuatortype/:id`, `DELETE /actuatortype/:id`
/// - `GET /actuator`, `POST /actuator`
/// - `GET /actuator/:id`, `PUT /actuator/:id`, `DELETE /actuator/:id`
/// - `POST /actuator/:id/override` - Pin the output for a bounded time
/// - `GET /actuator/:id/state` - Latest state record
/// - `POST /actuator/:id/state` - Append a state record
/// - `GET /actuator/:id/history?since=<t>&before=<t>` - Window of state records
pub fn create_actuator_router(store: Arc<dyn DataStore>) -> Router {
    Router::new()
        .route(
            "/actuatortype",
            get(list_actuator_types).post(create_actuator_type),
        )
        .route(
            "/actuatortype/:id",
            get(get_actuator_type_by_id)
                .put(update_actuator_type_by_id)
                .delete(delete_actuator_type_by_id),
        )
        .route("/actuator", get(list_actuators).post(create_actuator))
        .route(
            "/actuator/:id",
            get(get_actuator_by_id)
                .put(update_actuator_by_id)
                .delete(delete_actuator_by_id),
        )
        .route("/actuator/:id/override", post(post_override))
        .route("/actuator/:id/state", get(get_latest_state).post(post_state))
        .route("/actuator/:id/history", get(get_state_history))
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_store::InMemoryDataStore;
    use crate::resource::{ResourceProperty, ResourceType};

    struct Fixture {
        store: Arc<dyn DataStore>,
        air: ResourceType,
        temp: ResourceProperty,
        heater_type: ActuatorType,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
        let air = store
            .create_resource_type(ResourceType {
                id: 0,
                name: "Air".to_string(),
                read_only: false,
            })
            .unwrap();
        let temp = store
            .create_resource_property(ResourceProperty {
                id: 0,
                code: "temp".to_string(),
                name: "Temperature".to_string(),
                resource_type: air.id,
                read_only: false,
            })
            .unwrap();
        let heater_type = store
            .create_actuator_type(ActuatorType {
                id: 0,
                code: "HT".to_string(),
                name: "Heater".to_string(),
                resource_type: air.id,
                properties: vec![temp.id],
                order: 0,
                is_binary: true,
                effect_on_active: 1,
                read_only: false,
                threshold: 0.5,
                operating_range_min: 10.0,
                operating_range_max: 35.0,
            })
            .unwrap();
        Fixture {
            store,
            air,
            temp,
            heater_type,
        }
    }

    async fn heater(fx: &Fixture) -> Actuator {
        create_actuator(
            State(fx.store.clone()),
            Json(Actuator {
                actuator_type: fx.heater_type.id,
                ..Actuator::default()
            }),
        )
        .await
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn actuator_types_round_trip_over_http() {
        let fx = fixture();
        let created = create_actuator_type(
            State(fx.store.clone()),
            Json(ActuatorType {
                code: "CL".to_string(),
                name: "Chiller".to_string(),
                resource_type: fx.air.id,
                properties: vec![fx.temp.id],
                effect_on_active: -1,
                ..ActuatorType::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.0.effect_on_active, -1);

        let fetched = get_actuator_type_by_id(State(fx.store.clone()), UrlPath(created.0.id))
            .await
            .unwrap();
        assert_eq!(fetched.0, created.0);

        let gone = delete_actuator_type_by_id(State(fx.store), UrlPath(created.0.id))
            .await
            .unwrap();
        assert_eq!(gone, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn actuator_types_need_a_code() {
        let fx = fixture();
        let err = create_actuator_type(
            State(fx.store),
            Json(ActuatorType {
                name: "Nameless".to_string(),
                resource_type: fx.air.id,
                ..ActuatorType::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("code"));
    }

    #[tokio::test]
    async fn actuator_names_default_from_the_type() {
        let fx = fixture();
        let first = heater(&fx).await;
        assert_eq!(first.name, "Heater 1");
        assert_eq!(first.index, 1);
        let second = heater(&fx).await;
        assert_eq!(second.name, "Heater 2");
    }

    #[tokio::test]
    async fn overrides_round_trip() {
        let fx = fixture();
        let actuator = heater(&fx).await;

        let before = now_timestamp();
        let pinned = post_override(
            State(fx.store.clone()),
            UrlPath(actuator.id),
            Json(OverrideBody {
                value: Some(5.0),
                duration: Some(600),
            }),
        )
        .await
        .unwrap();
        let after = now_timestamp();
        assert_eq!(pinned.0.override_value, Some(5.0));
        let timeout = pinned.0.override_timeout.unwrap();
        assert!(timeout >= before + 600 && timeout <= after + 600);

        // A fresh read still sees the override because it has not expired.
        let read_back = get_actuator_by_id(State(fx.store), UrlPath(actuator.id))
            .await
            .unwrap();
        assert_eq!(read_back.0.override_value, Some(5.0));
    }

    #[tokio::test]
    async fn overrides_need_a_value_and_a_duration() {
        let fx = fixture();
        let actuator = heater(&fx).await;

        let err = post_override(
            State(fx.store.clone()),
            UrlPath(actuator.id),
            Json(OverrideBody {
                value: Some(5.0),
                duration: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = post_override(
            State(fx.store),
            UrlPath(actuator.id),
            Json(OverrideBody {
                value: None,
                duration: Some(600),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("both a value and a duration"));
    }

    #[tokio::test]
    async fn override_durations_must_be_positive() {
        let fx = fixture();
        let actuator = heater(&fx).await;
        let err = post_override(
            State(fx.store),
            UrlPath(actuator.id),
            Json(OverrideBody {
                value: Some(1.0),
                duration: Some(0),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("at least one second"));
    }

    #[tokio::test]
    async fn overriding_a_missing_actuator_is_not_found() {
        let fx = fixture();
        let err = post_override(
            State(fx.store),
            UrlPath(99),
            Json(OverrideBody {
                value: Some(1.0),
                duration: Some(60),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn states_round_trip() {
        let fx = fixture();
        let actuator = heater(&fx).await;

        for timestamp in [250, 50, 150, 200, 100] {
            post_state(
                State(fx.store.clone()),
                UrlPath(actuator.id),
                Json(StateBody {
                    value: Some(1.0),
                    timestamp: Some(timestamp),
                }),
            )
            .await
            .unwrap();
        }

        let latest = get_latest_state(State(fx.store.clone()), UrlPath(actuator.id))
            .await
            .unwrap();
        assert_eq!(latest.0.timestamp, 250);

        let window = get_state_history(
            State(fx.store),
            UrlPath(actuator.id),
            Query(HistoryQuery {
                since: Some(100),
                before: Some(200),
            }),
        )
        .await
        .unwrap();
        let stamps: Vec<i64> = window.0.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![150]);
    }

    #[tokio::test]
    async fn empty_state_series_are_not_found() {
        let fx = fixture();
        let actuator = heater(&fx).await;
        let err = get_latest_state(State(fx.store), UrlPath(actuator.id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert!(err.1.contains("no state has been recorded"));
    }

    #[tokio::test]
    async fn state_history_requires_since() {
        let fx = fixture();
        let actuator = heater(&fx).await;
        let err = get_state_history(
            State(fx.store),
            UrlPath(actuator.id),
            Query(HistoryQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("since"));
    }

    #[tokio::test]
    async fn actuators_reject_type_changes() {
        let fx = fixture();
        let second_type = fx
            .store
            .create_actuator_type(ActuatorType {
                id: 0,
                code: "CL".to_string(),
                name: "Chiller".to_string(),
                resource_type: fx.air.id,
                properties: vec![fx.temp.id],
                order: 1,
                is_binary: true,
                effect_on_active: -1,
                read_only: false,
                threshold: 0.0,
                operating_range_min: 0.0,
                operating_range_max: 0.0,
            })
            .unwrap();
        let actuator = heater(&fx).await;

        let err = update_actuator_by_id(
            State(fx.store),
            UrlPath(actuator.id),
            Json(Actuator {
                actuator_type: second_type.id,
                ..Actuator::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("cannot change"));
    }

    #[tokio::test]
    async fn deleting_an_actuator_removes_it() {
        let fx = fixture();
        let actuator = heater(&fx).await;
        let gone = delete_actuator_by_id(State(fx.store.clone()), UrlPath(actuator.id))
            .await
            .unwrap();
        assert_eq!(gone, StatusCode::NO_CONTENT);

        let err = get_latest_state(State(fx.store), UrlPath(actuator.id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert!(err.1.contains("no actuator"));
    }
}
