//! Sensors and their readings.
//!
//! A `SensorType` names the resource properties one kind of instrument
//! measures. Creating a `Sensor` fans out one `SensingPoint` per property
//! of its type, and readings land against sensing points as append-only
//! `DataPoint`s. Points are the stable address for a measurement stream:
//! they survive renames and resource moves, and they are what clients poll
//! for the latest value or a history window.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};

use crate::data_store::DataStore;
use crate::http_utils::{now_timestamp, store_error};

////////////////////////////////////////////// Entities ////////////////////////////////////////////

/// One kind of measuring instrument and the properties it reports.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorType {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Unique within the resource type.
    pub name: String,
    /// The resource type this instrument monitors. Immutable after
    /// creation.
    pub resource_type: u64,
    /// Properties reported, in declaration order. Every entry must belong
    /// to `resource_type`.
    pub properties: Vec<u64>,
    pub read_only: bool,
}

/// One physical instrument.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensor {
    /// Assigned by the store on creation.
    pub id: u64,
    /// Ordinal among sensors of the same type, 1-based, assigned on
    /// creation and never reused.
    pub index: u64,
    /// Defaults to `"{type} Instance {index}"` when left empty.
    pub name: String,
    /// The sensor type. Immutable after creation.
    pub sensor_type: u64,
    /// The resource this sensor monitors, which must hold the type's
    /// resource type.
    pub resource: Option<u64>,
}

/// The address of one measurement stream: a sensor crossed with one of the
/// properties its type reports. Created by the store alongside the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensingPoint {
    pub id: u64,
    pub sensor: u64,
    pub property: u64,
}

/// One reading in a sensing point's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// The sensing point this reading belongs to.
    pub origin: u64,
    /// Epoch seconds.
    pub timestamp: i64,
    pub value: f64,
}

////////////////////////////////////////////// Handlers ////////////////////////////////////////////

/// Lists every sensor type.
async fn list_sensor_types(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<SensorType>>, (StatusCode, String)> {
    store.list_sensor_types().map(Json).map_err(store_error)
}

/// Creates a sensor type over existing properties.
async fn create_sensor_type(
    State(store): State<Arc<dyn DataStore>>,
    Json(mut st): Json<SensorType>,
) -> Result<Json<SensorType>, (StatusCode, String)> {
    st.read_only = false;
    store.create_sensor_type(st).map(Json).map_err(store_error)
}

/// Gets one sensor type by id.
async fn get_sensor_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<SensorType>, (StatusCode, String)> {
    store
        .get_sensor_type(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no sensor type with id {}", id),
            )
        })
}

/// Updates one sensor type by id. The resource type cannot change.
async fn update_sensor_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut st): Json<SensorType>,
) -> Result<Json<SensorType>, (StatusCode, String)> {
    st.id = id;
    store.update_sensor_type(st).map(Json).map_err(store_error)
}

/// Deletes one sensor type by id.
async fn delete_sensor_type_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_sensor_type(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            format!("no sensor type with id {}", id),
        )),
        Err(err) => Err(store_error(err)),
    }
}

/// Lists every sensor.
async fn list_sensors(
    State(store): State<Arc<dyn DataStore>>,
) -> Result<Json<Vec<Sensor>>, (StatusCode, String)> {
    store.list_sensors().map(Json).map_err(store_error)
}

/// Creates a sensor of an existing type, along with its sensing points.
async fn create_sensor(
    State(store): State<Arc<dyn DataStore>>,
    Json(sensor): Json<Sensor>,
) -> Result<Json<Sensor>, (StatusCode, String)> {
    store.create_sensor(sensor).map(Json).map_err(store_error)
}

/// Gets one sensor by id.
async fn get_sensor_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<Sensor>, (StatusCode, String)> {
    store
        .get_sensor(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no sensor with id {}", id)))
}

/// Updates one sensor by id. The sensor type cannot change.
async fn update_sensor_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(mut sensor): Json<Sensor>,
) -> Result<Json<Sensor>, (StatusCode, String)> {
    sensor.id = id;
    store.update_sensor(sensor).map(Json).map_err(store_error)
}

/// Deletes one sensor by id, cascading to its points and their readings.
async fn delete_sensor_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<StatusCode, (StatusCode, String)> {
    match store.delete_sensor(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((StatusCode::NOT_FOUND, format!("no sensor with id {}", id))),
        Err(err) => Err(store_error(err)),
    }
}

/// Optional `?sensor=` filter for sensing point lists.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SensorQuery {
    sensor: Option<u64>,
}

/// Lists sensing points, optionally only one sensor's.
async fn list_sensing_points(
    State(store): State<Arc<dyn DataStore>>,
    Query(query): Query<SensorQuery>,
) -> Result<Json<Vec<SensingPoint>>, (StatusCode, String)> {
    store
        .list_sensing_points(query.sensor)
        .map(Json)
        .map_err(store_error)
}

/// Gets one sensing point by id.
async fn get_sensing_point_by_id(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<SensingPoint>, (StatusCode, String)> {
    store
        .get_sensing_point(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no sensing point with id {}", id),
            )
        })
}

fn sensing_point_exists(
    store: &Arc<dyn DataStore>,
    id: u64,
) -> Result<(), (StatusCode, String)> {
    store
        .get_sensing_point(id)
        .map_err(store_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no sensing point with id {}", id),
            )
        })?;
    Ok(())
}

/// Gets the latest reading of one sensing point.
async fn get_latest_value(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
) -> Result<Json<DataPoint>, (StatusCode, String)> {
    sensing_point_exists(&store, id)?;
    store
        .latest_data_point(id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                "no value has been recorded for this sensing point yet".to_string(),
            )
        })
}

/// Body of a value post. The timestamp defaults to the server clock.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValueBody {
    value: Option<f64>,
    timestamp: Option<i64>,
}

/// Appends a reading to one sensing point.
async fn post_value(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Json(body): Json<ValueBody>,
) -> Result<Json<DataPoint>, (StatusCode, String)> {
    sensing_point_exists(&store, id)?;
    let Some(value) = body.value else {
        return Err((StatusCode::BAD_REQUEST, "a value is required".to_string()));
    };
    let point = DataPoint {
        origin: id,
        timestamp: body.timestamp.unwrap_or_else(now_timestamp),
        value,
    };
    store.record_data_point(point).map(Json).map_err(store_error)
}

/// `?since=` and `?before=` window for history reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryQuery {
    since: Option<i64>,
    before: Option<i64>,
}

/// Gets the readings of one sensing point strictly inside a time window.
///
/// `since` is required; `before` defaults to the current time. Both bounds
/// are exclusive.
async fn get_value_history(
    State(store): State<Arc<dyn DataStore>>,
    UrlPath(id): UrlPath<u64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<DataPoint>>, (StatusCode, String)> {
    sensing_point_exists(&store, id)?;
    let Some(since) = query.since else {
        return Err((
            StatusCode::BAD_REQUEST,
            "a since timestamp is required".to_string(),
        ));
    };
    let before = query.before.unwrap_or_else(now_timestamp);
    store
        .data_point_history(id, since, before)
        .map(Json)
        .map_err(store_error)
}

////////////////////////////////////////////// Router //////////////////////////////////////////////

/// Creates an Axum router for the sensor surface.
///
/// # Routes
/// - `GET /sensortype`, `POST /sensortype`
/// - `GET /sensortype/:id`, `PUT /sensortype/:id`, `DELETE /sensortype/:id`
/// - `GET /sensor`, `POST /sensor`
/// - `GET /sensor/:id`, `PUT /sensor/:id`, `DELETE /sensor/:id`
/// - `GET /sensingpoint` - List sensing points, `?sensor=<id>` to filter
/// - `GET /sensingpoint/:id`
/// - `GET /sensingpoint/:id/value` - Latest reading
/// - `POST /sensingpoint/:id/value` - Append a reading
/// - `GET /sensingpoint/:id/history?since=<t>&before=<t>` - Window of readings
pub fn create_sensor_router(store: Arc<dyn DataStore>) -> Router {
    Router::new()
        .route("/sensortype", get(list_sensor_types).post(create_sensor_type))
        .route(
            "/sensortype/:id",
            get(get_sensor_type_by_id)
                .put(update_sensor_type_by_id)
                .delete(delete_sensor_type_by_id),
        )
        .route("/sensor", get(list_sensors).post(create_sensor))
        .route(
            "/sensor/:id",
            get(get_sensor_by_id)
                .put(update_sensor_by_id)
                .delete(delete_sensor_by_id),
        )
        .route("/sensingpoint", get(list_sensing_points))
        .route("/sensingpoint/:id", get(get_sensing_point_by_id))
        .route(
            "/sensingpoint/:id/value",
            get(get_latest_value).post(post_value),
        )
        .route("/sensingpoint/:id/history", get(get_value_history))
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_store::InMemoryDataStore;
    use crate::resource::{Resource, ResourceProperty, ResourceType};

    struct Fixture {
        store: Arc<dyn DataStore>,
        air: ResourceType,
        temp: ResourceProperty,
        humid: ResourceProperty,
        dht22: SensorType,
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
        let humid = store
            .create_resource_property(ResourceProperty {
                id: 0,
                code: "humid".to_string(),
                name: "Humidity".to_string(),
                resource_type: air.id,
                read_only: false,
            })
            .unwrap();
        let dht22 = store
            .create_sensor_type(SensorType {
                id: 0,
                name: "DHT22".to_string(),
                resource_type: air.id,
                properties: vec![temp.id, humid.id],
                read_only: false,
            })
            .unwrap();
        Fixture {
            store,
            air,
            temp,
            humid,
            dht22,
        }
    }

    fn new_sensor(sensor_type: u64) -> Sensor {
        Sensor {
            sensor_type,
            ..Sensor::default()
        }
    }

    async fn temp_point(fx: &Fixture) -> SensingPoint {
        let sensor = create_sensor(State(fx.store.clone()), Json(new_sensor(fx.dht22.id)))
            .await
            .unwrap();
        fx.store
            .list_sensing_points(Some(sensor.0.id))
            .unwrap()
            .into_iter()
            .find(|point| point.property == fx.temp.id)
            .unwrap()
    }

    #[tokio::test]
    async fn sensor_types_round_trip_over_http() {
        let fx = fixture();
        let created = create_sensor_type(
            State(fx.store.clone()),
            Json(SensorType {
                name: "SHT31".to_string(),
                resource_type: fx.air.id,
                properties: vec![fx.temp.id],
                ..SensorType::default()
            }),
        )
        .await
        .unwrap();

        let fetched = get_sensor_type_by_id(State(fx.store.clone()), UrlPath(created.0.id))
            .await
            .unwrap();
        assert_eq!(fetched.0, created.0);

        let widened = update_sensor_type_by_id(
            State(fx.store.clone()),
            UrlPath(created.0.id),
            Json(SensorType {
                name: "SHT31".to_string(),
                resource_type: fx.air.id,
                properties: vec![fx.temp.id, fx.humid.id],
                ..SensorType::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(widened.0.properties, vec![fx.temp.id, fx.humid.id]);

        let gone = delete_sensor_type_by_id(State(fx.store.clone()), UrlPath(created.0.id))
            .await
            .unwrap();
        assert_eq!(gone, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn sensor_type_properties_must_match_the_resource_type() {
        let fx = fixture();
        let water = fx
            .store
            .create_resource_type(ResourceType {
                id: 0,
                name: "Water".to_string(),
                read_only: false,
            })
            .unwrap();
        let err = create_sensor_type(
            State(fx.store),
            Json(SensorType {
                name: "Submersible".to_string(),
                resource_type: water.id,
                properties: vec![fx.temp.id],
                ..SensorType::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("does not belong to resource type"));
    }

    #[tokio::test]
    async fn creating_a_sensor_builds_its_points() {
        let fx = fixture();
        let sensor = create_sensor(State(fx.store.clone()), Json(new_sensor(fx.dht22.id)))
            .await
            .unwrap();
        assert_eq!(sensor.0.name, "DHT22 Instance 1");
        assert_eq!(sensor.0.index, 1);

        let points = list_sensing_points(
            State(fx.store.clone()),
            Query(SensorQuery {
                sensor: Some(sensor.0.id),
            }),
        )
        .await
        .unwrap();
        let properties: Vec<u64> = points.0.iter().map(|point| point.property).collect();
        assert_eq!(properties, vec![fx.temp.id, fx.humid.id]);

        // Unfiltered listing sees the same points.
        let all_points = list_sensing_points(State(fx.store), Query(SensorQuery::default()))
            .await
            .unwrap();
        assert_eq!(all_points.0.len(), 2);
    }

    #[tokio::test]
    async fn sensors_reject_type_changes() {
        let fx = fixture();
        let second_type = fx
            .store
            .create_sensor_type(SensorType {
                id: 0,
                name: "SHT31".to_string(),
                resource_type: fx.air.id,
                properties: vec![fx.temp.id],
                read_only: false,
            })
            .unwrap();
        let sensor = create_sensor(State(fx.store.clone()), Json(new_sensor(fx.dht22.id)))
            .await
            .unwrap();

        let err = update_sensor_by_id(
            State(fx.store),
            UrlPath(sensor.0.id),
            Json(new_sensor(second_type.id)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("cannot change"));
    }

    #[tokio::test]
    async fn sensors_attach_only_to_matching_resources() {
        let fx = fixture();
        let water = fx
            .store
            .create_resource_type(ResourceType {
                id: 0,
                name: "Water".to_string(),
                read_only: false,
            })
            .unwrap();
        let reservoir = fx
            .store
            .create_resource(Resource {
                id: 0,
                index: 0,
                name: String::new(),
                resource_type: water.id,
                location: None,
            })
            .unwrap();

        let mut sensor = new_sensor(fx.dht22.id);
        sensor.resource = Some(reservoir.id);
        let err = create_sensor(State(fx.store), Json(sensor)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn values_round_trip() {
        let fx = fixture();
        let point = temp_point(&fx).await;

        let recorded = post_value(
            State(fx.store.clone()),
            UrlPath(point.id),
            Json(ValueBody {
                value: Some(21.5),
                timestamp: Some(100),
            }),
        )
        .await
        .unwrap();
        assert_eq!(recorded.0.origin, point.id);
        assert_eq!(recorded.0.value, 21.5);

        post_value(
            State(fx.store.clone()),
            UrlPath(point.id),
            Json(ValueBody {
                value: Some(22.0),
                timestamp: Some(200),
            }),
        )
        .await
        .unwrap();

        let latest = get_latest_value(State(fx.store), UrlPath(point.id))
            .await
            .unwrap();
        assert_eq!(latest.0.timestamp, 200);
        assert_eq!(latest.0.value, 22.0);
    }

    #[tokio::test]
    async fn a_value_is_required() {
        let fx = fixture();
        let point = temp_point(&fx).await;
        let err = post_value(
            State(fx.store),
            UrlPath(point.id),
            Json(ValueBody::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1, "a value is required");
    }

    #[tokio::test]
    async fn the_timestamp_defaults_to_the_clock() {
        let fx = fixture();
        let point = temp_point(&fx).await;
        let recorded = post_value(
            State(fx.store),
            UrlPath(point.id),
            Json(ValueBody {
                value: Some(1.0),
                timestamp: None,
            }),
        )
        .await
        .unwrap();
        assert!(recorded.0.timestamp > 0);
    }

    #[tokio::test]
    async fn empty_series_are_not_found() {
        let fx = fixture();
        let point = temp_point(&fx).await;
        let err = get_latest_value(State(fx.store), UrlPath(point.id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert!(err.1.contains("no value has been recorded"));
    }

    #[tokio::test]
    async fn unknown_points_are_not_found() {
        let fx = fixture();
        let err = get_latest_value(State(fx.store.clone()), UrlPath(77))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert!(err.1.contains("no sensing point with id 77"));

        let err = post_value(
            State(fx.store),
            UrlPath(77),
            Json(ValueBody {
                value: Some(1.0),
                timestamp: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_requires_since() {
        let fx = fixture();
        let point = temp_point(&fx).await;
        let err = get_value_history(
            State(fx.store),
            UrlPath(point.id),
            Query(HistoryQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("since"));
    }

    #[tokio::test]
    async fn history_is_strict_and_ascending() {
        let fx = fixture();
        let point = temp_point(&fx).await;
        for timestamp in [250, 50, 150, 200, 100] {
            post_value(
                State(fx.store.clone()),
                UrlPath(point.id),
                Json(ValueBody {
                    value: Some(timestamp as f64),
                    timestamp: Some(timestamp),
                }),
            )
            .await
            .unwrap();
        }

        let window = get_value_history(
            State(fx.store.clone()),
            UrlPath(point.id),
            Query(HistoryQuery {
                since: Some(100),
                before: Some(200),
            }),
        )
        .await
        .unwrap();
        let stamps: Vec<i64> = window.0.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![150]);

        // Without a before bound the window runs to the present.
        let open_ended = get_value_history(
            State(fx.store),
            UrlPath(point.id),
            Query(HistoryQuery {
                since: Some(0),
                before: None,
            }),
        )
        .await
        .unwrap();
        let stamps: Vec<i64> = open_ended.0.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![50, 100, 150, 200, 250]);
    }

    #[tokio::test]
    async fn deleting_a_sensor_removes_its_points() {
        let fx = fixture();
        let sensor = create_sensor(State(fx.store.clone()), Json(new_sensor(fx.dht22.id)))
            .await
            .unwrap();
        let gone = delete_sensor_by_id(State(fx.store.clone()), UrlPath(sensor.0.id))
            .await
            .unwrap();
        assert_eq!(gone, StatusCode::NO_CONTENT);

        let points = list_sensing_points(State(fx.store), Query(SensorQuery::default()))
            .await
            .unwrap();
        assert!(points.0.is_empty());
    }
}
