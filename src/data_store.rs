//! # Data Storage Abstraction
//!
//! This module provides the core data storage abstraction for the trellis
//! system. It defines the `DataStore` trait and an in-memory implementation
//! covering farms, layout objects, resources, sensors, actuators, and their
//! time-series readings.
//!
//! ## Architecture
//!
//! The data store system is built around the `DataStore` trait, which
//! provides a uniform interface for different storage backends. The system
//! supports:
//!
//! - **Farm Management**: The server's own farm plus the root-side registry
//! - **Layout Objects**: Placeable entities addressed by a shared `super_id`
//! - **Resource Taxonomy**: Resource types, their properties, and resources
//! - **Instruments**: Sensor and actuator types and their instances
//! - **Time Series**: Append-only readings and actuator state records
//!
//! ## Storage Model
//!
//! ```text
//! Farm ── LayoutObject (super_id) ── Resource ──┬── Sensor ── SensingPoint ── DataPoint
//!                                               └── Actuator ── ActuatorState
//! ```
//!
//! Every collection hands out numeric ids starting at 1. Sensors, actuators,
//! and resources additionally carry a per-type `index` drawn from a counter
//! that only ever grows, so indices stay unique under deletion.
//!
//! ## Usage Examples
//!
//! ```rust
//! use trellis::{DataStore, InMemoryDataStore, Resource, ResourceType};
//!
//! let store = InMemoryDataStore::new();
//! let air = store
//!     .create_resource_type(ResourceType {
//!         id: 0,
//!         name: "Air".to_string(),
//!         read_only: false,
//!     })
//!     .unwrap();
//! let duct = store
//!     .create_resource(Resource {
//!         id: 0,
//!         index: 0,
//!         name: String::new(),
//!         resource_type: air.id,
//!         location: None,
//!     })
//!     .unwrap();
//! assert_eq!(duct.name, "Air Resource 1");
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use crate::actuator::{Actuator, ActuatorState, ActuatorType};
use crate::farm::{Farm, UNCONFIGURED_SLUG};
use crate::layout::{LayoutObject, Model3D};
use crate::resource::{Resource, ResourceProperty, ResourceType};
use crate::sensor::{DataPoint, Sensor, SensingPoint, SensorType};
use crate::slug::{Slug, canonicalize};

//////////////////////////////////////////// DataStoreError ////////////////////////////////////////

/// Errors that can occur during data store operations.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStoreError {
    /// The item addressed by id does not exist
    NotFound,
    /// An item with the same identifying fields already exists
    AlreadyExists,
    /// The operation would break a relationship other rows depend on
    Conflict(String),
    /// A field in the submitted item is missing, malformed, or references a
    /// row that does not exist
    Invalid(String),
    /// The addressed item is a stock entry and cannot be modified
    ReadOnly,
    /// An internal storage error occurred
    Internal(String),
}

impl std::fmt::Display for DataStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "item not found in data store"),
            Self::AlreadyExists => write!(f, "item already exists in data store"),
            Self::Conflict(msg) => write!(f, "conflict: {}", msg),
            Self::Invalid(msg) => write!(f, "invalid item: {}", msg),
            Self::ReadOnly => write!(f, "stock entries are read-only"),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for DataStoreError {}

////////////////////////////////////////////// DataStore ///////////////////////////////////////////

/// Trait defining the storage interface for the trellis system.
///
/// Reads of a single item return `Ok(None)` when the id is unknown; writes
/// addressed at an id return `Err(DataStoreError::NotFound)` instead, and
/// deletes return `Ok(false)`. Methods that accept a freshly built item
/// assign its id (and, where applicable, its per-type index and default
/// name) and hand the stored copy back.
///
/// # Thread Safety
///
/// Implementors must ensure that all operations are thread-safe. The trait
/// requires `Send + Sync` to enable safe sharing across handler tasks.
pub trait DataStore: Send + Sync {
    // Farm operations

    /// Returns this server's own farm.
    fn get_local_farm(&self) -> Result<Farm, DataStoreError>;

    /// Persists this server's own farm.
    ///
    /// # Returns
    /// * `Ok(farm)` - The stored farm
    /// * `Err(DataStoreError::Conflict)` - The farm already has a layout and
    ///   the submitted farm names a different one
    fn commit_local_farm(&self, farm: &Farm) -> Result<Farm, DataStoreError>;

    /// Registers a farm in the root-side collection, assigning its root id.
    ///
    /// The farm's slug is derived from its name when unset; a slug another
    /// farm already holds is deduplicated by suffixing the new root id.
    fn register_farm(&self, farm: &Farm) -> Result<Farm, DataStoreError>;

    /// Updates a registered farm addressed by its root id.
    fn update_registered_farm(&self, farm: &Farm) -> Result<Farm, DataStoreError>;

    /// Returns a registered farm by root id.
    fn get_registered_farm(&self, root_id: u64) -> Result<Option<Farm>, DataStoreError>;

    /// Returns every registered farm ordered by root id.
    fn list_registered_farms(&self) -> Result<Vec<Farm>, DataStoreError>;

    // Layout object operations

    /// Creates a layout object, assigning its super id.
    ///
    /// An empty name defaults to `"{farm} {Type} {id}"` when the farm has a
    /// name to lend.
    fn create_layout_object(
        &self,
        object: LayoutObject,
        farm_name: &str,
    ) -> Result<LayoutObject, DataStoreError>;

    /// Returns a layout object by super id.
    fn get_layout_object(&self, super_id: u64) -> Result<Option<LayoutObject>, DataStoreError>;

    /// Returns every object of one entity type ordered by super id.
    fn list_layout_objects(&self, entity_type: &Slug) -> Result<Vec<LayoutObject>, DataStoreError>;

    /// Replaces a layout object. The entity type is immutable; an empty name
    /// keeps the stored one.
    fn update_layout_object(&self, object: LayoutObject) -> Result<LayoutObject, DataStoreError>;

    /// Deletes a layout object.
    ///
    /// # Returns
    /// * `Ok(true)` - The object existed and was removed
    /// * `Ok(false)` - No such object
    /// * `Err(DataStoreError::Conflict)` - Children or resources still
    ///   reference the object
    fn delete_layout_object(&self, super_id: u64) -> Result<bool, DataStoreError>;

    // 3-D model operations

    /// Creates a 3-D model, assigning its id.
    fn create_model(&self, model: Model3D) -> Result<Model3D, DataStoreError>;

    /// Returns a model by id.
    fn get_model(&self, id: u64) -> Result<Option<Model3D>, DataStoreError>;

    /// Returns every model ordered by id.
    fn list_models(&self) -> Result<Vec<Model3D>, DataStoreError>;

    /// Replaces a model.
    fn update_model(&self, model: Model3D) -> Result<Model3D, DataStoreError>;

    /// Deletes a model unless layout objects still reference it.
    fn delete_model(&self, id: u64) -> Result<bool, DataStoreError>;

    // Resource taxonomy operations

    /// Creates a resource type. Names are unique.
    fn create_resource_type(&self, rt: ResourceType) -> Result<ResourceType, DataStoreError>;

    /// Returns a resource type by id.
    fn get_resource_type(&self, id: u64) -> Result<Option<ResourceType>, DataStoreError>;

    /// Returns every resource type ordered by id.
    fn list_resource_types(&self) -> Result<Vec<ResourceType>, DataStoreError>;

    /// Renames a resource type. Stock types reject modification.
    fn update_resource_type(&self, rt: ResourceType) -> Result<ResourceType, DataStoreError>;

    /// Deletes a resource type nothing references.
    fn delete_resource_type(&self, id: u64) -> Result<bool, DataStoreError>;

    /// Creates a resource property. `(code, resource_type)` and
    /// `(name, resource_type)` are both unique.
    fn create_resource_property(
        &self,
        property: ResourceProperty,
    ) -> Result<ResourceProperty, DataStoreError>;

    /// Returns a resource property by id.
    fn get_resource_property(&self, id: u64) -> Result<Option<ResourceProperty>, DataStoreError>;

    /// Returns every resource property ordered by id.
    fn list_resource_properties(&self) -> Result<Vec<ResourceProperty>, DataStoreError>;

    /// Updates a resource property. The owning resource type is immutable
    /// and stock properties reject modification.
    fn update_resource_property(
        &self,
        property: ResourceProperty,
    ) -> Result<ResourceProperty, DataStoreError>;

    /// Deletes a resource property nothing references.
    fn delete_resource_property(&self, id: u64) -> Result<bool, DataStoreError>;

    /// Creates a resource, assigning its id and per-type index.
    ///
    /// An empty name defaults to `"{type} Resource {index}"`.
    fn create_resource(&self, resource: Resource) -> Result<Resource, DataStoreError>;

    /// Returns a resource by id.
    fn get_resource(&self, id: u64) -> Result<Option<Resource>, DataStoreError>;

    /// Returns every resource ordered by id.
    fn list_resources(&self) -> Result<Vec<Resource>, DataStoreError>;

    /// Updates a resource. The resource type is immutable.
    fn update_resource(&self, resource: Resource) -> Result<Resource, DataStoreError>;

    /// Deletes a resource no sensor or actuator is attached to.
    fn delete_resource(&self, id: u64) -> Result<bool, DataStoreError>;

    // Sensor operations

    /// Creates a sensor type. `(name, resource_type)` is unique and every
    /// property must belong to the type's resource type.
    fn create_sensor_type(&self, st: SensorType) -> Result<SensorType, DataStoreError>;

    /// Returns a sensor type by id.
    fn get_sensor_type(&self, id: u64) -> Result<Option<SensorType>, DataStoreError>;

    /// Returns every sensor type ordered by id.
    fn list_sensor_types(&self) -> Result<Vec<SensorType>, DataStoreError>;

    /// Updates a sensor type. The resource type is immutable and stock types
    /// reject modification.
    fn update_sensor_type(&self, st: SensorType) -> Result<SensorType, DataStoreError>;

    /// Deletes a sensor type no sensor instantiates.
    fn delete_sensor_type(&self, id: u64) -> Result<bool, DataStoreError>;

    /// Creates a sensor, assigning its id and per-type index, defaulting an
    /// empty name to `"{type} Instance {index}"`, and creating one sensing
    /// point per property of the sensor type.
    fn create_sensor(&self, sensor: Sensor) -> Result<Sensor, DataStoreError>;

    /// Returns a sensor by id.
    fn get_sensor(&self, id: u64) -> Result<Option<Sensor>, DataStoreError>;

    /// Returns every sensor ordered by id.
    fn list_sensors(&self) -> Result<Vec<Sensor>, DataStoreError>;

    /// Updates a sensor. The sensor type and index are immutable.
    fn update_sensor(&self, sensor: Sensor) -> Result<Sensor, DataStoreError>;

    /// Deletes a sensor along with its sensing points and their readings.
    fn delete_sensor(&self, id: u64) -> Result<bool, DataStoreError>;

    /// Returns a sensing point by id.
    fn get_sensing_point(&self, id: u64) -> Result<Option<SensingPoint>, DataStoreError>;

    /// Returns sensing points ordered by id, optionally only those of one
    /// sensor.
    fn list_sensing_points(&self, sensor: Option<u64>)
    -> Result<Vec<SensingPoint>, DataStoreError>;

    /// Appends a reading to a sensing point's series.
    fn record_data_point(&self, point: DataPoint) -> Result<DataPoint, DataStoreError>;

    /// Returns the reading with the greatest timestamp, if any.
    fn latest_data_point(&self, origin: u64) -> Result<Option<DataPoint>, DataStoreError>;

    /// Returns readings with `since < timestamp < before` in ascending
    /// timestamp order.
    fn data_point_history(
        &self,
        origin: u64,
        since: i64,
        before: i64,
    ) -> Result<Vec<DataPoint>, DataStoreError>;

    // Actuator operations

    /// Creates an actuator type. `(code, resource_type)` and
    /// `(name, resource_type)` are both unique and every property must
    /// belong to the type's resource type.
    fn create_actuator_type(&self, at: ActuatorType) -> Result<ActuatorType, DataStoreError>;

    /// Returns an actuator type by id.
    fn get_actuator_type(&self, id: u64) -> Result<Option<ActuatorType>, DataStoreError>;

    /// Returns every actuator type ordered by id.
    fn list_actuator_types(&self) -> Result<Vec<ActuatorType>, DataStoreError>;

    /// Updates an actuator type. The resource type is immutable and stock
    /// types reject modification.
    fn update_actuator_type(&self, at: ActuatorType) -> Result<ActuatorType, DataStoreError>;

    /// Deletes an actuator type no actuator instantiates.
    fn delete_actuator_type(&self, id: u64) -> Result<bool, DataStoreError>;

    /// Creates an actuator, assigning its id and per-type index and
    /// defaulting an empty name to `"{type} {index}"`. Override fields start
    /// unset.
    fn create_actuator(&self, actuator: Actuator) -> Result<Actuator, DataStoreError>;

    /// Returns an actuator by id, clearing its override first if the
    /// override has expired at `now`.
    ///
    /// # Returns
    /// * `Ok(Some(actuator))` - The actuator, with any expired override
    ///   already cleared and the clear persisted
    /// * `Ok(None)` - No such actuator
    fn get_actuator(&self, id: u64, now: i64) -> Result<Option<Actuator>, DataStoreError>;

    /// Returns every actuator ordered by id, clearing expired overrides
    /// first.
    fn list_actuators(&self, now: i64) -> Result<Vec<Actuator>, DataStoreError>;

    /// Updates an actuator. The actuator type, index, and override fields
    /// are immutable through this path.
    fn update_actuator(&self, actuator: Actuator) -> Result<Actuator, DataStoreError>;

    /// Deletes an actuator along with its recorded states.
    fn delete_actuator(&self, id: u64) -> Result<bool, DataStoreError>;

    /// Sets an actuator's override value and absolute expiry timestamp.
    fn set_override(&self, id: u64, value: f64, timeout: i64)
    -> Result<Actuator, DataStoreError>;

    /// Appends a state record to an actuator's series.
    fn record_actuator_state(&self, state: ActuatorState)
    -> Result<ActuatorState, DataStoreError>;

    /// Returns the state record with the greatest timestamp, if any.
    fn latest_actuator_state(
        &self,
        origin: u64,
    ) -> Result<Option<ActuatorState>, DataStoreError>;

    /// Returns state records with `since < timestamp < before` in ascending
    /// timestamp order.
    fn actuator_state_history(
        &self,
        origin: u64,
        since: i64,
        before: i64,
    ) -> Result<Vec<ActuatorState>, DataStoreError>;
}

/////////////////////////////////////////////// Tables /////////////////////////////////////////////

/// One id-keyed collection with its id allocator.
struct Table<T> {
    next_id: u64,
    rows: HashMap<u64, T>,
}

impl<T> Table<T> {
    fn new() -> Self {
        Self {
            next_id: 1,
            rows: HashMap::new(),
        }
    }

    fn alloc(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// A table of per-type instances plus the per-type index counters. The
/// counters only ever grow, so an index names one instance forever even
/// after deletions.
struct Instances<T> {
    table: Table<T>,
    counts: HashMap<u64, u64>,
}

impl<T> Instances<T> {
    fn new() -> Self {
        Self {
            table: Table::new(),
            counts: HashMap::new(),
        }
    }

    fn next_index(&mut self, type_id: u64) -> u64 {
        let count = self.counts.entry(type_id).or_insert(0);
        *count += 1;
        *count
    }
}

///////////////////////////////////////// InMemoryDataStore ////////////////////////////////////////

/// Thread-safe in-memory implementation of the DataStore trait.
///
/// All data lives in `Mutex`-protected collections, one lock per
/// collection. Methods that need more than one collection acquire the locks
/// in field declaration order.
pub struct InMemoryDataStore {
    local_farm: Mutex<Farm>,
    farms: Mutex<Table<Farm>>,
    layout_objects: Mutex<Table<LayoutObject>>,
    models: Mutex<Table<Model3D>>,
    resource_types: Mutex<Table<ResourceType>>,
    resource_properties: Mutex<Table<ResourceProperty>>,
    resources: Mutex<Instances<Resource>>,
    sensor_types: Mutex<Table<SensorType>>,
    sensors: Mutex<Instances<Sensor>>,
    sensing_points: Mutex<Table<SensingPoint>>,
    data_points: Mutex<HashMap<u64, Vec<DataPoint>>>,
    actuator_types: Mutex<Table<ActuatorType>>,
    actuators: Mutex<Instances<Actuator>>,
    actuator_states: Mutex<HashMap<u64, Vec<ActuatorState>>>,
}

impl InMemoryDataStore {
    /// Creates an empty store whose local farm starts unconfigured.
    pub fn new() -> Self {
        Self {
            local_farm: Mutex::new(Farm::unconfigured()),
            farms: Mutex::new(Table::new()),
            layout_objects: Mutex::new(Table::new()),
            models: Mutex::new(Table::new()),
            resource_types: Mutex::new(Table::new()),
            resource_properties: Mutex::new(Table::new()),
            resources: Mutex::new(Instances::new()),
            sensor_types: Mutex::new(Table::new()),
            sensors: Mutex::new(Instances::new()),
            sensing_points: Mutex::new(Table::new()),
            data_points: Mutex::new(HashMap::new()),
            actuator_types: Mutex::new(Table::new()),
            actuators: Mutex::new(Instances::new()),
            actuator_states: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_by_id<T, F: Fn(&T) -> u64>(rows: &HashMap<u64, T>, id: F) -> Vec<T>
where
    T: Clone,
{
    let mut out: Vec<T> = rows.values().cloned().collect();
    out.sort_by_key(|row| id(row));
    out
}

impl DataStore for InMemoryDataStore {
    fn get_local_farm(&self) -> Result<Farm, DataStoreError> {
        Ok(self.local_farm.lock().unwrap().clone())
    }

    fn commit_local_farm(&self, farm: &Farm) -> Result<Farm, DataStoreError> {
        let mut local = self.local_farm.lock().unwrap();
        if local.layout.is_some() && farm.layout != local.layout {
            return Err(DataStoreError::Conflict(
                "the layout of a configured farm cannot change".to_string(),
            ));
        }
        *local = farm.clone();
        Ok(local.clone())
    }

    fn register_farm(&self, farm: &Farm) -> Result<Farm, DataStoreError> {
        let name = match farm.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(DataStoreError::Invalid(
                    "a farm cannot register without a name".to_string(),
                ));
            }
        };
        let mut farms = self.farms.lock().unwrap();
        let root_id = farms.alloc();
        let mut slug = if farm.slug.is_empty() || farm.slug == UNCONFIGURED_SLUG {
            canonicalize(name)
        } else {
            farm.slug.clone()
        };
        if slug.is_empty() {
            return Err(DataStoreError::Invalid(format!(
                "farm name {:?} does not canonicalize to a slug",
                name
            )));
        }
        if farms.rows.values().any(|other| other.slug == slug) {
            slug = format!("{}-{}", slug, root_id);
        }
        let mut stored = farm.clone();
        stored.root_id = Some(root_id);
        stored.slug = slug;
        farms.rows.insert(root_id, stored.clone());
        Ok(stored)
    }

    fn update_registered_farm(&self, farm: &Farm) -> Result<Farm, DataStoreError> {
        let Some(root_id) = farm.root_id else {
            return Err(DataStoreError::Invalid(
                "an update must carry the farm's root id".to_string(),
            ));
        };
        let mut farms = self.farms.lock().unwrap();
        let taken = farm.slug.is_empty()
            || farms
                .rows
                .values()
                .any(|other| other.root_id != Some(root_id) && other.slug == farm.slug);
        let Some(stored) = farms.rows.get_mut(&root_id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.layout.is_some() && farm.layout != stored.layout {
            return Err(DataStoreError::Conflict(
                "the layout of a configured farm cannot change".to_string(),
            ));
        }
        let slug = if taken {
            stored.slug.clone()
        } else {
            farm.slug.clone()
        };
        *stored = farm.clone();
        stored.root_id = Some(root_id);
        stored.slug = slug;
        Ok(stored.clone())
    }

    fn get_registered_farm(&self, root_id: u64) -> Result<Option<Farm>, DataStoreError> {
        Ok(self.farms.lock().unwrap().rows.get(&root_id).cloned())
    }

    fn list_registered_farms(&self) -> Result<Vec<Farm>, DataStoreError> {
        let farms = self.farms.lock().unwrap();
        let mut out: Vec<Farm> = farms.rows.values().cloned().collect();
        out.sort_by_key(|farm| farm.root_id);
        Ok(out)
    }

    fn create_layout_object(
        &self,
        mut object: LayoutObject,
        farm_name: &str,
    ) -> Result<LayoutObject, DataStoreError> {
        let mut objects = self.layout_objects.lock().unwrap();
        let super_id = objects.alloc();
        object.super_id = super_id;
        if object.name.is_empty() && !farm_name.is_empty() {
            object.name = format!(
                "{} {} {}",
                farm_name,
                object.entity_type.type_name(),
                super_id
            );
        }
        objects.rows.insert(super_id, object.clone());
        Ok(object)
    }

    fn get_layout_object(&self, super_id: u64) -> Result<Option<LayoutObject>, DataStoreError> {
        Ok(self
            .layout_objects
            .lock()
            .unwrap()
            .rows
            .get(&super_id)
            .cloned())
    }

    fn list_layout_objects(&self, entity_type: &Slug) -> Result<Vec<LayoutObject>, DataStoreError> {
        let objects = self.layout_objects.lock().unwrap();
        let mut out: Vec<LayoutObject> = objects
            .rows
            .values()
            .filter(|object| &object.entity_type == entity_type)
            .cloned()
            .collect();
        out.sort_by_key(|object| object.super_id);
        Ok(out)
    }

    fn update_layout_object(&self, object: LayoutObject) -> Result<LayoutObject, DataStoreError> {
        let mut objects = self.layout_objects.lock().unwrap();
        let Some(stored) = objects.rows.get_mut(&object.super_id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.entity_type != object.entity_type {
            return Err(DataStoreError::Invalid(
                "the type of a layout object cannot change".to_string(),
            ));
        }
        let name = if object.name.is_empty() {
            stored.name.clone()
        } else {
            object.name.clone()
        };
        *stored = object;
        stored.name = name;
        Ok(stored.clone())
    }

    fn delete_layout_object(&self, super_id: u64) -> Result<bool, DataStoreError> {
        let mut objects = self.layout_objects.lock().unwrap();
        let resources = self.resources.lock().unwrap();
        if !objects.rows.contains_key(&super_id) {
            return Ok(false);
        }
        if objects
            .rows
            .values()
            .any(|object| object.parent == Some(super_id))
        {
            return Err(DataStoreError::Conflict(format!(
                "other layout objects still list {} as their parent",
                super_id
            )));
        }
        if resources
            .table
            .rows
            .values()
            .any(|resource| resource.location == Some(super_id))
        {
            return Err(DataStoreError::Conflict(format!(
                "resources are still located in {}",
                super_id
            )));
        }
        objects.rows.remove(&super_id);
        Ok(true)
    }

    fn create_model(&self, mut model: Model3D) -> Result<Model3D, DataStoreError> {
        let mut models = self.models.lock().unwrap();
        model.id = models.alloc();
        models.rows.insert(model.id, model.clone());
        Ok(model)
    }

    fn get_model(&self, id: u64) -> Result<Option<Model3D>, DataStoreError> {
        Ok(self.models.lock().unwrap().rows.get(&id).cloned())
    }

    fn list_models(&self) -> Result<Vec<Model3D>, DataStoreError> {
        Ok(sorted_by_id(&self.models.lock().unwrap().rows, |m| m.id))
    }

    fn update_model(&self, model: Model3D) -> Result<Model3D, DataStoreError> {
        let mut models = self.models.lock().unwrap();
        let Some(stored) = models.rows.get_mut(&model.id) else {
            return Err(DataStoreError::NotFound);
        };
        *stored = model.clone();
        Ok(model)
    }

    fn delete_model(&self, id: u64) -> Result<bool, DataStoreError> {
        let objects = self.layout_objects.lock().unwrap();
        let mut models = self.models.lock().unwrap();
        if !models.rows.contains_key(&id) {
            return Ok(false);
        }
        if objects
            .rows
            .values()
            .any(|object| object.model_id == Some(id))
        {
            return Err(DataStoreError::Conflict(format!(
                "layout objects still reference model {}",
                id
            )));
        }
        models.rows.remove(&id);
        Ok(true)
    }

    fn create_resource_type(&self, mut rt: ResourceType) -> Result<ResourceType, DataStoreError> {
        if rt.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "a resource type needs a name".to_string(),
            ));
        }
        let mut types = self.resource_types.lock().unwrap();
        if types.rows.values().any(|other| other.name == rt.name) {
            return Err(DataStoreError::AlreadyExists);
        }
        rt.id = types.alloc();
        types.rows.insert(rt.id, rt.clone());
        Ok(rt)
    }

    fn get_resource_type(&self, id: u64) -> Result<Option<ResourceType>, DataStoreError> {
        Ok(self.resource_types.lock().unwrap().rows.get(&id).cloned())
    }

    fn list_resource_types(&self) -> Result<Vec<ResourceType>, DataStoreError> {
        Ok(sorted_by_id(&self.resource_types.lock().unwrap().rows, |rt| {
            rt.id
        }))
    }

    fn update_resource_type(&self, rt: ResourceType) -> Result<ResourceType, DataStoreError> {
        if rt.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "a resource type needs a name".to_string(),
            ));
        }
        let mut types = self.resource_types.lock().unwrap();
        if types
            .rows
            .values()
            .any(|other| other.id != rt.id && other.name == rt.name)
        {
            return Err(DataStoreError::AlreadyExists);
        }
        let Some(stored) = types.rows.get_mut(&rt.id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        stored.name = rt.name;
        Ok(stored.clone())
    }

    fn delete_resource_type(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut types = self.resource_types.lock().unwrap();
        let properties = self.resource_properties.lock().unwrap();
        let resources = self.resources.lock().unwrap();
        let sensor_types = self.sensor_types.lock().unwrap();
        let actuator_types = self.actuator_types.lock().unwrap();
        let Some(stored) = types.rows.get(&id) else {
            return Ok(false);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        let referenced = properties.rows.values().any(|p| p.resource_type == id)
            || resources.table.rows.values().any(|r| r.resource_type == id)
            || sensor_types.rows.values().any(|st| st.resource_type == id)
            || actuator_types.rows.values().any(|at| at.resource_type == id);
        if referenced {
            return Err(DataStoreError::Conflict(format!(
                "resource type {} is still in use",
                id
            )));
        }
        types.rows.remove(&id);
        Ok(true)
    }

    fn create_resource_property(
        &self,
        mut property: ResourceProperty,
    ) -> Result<ResourceProperty, DataStoreError> {
        if property.code.is_empty() {
            return Err(DataStoreError::Invalid(
                "a resource property needs a code".to_string(),
            ));
        }
        if property.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "a resource property needs a name".to_string(),
            ));
        }
        let types = self.resource_types.lock().unwrap();
        let mut properties = self.resource_properties.lock().unwrap();
        if !types.rows.contains_key(&property.resource_type) {
            return Err(DataStoreError::Invalid(format!(
                "resource type {} does not exist",
                property.resource_type
            )));
        }
        let clash = properties.rows.values().any(|other| {
            other.resource_type == property.resource_type
                && (other.code == property.code || other.name == property.name)
        });
        if clash {
            return Err(DataStoreError::AlreadyExists);
        }
        property.id = properties.alloc();
        properties.rows.insert(property.id, property.clone());
        Ok(property)
    }

    fn get_resource_property(&self, id: u64) -> Result<Option<ResourceProperty>, DataStoreError> {
        Ok(self
            .resource_properties
            .lock()
            .unwrap()
            .rows
            .get(&id)
            .cloned())
    }

    fn list_resource_properties(&self) -> Result<Vec<ResourceProperty>, DataStoreError> {
        Ok(sorted_by_id(
            &self.resource_properties.lock().unwrap().rows,
            |p| p.id,
        ))
    }

    fn update_resource_property(
        &self,
        property: ResourceProperty,
    ) -> Result<ResourceProperty, DataStoreError> {
        if property.code.is_empty() {
            return Err(DataStoreError::Invalid(
                "a resource property needs a code".to_string(),
            ));
        }
        if property.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "a resource property needs a name".to_string(),
            ));
        }
        let mut properties = self.resource_properties.lock().unwrap();
        let clash = properties.rows.values().any(|other| {
            other.id != property.id
                && other.resource_type == property.resource_type
                && (other.code == property.code || other.name == property.name)
        });
        if clash {
            return Err(DataStoreError::AlreadyExists);
        }
        let Some(stored) = properties.rows.get_mut(&property.id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        if stored.resource_type != property.resource_type {
            return Err(DataStoreError::Invalid(
                "the resource type of a property cannot change".to_string(),
            ));
        }
        stored.code = property.code;
        stored.name = property.name;
        Ok(stored.clone())
    }

    fn delete_resource_property(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut properties = self.resource_properties.lock().unwrap();
        let sensor_types = self.sensor_types.lock().unwrap();
        let sensing_points = self.sensing_points.lock().unwrap();
        let actuator_types = self.actuator_types.lock().unwrap();
        let Some(stored) = properties.rows.get(&id) else {
            return Ok(false);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        let referenced = sensor_types
            .rows
            .values()
            .any(|st| st.properties.contains(&id))
            || actuator_types
                .rows
                .values()
                .any(|at| at.properties.contains(&id))
            || sensing_points.rows.values().any(|sp| sp.property == id);
        if referenced {
            return Err(DataStoreError::Conflict(format!(
                "resource property {} is still in use",
                id
            )));
        }
        properties.rows.remove(&id);
        Ok(true)
    }

    fn create_resource(&self, mut resource: Resource) -> Result<Resource, DataStoreError> {
        let objects = self.layout_objects.lock().unwrap();
        let types = self.resource_types.lock().unwrap();
        let mut resources = self.resources.lock().unwrap();
        let Some(rt) = types.rows.get(&resource.resource_type) else {
            return Err(DataStoreError::Invalid(format!(
                "resource type {} does not exist",
                resource.resource_type
            )));
        };
        if let Some(location) = resource.location {
            if !objects.rows.contains_key(&location) {
                return Err(DataStoreError::Invalid(format!(
                    "layout object {} does not exist",
                    location
                )));
            }
        }
        resource.id = resources.table.alloc();
        resource.index = resources.next_index(resource.resource_type);
        if resource.name.is_empty() {
            resource.name = format!("{} Resource {}", rt.name, resource.index);
        }
        resources.table.rows.insert(resource.id, resource.clone());
        Ok(resource)
    }

    fn get_resource(&self, id: u64) -> Result<Option<Resource>, DataStoreError> {
        Ok(self.resources.lock().unwrap().table.rows.get(&id).cloned())
    }

    fn list_resources(&self) -> Result<Vec<Resource>, DataStoreError> {
        Ok(sorted_by_id(
            &self.resources.lock().unwrap().table.rows,
            |r| r.id,
        ))
    }

    fn update_resource(&self, resource: Resource) -> Result<Resource, DataStoreError> {
        let objects = self.layout_objects.lock().unwrap();
        let mut resources = self.resources.lock().unwrap();
        if let Some(location) = resource.location {
            if !objects.rows.contains_key(&location) {
                return Err(DataStoreError::Invalid(format!(
                    "layout object {} does not exist",
                    location
                )));
            }
        }
        let Some(stored) = resources.table.rows.get_mut(&resource.id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.resource_type != resource.resource_type {
            return Err(DataStoreError::Invalid(
                "the resource type of a resource cannot change".to_string(),
            ));
        }
        if !resource.name.is_empty() {
            stored.name = resource.name;
        }
        stored.location = resource.location;
        Ok(stored.clone())
    }

    fn delete_resource(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut resources = self.resources.lock().unwrap();
        let sensors = self.sensors.lock().unwrap();
        let actuators = self.actuators.lock().unwrap();
        if !resources.table.rows.contains_key(&id) {
            return Ok(false);
        }
        let referenced = sensors.table.rows.values().any(|s| s.resource == Some(id))
            || actuators
                .table
                .rows
                .values()
                .any(|a| a.resource == Some(id));
        if referenced {
            return Err(DataStoreError::Conflict(format!(
                "sensors or actuators are still attached to resource {}",
                id
            )));
        }
        resources.table.rows.remove(&id);
        Ok(true)
    }

    fn create_sensor_type(&self, mut st: SensorType) -> Result<SensorType, DataStoreError> {
        if st.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "a sensor type needs a name".to_string(),
            ));
        }
        let types = self.resource_types.lock().unwrap();
        let properties = self.resource_properties.lock().unwrap();
        let mut sensor_types = self.sensor_types.lock().unwrap();
        if !types.rows.contains_key(&st.resource_type) {
            return Err(DataStoreError::Invalid(format!(
                "resource type {} does not exist",
                st.resource_type
            )));
        }
        check_property_membership(&properties.rows, &st.properties, st.resource_type)?;
        if sensor_types
            .rows
            .values()
            .any(|other| other.resource_type == st.resource_type && other.name == st.name)
        {
            return Err(DataStoreError::AlreadyExists);
        }
        st.id = sensor_types.alloc();
        sensor_types.rows.insert(st.id, st.clone());
        Ok(st)
    }

    fn get_sensor_type(&self, id: u64) -> Result<Option<SensorType>, DataStoreError> {
        Ok(self.sensor_types.lock().unwrap().rows.get(&id).cloned())
    }

    fn list_sensor_types(&self) -> Result<Vec<SensorType>, DataStoreError> {
        Ok(sorted_by_id(&self.sensor_types.lock().unwrap().rows, |st| {
            st.id
        }))
    }

    fn update_sensor_type(&self, st: SensorType) -> Result<SensorType, DataStoreError> {
        if st.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "a sensor type needs a name".to_string(),
            ));
        }
        let properties = self.resource_properties.lock().unwrap();
        let mut sensor_types = self.sensor_types.lock().unwrap();
        check_property_membership(&properties.rows, &st.properties, st.resource_type)?;
        if sensor_types.rows.values().any(|other| {
            other.id != st.id && other.resource_type == st.resource_type && other.name == st.name
        }) {
            return Err(DataStoreError::AlreadyExists);
        }
        let Some(stored) = sensor_types.rows.get_mut(&st.id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        if stored.resource_type != st.resource_type {
            return Err(DataStoreError::Invalid(
                "the resource type of a sensor type cannot change".to_string(),
            ));
        }
        stored.name = st.name;
        stored.properties = st.properties;
        Ok(stored.clone())
    }

    fn delete_sensor_type(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut sensor_types = self.sensor_types.lock().unwrap();
        let sensors = self.sensors.lock().unwrap();
        let Some(stored) = sensor_types.rows.get(&id) else {
            return Ok(false);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        if sensors
            .table
            .rows
            .values()
            .any(|sensor| sensor.sensor_type == id)
        {
            return Err(DataStoreError::Conflict(format!(
                "sensors of type {} still exist",
                id
            )));
        }
        sensor_types.rows.remove(&id);
        Ok(true)
    }

    fn create_sensor(&self, mut sensor: Sensor) -> Result<Sensor, DataStoreError> {
        let resources = self.resources.lock().unwrap();
        let sensor_types = self.sensor_types.lock().unwrap();
        let mut sensors = self.sensors.lock().unwrap();
        let mut sensing_points = self.sensing_points.lock().unwrap();
        let Some(st) = sensor_types.rows.get(&sensor.sensor_type) else {
            return Err(DataStoreError::Invalid(format!(
                "sensor type {} does not exist",
                sensor.sensor_type
            )));
        };
        check_resource_match(
            &resources.table.rows,
            sensor.resource,
            st.resource_type,
            "sensor",
        )?;
        sensor.id = sensors.table.alloc();
        sensor.index = sensors.next_index(sensor.sensor_type);
        if sensor.name.is_empty() {
            sensor.name = format!("{} Instance {}", st.name, sensor.index);
        }
        sensors.table.rows.insert(sensor.id, sensor.clone());
        for property in &st.properties {
            let id = sensing_points.alloc();
            sensing_points.rows.insert(
                id,
                SensingPoint {
                    id,
                    sensor: sensor.id,
                    property: *property,
                },
            );
        }
        Ok(sensor)
    }

    fn get_sensor(&self, id: u64) -> Result<Option<Sensor>, DataStoreError> {
        Ok(self.sensors.lock().unwrap().table.rows.get(&id).cloned())
    }

    fn list_sensors(&self) -> Result<Vec<Sensor>, DataStoreError> {
        Ok(sorted_by_id(&self.sensors.lock().unwrap().table.rows, |s| {
            s.id
        }))
    }

    fn update_sensor(&self, sensor: Sensor) -> Result<Sensor, DataStoreError> {
        let resources = self.resources.lock().unwrap();
        let sensor_types = self.sensor_types.lock().unwrap();
        let mut sensors = self.sensors.lock().unwrap();
        let Some(stored_type) = sensors
            .table
            .rows
            .get(&sensor.id)
            .map(|stored| stored.sensor_type)
        else {
            return Err(DataStoreError::NotFound);
        };
        if stored_type != sensor.sensor_type {
            return Err(DataStoreError::Invalid(
                "the type of a sensor cannot change".to_string(),
            ));
        }
        let Some(st) = sensor_types.rows.get(&stored_type) else {
            return Err(DataStoreError::Internal(format!(
                "sensor type {} vanished",
                stored_type
            )));
        };
        check_resource_match(
            &resources.table.rows,
            sensor.resource,
            st.resource_type,
            "sensor",
        )?;
        let stored = sensors
            .table
            .rows
            .get_mut(&sensor.id)
            .ok_or(DataStoreError::NotFound)?;
        if !sensor.name.is_empty() {
            stored.name = sensor.name;
        }
        stored.resource = sensor.resource;
        Ok(stored.clone())
    }

    fn delete_sensor(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut sensors = self.sensors.lock().unwrap();
        let mut sensing_points = self.sensing_points.lock().unwrap();
        let mut data_points = self.data_points.lock().unwrap();
        if sensors.table.rows.remove(&id).is_none() {
            return Ok(false);
        }
        let doomed: Vec<u64> = sensing_points
            .rows
            .values()
            .filter(|point| point.sensor == id)
            .map(|point| point.id)
            .collect();
        for point_id in doomed {
            sensing_points.rows.remove(&point_id);
            data_points.remove(&point_id);
        }
        Ok(true)
    }

    fn get_sensing_point(&self, id: u64) -> Result<Option<SensingPoint>, DataStoreError> {
        Ok(self.sensing_points.lock().unwrap().rows.get(&id).cloned())
    }

    fn list_sensing_points(
        &self,
        sensor: Option<u64>,
    ) -> Result<Vec<SensingPoint>, DataStoreError> {
        let points = self.sensing_points.lock().unwrap();
        let mut out: Vec<SensingPoint> = points
            .rows
            .values()
            .filter(|point| sensor.is_none() || sensor == Some(point.sensor))
            .cloned()
            .collect();
        out.sort_by_key(|point| point.id);
        Ok(out)
    }

    fn record_data_point(&self, point: DataPoint) -> Result<DataPoint, DataStoreError> {
        let sensing_points = self.sensing_points.lock().unwrap();
        let mut data_points = self.data_points.lock().unwrap();
        if !sensing_points.rows.contains_key(&point.origin) {
            return Err(DataStoreError::NotFound);
        }
        data_points
            .entry(point.origin)
            .or_default()
            .push(point.clone());
        Ok(point)
    }

    fn latest_data_point(&self, origin: u64) -> Result<Option<DataPoint>, DataStoreError> {
        let data_points = self.data_points.lock().unwrap();
        Ok(data_points
            .get(&origin)
            .and_then(|series| series.iter().max_by_key(|point| point.timestamp))
            .cloned())
    }

    fn data_point_history(
        &self,
        origin: u64,
        since: i64,
        before: i64,
    ) -> Result<Vec<DataPoint>, DataStoreError> {
        let data_points = self.data_points.lock().unwrap();
        let mut out: Vec<DataPoint> = data_points
            .get(&origin)
            .map(|series| {
                series
                    .iter()
                    .filter(|point| point.timestamp > since && point.timestamp < before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|point| point.timestamp);
        Ok(out)
    }

    fn create_actuator_type(&self, mut at: ActuatorType) -> Result<ActuatorType, DataStoreError> {
        if at.code.is_empty() {
            return Err(DataStoreError::Invalid(
                "an actuator type needs a code".to_string(),
            ));
        }
        if at.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "an actuator type needs a name".to_string(),
            ));
        }
        let types = self.resource_types.lock().unwrap();
        let properties = self.resource_properties.lock().unwrap();
        let mut actuator_types = self.actuator_types.lock().unwrap();
        if !types.rows.contains_key(&at.resource_type) {
            return Err(DataStoreError::Invalid(format!(
                "resource type {} does not exist",
                at.resource_type
            )));
        }
        check_property_membership(&properties.rows, &at.properties, at.resource_type)?;
        let clash = actuator_types.rows.values().any(|other| {
            other.resource_type == at.resource_type
                && (other.code == at.code || other.name == at.name)
        });
        if clash {
            return Err(DataStoreError::AlreadyExists);
        }
        at.id = actuator_types.alloc();
        actuator_types.rows.insert(at.id, at.clone());
        Ok(at)
    }

    fn get_actuator_type(&self, id: u64) -> Result<Option<ActuatorType>, DataStoreError> {
        Ok(self.actuator_types.lock().unwrap().rows.get(&id).cloned())
    }

    fn list_actuator_types(&self) -> Result<Vec<ActuatorType>, DataStoreError> {
        Ok(sorted_by_id(&self.actuator_types.lock().unwrap().rows, |at| {
            at.id
        }))
    }

    fn update_actuator_type(&self, at: ActuatorType) -> Result<ActuatorType, DataStoreError> {
        if at.code.is_empty() {
            return Err(DataStoreError::Invalid(
                "an actuator type needs a code".to_string(),
            ));
        }
        if at.name.is_empty() {
            return Err(DataStoreError::Invalid(
                "an actuator type needs a name".to_string(),
            ));
        }
        let properties = self.resource_properties.lock().unwrap();
        let mut actuator_types = self.actuator_types.lock().unwrap();
        check_property_membership(&properties.rows, &at.properties, at.resource_type)?;
        let clash = actuator_types.rows.values().any(|other| {
            other.id != at.id
                && other.resource_type == at.resource_type
                && (other.code == at.code || other.name == at.name)
        });
        if clash {
            return Err(DataStoreError::AlreadyExists);
        }
        let Some(stored) = actuator_types.rows.get_mut(&at.id) else {
            return Err(DataStoreError::NotFound);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        if stored.resource_type != at.resource_type {
            return Err(DataStoreError::Invalid(
                "the resource type of an actuator type cannot change".to_string(),
            ));
        }
        let id = stored.id;
        *stored = at;
        stored.id = id;
        stored.read_only = false;
        Ok(stored.clone())
    }

    fn delete_actuator_type(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut actuator_types = self.actuator_types.lock().unwrap();
        let actuators = self.actuators.lock().unwrap();
        let Some(stored) = actuator_types.rows.get(&id) else {
            return Ok(false);
        };
        if stored.read_only {
            return Err(DataStoreError::ReadOnly);
        }
        if actuators
            .table
            .rows
            .values()
            .any(|actuator| actuator.actuator_type == id)
        {
            return Err(DataStoreError::Conflict(format!(
                "actuators of type {} still exist",
                id
            )));
        }
        actuator_types.rows.remove(&id);
        Ok(true)
    }

    fn create_actuator(&self, mut actuator: Actuator) -> Result<Actuator, DataStoreError> {
        let resources = self.resources.lock().unwrap();
        let actuator_types = self.actuator_types.lock().unwrap();
        let mut actuators = self.actuators.lock().unwrap();
        let Some(at) = actuator_types.rows.get(&actuator.actuator_type) else {
            return Err(DataStoreError::Invalid(format!(
                "actuator type {} does not exist",
                actuator.actuator_type
            )));
        };
        check_resource_match(
            &resources.table.rows,
            actuator.resource,
            at.resource_type,
            "actuator",
        )?;
        actuator.id = actuators.table.alloc();
        actuator.index = actuators.next_index(actuator.actuator_type);
        if actuator.name.is_empty() {
            actuator.name = format!("{} {}", at.name, actuator.index);
        }
        actuator.override_value = None;
        actuator.override_timeout = None;
        actuators.table.rows.insert(actuator.id, actuator.clone());
        Ok(actuator)
    }

    fn get_actuator(&self, id: u64, now: i64) -> Result<Option<Actuator>, DataStoreError> {
        let mut actuators = self.actuators.lock().unwrap();
        let Some(stored) = actuators.table.rows.get_mut(&id) else {
            return Ok(None);
        };
        expire_override(stored, now);
        Ok(Some(stored.clone()))
    }

    fn list_actuators(&self, now: i64) -> Result<Vec<Actuator>, DataStoreError> {
        let mut actuators = self.actuators.lock().unwrap();
        for actuator in actuators.table.rows.values_mut() {
            expire_override(actuator, now);
        }
        let mut out: Vec<Actuator> = actuators.table.rows.values().cloned().collect();
        out.sort_by_key(|actuator| actuator.id);
        Ok(out)
    }

    fn update_actuator(&self, actuator: Actuator) -> Result<Actuator, DataStoreError> {
        let resources = self.resources.lock().unwrap();
        let actuator_types = self.actuator_types.lock().unwrap();
        let mut actuators = self.actuators.lock().unwrap();
        let Some(stored_type) = actuators
            .table
            .rows
            .get(&actuator.id)
            .map(|stored| stored.actuator_type)
        else {
            return Err(DataStoreError::NotFound);
        };
        if stored_type != actuator.actuator_type {
            return Err(DataStoreError::Invalid(
                "the type of an actuator cannot change".to_string(),
            ));
        }
        let Some(at) = actuator_types.rows.get(&stored_type) else {
            return Err(DataStoreError::Internal(format!(
                "actuator type {} vanished",
                stored_type
            )));
        };
        check_resource_match(
            &resources.table.rows,
            actuator.resource,
            at.resource_type,
            "actuator",
        )?;
        let stored = actuators
            .table
            .rows
            .get_mut(&actuator.id)
            .ok_or(DataStoreError::NotFound)?;
        if !actuator.name.is_empty() {
            stored.name = actuator.name;
        }
        stored.resource = actuator.resource;
        Ok(stored.clone())
    }

    fn delete_actuator(&self, id: u64) -> Result<bool, DataStoreError> {
        let mut actuators = self.actuators.lock().unwrap();
        let mut actuator_states = self.actuator_states.lock().unwrap();
        if actuators.table.rows.remove(&id).is_none() {
            return Ok(false);
        }
        actuator_states.remove(&id);
        Ok(true)
    }

    fn set_override(
        &self,
        id: u64,
        value: f64,
        timeout: i64,
    ) -> Result<Actuator, DataStoreError> {
        let mut actuators = self.actuators.lock().unwrap();
        let Some(stored) = actuators.table.rows.get_mut(&id) else {
            return Err(DataStoreError::NotFound);
        };
        stored.override_value = Some(value);
        stored.override_timeout = Some(timeout);
        Ok(stored.clone())
    }

    fn record_actuator_state(
        &self,
        state: ActuatorState,
    ) -> Result<ActuatorState, DataStoreError> {
        let actuators = self.actuators.lock().unwrap();
        let mut actuator_states = self.actuator_states.lock().unwrap();
        if !actuators.table.rows.contains_key(&state.origin) {
            return Err(DataStoreError::NotFound);
        }
        actuator_states
            .entry(state.origin)
            .or_default()
            .push(state.clone());
        Ok(state)
    }

    fn latest_actuator_state(
        &self,
        origin: u64,
    ) -> Result<Option<ActuatorState>, DataStoreError> {
        let actuator_states = self.actuator_states.lock().unwrap();
        Ok(actuator_states
            .get(&origin)
            .and_then(|series| series.iter().max_by_key(|state| state.timestamp))
            .cloned())
    }

    fn actuator_state_history(
        &self,
        origin: u64,
        since: i64,
        before: i64,
    ) -> Result<Vec<ActuatorState>, DataStoreError> {
        let actuator_states = self.actuator_states.lock().unwrap();
        let mut out: Vec<ActuatorState> = actuator_states
            .get(&origin)
            .map(|series| {
                series
                    .iter()
                    .filter(|state| state.timestamp > since && state.timestamp < before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|state| state.timestamp);
        Ok(out)
    }
}

/// Clears an actuator's override in place once its timeout has passed.
/// Clearing is idempotent.
fn expire_override(actuator: &mut Actuator, now: i64) {
    if let Some(timeout) = actuator.override_timeout {
        if now >= timeout {
            actuator.override_value = None;
            actuator.override_timeout = None;
        }
    }
}

/// Insists every property in `properties` exists and measures
/// `resource_type`.
fn check_property_membership(
    rows: &HashMap<u64, ResourceProperty>,
    properties: &[u64],
    resource_type: u64,
) -> Result<(), DataStoreError> {
    for property in properties {
        let Some(stored) = rows.get(property) else {
            return Err(DataStoreError::Invalid(format!(
                "resource property {} does not exist",
                property
            )));
        };
        if stored.resource_type != resource_type {
            return Err(DataStoreError::Invalid(format!(
                "resource property {} does not belong to resource type {}",
                property, resource_type
            )));
        }
    }
    Ok(())
}

/// Insists an attached resource exists and holds the resource type the
/// instrument's type monitors.
fn check_resource_match(
    rows: &HashMap<u64, Resource>,
    resource: Option<u64>,
    resource_type: u64,
    kind: &str,
) -> Result<(), DataStoreError> {
    let Some(resource_id) = resource else {
        return Ok(());
    };
    let Some(stored) = rows.get(&resource_id) else {
        return Err(DataStoreError::Invalid(format!(
            "resource {} does not exist",
            resource_id
        )));
    };
    if stored.resource_type != resource_type {
        return Err(DataStoreError::Invalid(format!(
            "resource {} does not hold the resource type this {} monitors",
            resource_id, kind
        )));
    }
    Ok(())
}
