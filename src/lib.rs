//! # Trellis: a Backend for Instrumented Farms
//!
//! Trellis runs the server side of a fleet of growing devices: shipping
//! containers, warehouse bays, and countertop boxes full of trays, ducts,
//! reservoirs, and the sensors and actuators that keep plants alive in
//! them. One server runs at each site as the source of truth for that
//! site's layout and telemetry, and a central root server stitches the
//! sites into a fleet.
//!
//! This crate provides:
//!
//! - **Layout Schemata**: YAML documents describing how a site is
//!   physically organized, from the enclosure down to the trays
//! - **A Resource Taxonomy**: typed resources (air, water, light) with the
//!   measurable properties instruments report against
//! - **Telemetry and Control**: sensors fan out into per-property sensing
//!   points holding append-only readings; actuators accept bounded manual
//!   overrides and report what they did
//! - **Federation**: leaves announce themselves to a root server, which
//!   assigns global ids and keeps the registry of every farm
//! - **HTTP API**: RESTful endpoints for all of the above
//!
//! ## Core Concepts
//!
//! ### Farms
//! Every server owns exactly one [`Farm`] record. A fresh install is
//! unconfigured; giving the farm a name configures it, deriving a slug,
//! discovering the server's address, and announcing it to the root server.
//!
//! ### Layouts
//! A [`LayoutSchema`] names the chain of entity types between the fixed
//! endpoints `enclosure` and `tray`. A farm commits to one schema, and the
//! commitment is permanent: every layout object, resource, and instrument
//! hangs off the chosen hierarchy.
//!
//! ### Resources
//! A [`Resource`] is a managed volume of something (a duct of air, a
//! reservoir of water) located at a layout object. Its [`ResourceType`]
//! carries the [`ResourceProperty`] entries instruments can measure.
//!
//! ### Sensing and Actuation
//! Creating a [`Sensor`] fans out one [`SensingPoint`] per property of its
//! type; readings land against points as [`DataPoint`]s. An [`Actuator`]
//! accepts a manual override that pins its output for a bounded time and
//! expires passively on read.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HTTP API Layer (Axum routes)            │
//! ├─────────────────────────────────────────┤
//! │ Farm logic (configuration, federation)  │
//! ├─────────────────────────────────────────┤
//! │ Layout resolution (schemata, catalog)   │
//! ├─────────────────────────────────────────┤
//! │ Data Store (trait-based abstraction)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Examples
//!
//! ### Parsing a Layout Schema
//!
//! ```rust
//! # use trellis::LayoutSchema;
//! let schema = LayoutSchema::parse_with_name(
//!     "aisle",
//!     "entities:\n  - name: aisle\n    parent: enclosure\ntray-parent: aisle\n",
//! )
//! .unwrap();
//! let chain = schema.chain();
//! let names: Vec<&str> = chain.iter().map(|entity| entity.as_str()).collect();
//! assert_eq!(names, vec!["enclosure", "aisle", "tray"]);
//! ```
//!
//! ### Data Store Operations
//!
//! ```rust
//! # use trellis::{DataStore, InMemoryDataStore, Resource, ResourceType};
//! let store = InMemoryDataStore::new();
//!
//! let air = store
//!     .create_resource_type(ResourceType {
//!         id: 0,
//!         name: "Air".to_string(),
//!         read_only: false,
//!     })
//!     .unwrap();
//!
//! // Instances index themselves per type and name themselves after it.
//! let duct = store
//!     .create_resource(Resource {
//!         resource_type: air.id,
//!         ..Resource::default()
//!     })
//!     .unwrap();
//! assert_eq!(duct.index, 1);
//! assert_eq!(duct.name, "Air Resource 1");
//! ```
//!
//! ### Server Configuration
//!
//! ```rust
//! # use trellis::{ServerConfig, ServerKind};
//! let config = ServerConfig::parse("kind: root\nlisten: 0.0.0.0:9000\n").unwrap();
//! assert_eq!(config.kind, ServerKind::Root);
//! assert_eq!(config.listen, "0.0.0.0:9000");
//! ```

mod actuator;
mod config;
mod data_store;
mod farm;
mod federation;
mod http_utils;
mod layout;
mod registry;
mod resource;
mod schema;
mod sensor;
mod slug;

pub use actuator::{Actuator, ActuatorState, ActuatorType, create_actuator_router};
pub use config::{ConfigError, ServerConfig, ServerKind, ServerMode};
pub use data_store::{DataStore, DataStoreError, InMemoryDataStore};
pub use farm::{
    DEFAULT_ROOT_SERVER, DEVELOPMENT_ROOT_ID, Farm, FarmState, UNCONFIGURED_SLUG,
    create_farm_registry_router, create_farm_router,
};
pub use federation::{FederationError, RootClient, reconcile};
pub use layout::{
    ActiveLayouts, CatalogError, EntityCatalog, EntityType, FarmScope, LayoutIndex, LayoutObject,
    LayoutObjectBody, LayoutResolver, LayoutState, Model3D, ScopeQuery, create_layout_router,
};
pub use registry::{RegistryError, SchemaListItem, SchemaRegistry, create_schema_router};
pub use resource::{
    Resource, ResourceProperty, ResourceType, create_resource_router, install_default_resources,
};
pub use schema::{ENCLOSURE, LayoutSchema, SchemaEntity, SchemaError, TRAY};
pub use sensor::{DataPoint, SensingPoint, Sensor, SensorType, create_sensor_router};
pub use slug::{Slug, SlugParseError, canonicalize};
