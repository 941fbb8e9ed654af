use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use axum::Router;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::signal;

use trellis::{
    ActiveLayouts, DataStore, EntityCatalog, FarmState, InMemoryDataStore, LayoutResolver,
    LayoutState, SchemaRegistry, ServerConfig, ServerKind, create_actuator_router,
    create_farm_registry_router, create_farm_router, create_layout_router, create_resource_router,
    create_schema_router, create_sensor_router, install_default_resources,
};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Path to the server configuration file")]
    config: Option<String>,
    #[arrrg(optional, "Address and port to listen on, overriding the configuration")]
    listen: Option<String>,
    #[arrrg(optional, "Directory of layout schemata, overriding the configuration")]
    schemata: Option<String>,
    #[arrrg(flag, "Enable verbose logging")]
    verbose: bool,
}

const HELP_TEXT: &str = r#"trellisd - Trellis farm daemon

USAGE:
    trellisd [OPTIONS]

OPTIONS:
    --config <PATH>      Path to the server configuration file
    --listen <ADDR>      Address and port to listen on [default: 0.0.0.0:8000]
    --schemata <DIR>     Directory of layout schemata [default: schemata]
    --verbose            Enable verbose logging

DESCRIPTION:
    Runs a Trellis server with its API mounted under /api/v1/.

    With no configuration file the server boots as a development leaf: a
    single farm with no root server, a stock resource taxonomy, and the
    layout schemata found in the schemata directory.

    The server supports graceful shutdown via SIGTERM or Ctrl+C.

API ENDPOINTS (leaf):
    GET/PUT     /api/v1/farm                            This server's farm
    GET         /api/v1/schema                          Layout schemata on offer
    GET         /api/v1/layout                          Active layout and entity types
    GET/POST    /api/v1/layout/{entity}                 Layout objects of one type
    GET/PUT/DEL /api/v1/layout/{entity}/{id}            One layout object
    GET/POST    /api/v1/model3d                         3-D models
    GET/POST    /api/v1/resourcetype                    Resource taxonomy
    GET/POST    /api/v1/resourceproperty
    GET/POST    /api/v1/resource
    GET/POST    /api/v1/sensortype                      Instruments
    GET/POST    /api/v1/sensor
    GET         /api/v1/sensingpoint
    GET/POST    /api/v1/sensingpoint/{id}/value         Readings
    GET         /api/v1/sensingpoint/{id}/history
    GET/POST    /api/v1/actuatortype                    Output devices
    GET/POST    /api/v1/actuator
    POST        /api/v1/actuator/{id}/override          Pin an output
    GET/POST    /api/v1/actuator/{id}/state             What the device did
    GET         /api/v1/actuator/{id}/history

API ENDPOINTS (root):
    GET/POST    /api/v1/farm                            Farm registry
    GET/PUT     /api/v1/farm/{root_id}
    GET         /api/v1/schema"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = Args::from_command_line("USAGE: trellisd [OPTIONS]");

    if !free.is_empty() && free[0] == "help" {
        println!("{}", HELP_TEXT);
        return Ok(());
    }

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(Path::new(path))?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(schemata) = args.schemata {
        config.schemata_dir = Some(PathBuf::from(schemata));
    }

    let schemata_dir = config
        .schemata_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("schemata"));
    let registry = Arc::new(SchemaRegistry::load_dir(&schemata_dir)?);
    info!(
        "loaded {} layout schemata from {}",
        registry.len(),
        schemata_dir.display()
    );

    let catalog = Arc::new(EntityCatalog::build(&registry)?);
    let layouts = Arc::new(ActiveLayouts::new());
    let resolver = LayoutResolver::new(registry.clone(), layouts.clone());
    let store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());

    let farm_state = FarmState {
        store: store.clone(),
        registry: registry.clone(),
        layouts: layouts.clone(),
        root: config.root_client().map(Arc::new),
    };
    let layout_state = LayoutState {
        store: store.clone(),
        catalog,
        resolver,
    };

    let app = match config.kind {
        ServerKind::Leaf => {
            install_default_resources(store.as_ref())?;
            if farm_state.root.is_none() {
                warn!("running in development mode; farm registration stays local");
            }
            Router::new()
                .nest("/api/v1", create_farm_router(farm_state))
                .nest("/api/v1", create_schema_router(registry.clone()))
                .nest("/api/v1", create_layout_router(layout_state))
                .nest("/api/v1", create_resource_router(store.clone()))
                .nest("/api/v1", create_sensor_router(store.clone()))
                .nest("/api/v1", create_actuator_router(store.clone()))
        }
        ServerKind::Root => Router::new()
            .nest("/api/v1", create_farm_registry_router(farm_state))
            .nest("/api/v1", create_schema_router(registry.clone())),
    };

    let listener = TcpListener::bind(&config.listen)
        .await
        .map_err(|e| format!("failed to bind to {}: {}", config.listen, e))?;

    info!("trellisd listening on http://{}", config.listen);
    info!("serving as a {:?} in {:?} mode", config.kind, config.mode);

    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                eprintln!("server error: {}", e);
                std::process::exit(1);
            }
        }
        () = shutdown_signal => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}
