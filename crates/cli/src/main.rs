mod catalog;
mod providers;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use serde_json::json;
use strata_engine::{DataProviderManager, EngineConfig, NodeKind, NodeStatus, Topic};
use strata_types::{Notification, TreeDescription};
use tracing::{Level, debug, info};

use crate::{catalog::Catalog, catalog::parse_document};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("assemble", sub)) => run_assemble(sub).await,
        Some(("validate", sub)) => run_validate(sub).map(|report| println!("{report}")),
        Some(("example", _)) => {
            println!("{}", serde_json::to_string_pretty(&example_tree()?)?);
            Ok(())
        }
        _ => bail!("expected a subcommand; see --help"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let tree = Arg::new("tree")
        .long("tree")
        .short('t')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Tree description (YAML or JSON)");
    let catalog = Arg::new("catalog")
        .long("catalog")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Data catalog the demo providers read from (YAML or JSON)");

    Command::new("strata")
        .about("Assemble layered visualization trees")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration file; defaults to STRATA_CONFIG_PATH or the platform config dir"),
        )
        .subcommand(
            Command::new("assemble")
                .about("Load a tree, fetch every provider and print the settled result")
                .arg(tree.clone())
                .arg(catalog.clone())
                .arg(
                    Arg::new("stale-time")
                        .long("stale-time")
                        .value_parser(value_parser!(u64))
                        .help("Override the cache stale time, in seconds"),
                )
                .arg(
                    Arg::new("latency-ms")
                        .long("latency-ms")
                        .value_parser(value_parser!(u64))
                        .default_value("0")
                        .help("Simulated latency of every fetch"),
                )
                .arg(
                    Arg::new("events")
                        .long("events")
                        .action(ArgAction::SetTrue)
                        .help("Print notifications observed while settling"),
                )
                .arg(
                    Arg::new("describe")
                        .long("describe")
                        .action(ArgAction::SetTrue)
                        .help("Print the normalized tree description (fixed-up settings included)"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a tree description against the registered types without fetching")
                .arg(tree)
                .arg(catalog),
        )
        .subcommand(Command::new("example").about("Print an example tree description"))
}

fn engine_config(matches: &ArgMatches) -> Result<EngineConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load_from(path),
        None => Ok(EngineConfig::load()),
    }
}

fn load_tree(path: &Path) -> Result<TreeDescription> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read tree {}", path.display()))?;
    parse_document(path, &content).with_context(|| format!("invalid tree {}", path.display()))
}

fn build_manager(matches: &ArgMatches, latency: Duration) -> Result<DataProviderManager> {
    let catalog_path = matches.get_one::<PathBuf>("catalog").context("missing --catalog")?;
    let tree_path = matches.get_one::<PathBuf>("tree").context("missing --tree")?;

    let mut config = engine_config(matches)?;
    if let Some(seconds) = matches.try_get_one::<u64>("stale-time").ok().flatten() {
        config = config.with_stale_time(Duration::from_secs(*seconds));
    }
    debug!(?config, "engine configuration");

    let catalog = Arc::new(Catalog::load(catalog_path)?);
    let registries = providers::registries(Arc::clone(&catalog), latency)?;
    let mut manager = DataProviderManager::new(registries, providers::ROOT_TYPE, config)?;
    manager.set_global_context("ensembles", catalog.ensemble_names());
    manager.set_global_context("realizations", catalog.realizations());
    manager.set_global_context("attributes", catalog.attributes());
    manager.set_global_context("wells", catalog.well_names());

    let description = load_tree(tree_path)?;
    manager
        .deserialize(&description)
        .with_context(|| format!("tree {} does not fit the registered types", tree_path.display()))?;
    Ok(manager)
}

async fn run_assemble(matches: &ArgMatches) -> Result<()> {
    let latency = Duration::from_millis(matches.get_one::<u64>("latency-ms").copied().unwrap_or_default());
    let mut manager = build_manager(matches, latency)?;
    let mut statuses = manager.subscribe(Topic::NodeStatus);
    let mut aggregate = manager.subscribe(Topic::AggregateResult);

    let result = manager.settle().await.clone();
    let failed = result
        .per_node_status
        .values()
        .filter(|report| report.enabled && report.status != NodeStatus::Success)
        .count();
    info!(
        layers = result.layers.len(),
        providers = result.per_node_status.len(),
        failed,
        fetches = manager.fetch_count(),
        "assembly settled"
    );

    let mut output = json!({ "result": result });
    if matches.get_flag("events") {
        let mut events: Vec<Notification> = Vec::new();
        while let Ok(notification) = statuses.try_recv() {
            events.push(notification);
        }
        while let Ok(notification) = aggregate.try_recv() {
            events.push(notification);
        }
        output["events"] = json!(events);
    }
    if matches.get_flag("describe") {
        output["tree"] = json!(manager.serialize());
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_validate(matches: &ArgMatches) -> Result<String> {
    let mut manager = build_manager(matches, Duration::ZERO)?;
    let description = manager.serialize();
    let (mut provider_count, mut group_count) = (0, 0);
    description.root.walk(&mut |node| match node.kind {
        NodeKind::Provider => provider_count += 1,
        NodeKind::Group => group_count += 1,
    });

    let invalid: Vec<_> = manager
        .invalid_settings()
        .into_iter()
        .map(|(node_id, message)| json!({ "node_id": node_id, "message": message }))
        .collect();
    let report = serde_json::to_string_pretty(&json!({
        "groups": group_count,
        "providers": provider_count,
        "settings_invalid": invalid,
    }))?;
    Ok(report)
}

fn example_tree() -> Result<TreeDescription> {
    let tree = serde_json::from_value(json!({
        "version": 1,
        "root": {
            "id": "root",
            "kind": "group",
            "type": providers::ROOT_TYPE,
            "settings": { "ensemble": "iter-0" },
            "children": [
                {
                    "id": "depth-range",
                    "kind": "group",
                    "type": "value-range",
                    "name": "Depth surfaces",
                    "children": [
                        { "id": "top", "kind": "provider", "type": "surface", "settings": { "realization": 0, "attribute": "depth" } },
                        { "id": "base", "kind": "provider", "type": "surface", "settings": { "realization": 1, "attribute": "depth", "color": "magma" } }
                    ]
                },
                { "id": "a-1", "kind": "provider", "type": "well", "settings": { "well": "A-1" } }
            ]
        }
    }))?;
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_assemble_flags() {
        let matches = build_cli()
            .try_get_matches_from(["strata", "assemble", "--tree", "tree.yaml", "--catalog", "catalog.yaml", "--stale-time", "5", "--events"])
            .expect("parse");
        let (name, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "assemble");
        assert_eq!(sub.get_one::<u64>("stale-time"), Some(&5));
        assert_eq!(sub.get_one::<u64>("latency-ms"), Some(&0));
        assert!(sub.get_flag("events"));
    }

    #[test]
    fn example_tree_is_a_complete_description() {
        let tree = example_tree().expect("example tree");
        let mut ids = Vec::new();
        tree.root.walk(&mut |node| ids.push(node.id.as_str().to_string()));
        assert_eq!(ids, vec!["root", "depth-range", "top", "base", "a-1"]);
    }

    #[tokio::test]
    async fn files_on_disk_assemble_end_to_end() {
        let directory = tempfile::tempdir().expect("tempdir");
        let catalog = directory.path().join("catalog.yaml");
        std::fs::write(
            &catalog,
            "ensembles:\n  iter-0:\n    realizations: [0, 1]\nsurfaces:\n  - { ensemble: iter-0, realization: 0, attribute: depth, extent: [0, 0, 10, 5], values: [1500, 1700] }\n  - { ensemble: iter-0, realization: 1, attribute: depth, extent: [0, 0, 10, 5], values: [1480, 1690] }\nwells:\n  - { name: A-1, points: [[1, 1, 0], [1, 2, 1600]] }\n",
        )
        .expect("catalog");
        let tree = directory.path().join("tree.json");
        std::fs::write(&tree, serde_json::to_string(&example_tree().expect("example tree")).expect("encode")).expect("tree");
        let config = directory.path().join("engine.json");
        std::fs::write(&config, "{}").expect("config");

        let matches = build_cli()
            .try_get_matches_from([
                "strata",
                "--config",
                config.to_str().expect("utf-8 path"),
                "assemble",
                "--tree",
                tree.to_str().expect("utf-8 path"),
                "--catalog",
                catalog.to_str().expect("utf-8 path"),
            ])
            .expect("parse");
        let (_, sub) = matches.subcommand().expect("subcommand");
        let mut manager = build_manager(sub, Duration::ZERO).expect("manager");
        let result = manager.settle().await;
        assert_eq!(result.layers.len(), 3);
        assert!(result.per_node_status.values().all(|report| report.status == NodeStatus::Success));
        assert_eq!(result.stored_data.get("value-range"), Some(&json!([1480.0, 1700.0])));
    }

    #[tokio::test]
    async fn validate_reports_invalid_settings_without_fetching() {
        let directory = tempfile::tempdir().expect("tempdir");
        let catalog = directory.path().join("catalog.json");
        std::fs::write(&catalog, r#"{ "ensembles": { "iter-0": { "realizations": [0, 1] } } }"#).expect("catalog");
        let tree = directory.path().join("tree.json");
        std::fs::write(&tree, serde_json::to_string(&example_tree().expect("example tree")).expect("encode")).expect("tree");

        let matches = build_cli()
            .try_get_matches_from([
                "strata",
                "validate",
                "--tree",
                tree.to_str().expect("utf-8 path"),
                "--catalog",
                catalog.to_str().expect("utf-8 path"),
            ])
            .expect("parse");
        let (_, sub) = matches.subcommand().expect("subcommand");

        let report: serde_json::Value = serde_json::from_str(&run_validate(sub).expect("validate")).expect("report json");
        assert_eq!(report["groups"], json!(2));
        assert_eq!(report["providers"], json!(3));
        let invalid: Vec<&str> = report["settings_invalid"]
            .as_array()
            .expect("invalid list")
            .iter()
            .filter_map(|entry| entry["node_id"].as_str())
            .collect();
        assert!(invalid.contains(&"a-1"), "unexpected report: {report}");

        let mut manager = build_manager(sub, Duration::ZERO).expect("manager");
        assert!(manager.invalid_settings().contains_key(&strata_types::NodeId::from("a-1")));
        assert_eq!(manager.fetch_count(), 0);
        assert!(manager.last_result().is_none());
    }
}
