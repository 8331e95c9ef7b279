use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tracing::info;
use weave_codec::fingerprint;
use weave_document::{DocumentManager, EngineConfig};
use weave_patcher::{patcher_registry, Patcher, PatcherValidator};
use weave_transport::{DocumentListener, DocumentServer, ServerConfig};
use weave_types::Ref;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = engine_config(cli.config.as_deref())?;
    match cli.command {
        Command::New(args) => cmd_new(&config, args),
        Command::Add(args) => cmd_add(&config, args),
        Command::Link(args) => cmd_link(&config, args),
        Command::Inspect(args) => cmd_inspect(&config, args, &cli.format),
        Command::Dump(args) => cmd_dump(&config, args),
        Command::Serve(args) => cmd_serve(args),
    }
}

fn engine_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("reading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn open(config: &EngineConfig, path: &Path) -> anyhow::Result<(DocumentManager, Patcher)> {
    let mut manager = DocumentManager::new(patcher_registry(), config.clone());
    manager.load(path).with_context(|| format!("opening {}", path.display()))?;
    let patcher = Patcher::new(manager.graph())?;
    Ok((manager, patcher))
}

fn object_at(patcher: &Patcher, manager: &DocumentManager, index: usize) -> anyhow::Result<Ref> {
    let objects = patcher.objects(manager.graph());
    match objects.get(index) {
        Some(obj) => Ok(*obj),
        None => bail!("no object {index}, the patcher has {}", objects.len()),
    }
}

fn cmd_new(config: &EngineConfig, args: NewArgs) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.path.display());
    }
    let manager = DocumentManager::new(patcher_registry(), config.clone());
    manager.save(&args.path)?;
    println!("{} Created empty patcher {}", "✓".green().bold(), args.path.display().to_string().bold());
    Ok(())
}

fn cmd_add(config: &EngineConfig, args: AddArgs) -> anyhow::Result<()> {
    let (mut manager, patcher) = open(config, &args.path)?;
    let obj = patcher.add_object(manager.graph_mut(), &args.text, args.x, args.y)?;
    let name = patcher.object_name(manager.graph(), obj)?;
    manager.commit("Add object");
    manager.save(&args.path)?;
    let index = patcher.objects(manager.graph()).len() - 1;
    println!("{} Added {} as object {}", "✓".green().bold(), name.yellow(), index.to_string().bold());
    Ok(())
}

fn cmd_link(config: &EngineConfig, args: LinkArgs) -> anyhow::Result<()> {
    let (mut manager, patcher) = open(config, &args.path)?;
    let sender = object_at(&patcher, &manager, args.sender)?;
    let receiver = object_at(&patcher, &manager, args.receiver)?;
    patcher.add_link(manager.graph_mut(), sender, args.outlet, receiver, args.inlet)?;
    manager.commit("Add link");
    manager.save(&args.path)?;
    println!(
        "{} Linked {}:{} {} {}:{}",
        "✓".green().bold(),
        args.sender,
        args.outlet,
        "→".dimmed(),
        args.receiver,
        args.inlet
    );
    Ok(())
}

fn describe(manager: &DocumentManager, patcher: &Patcher) -> anyhow::Result<serde_json::Value> {
    let graph = manager.graph();
    let objects = patcher.objects(graph);
    let mut object_rows = Vec::new();
    for obj in &objects {
        let (x, y) = patcher.position(graph, *obj)?;
        object_rows.push(json!({
            "ref": obj.to_string(),
            "class": graph.class_name(*obj),
            "text": patcher.object_text(graph, *obj)?,
            "x": x,
            "y": y,
            "inlets": patcher.inlets(graph, *obj)?.len(),
            "outlets": patcher.outlets(graph, *obj)?.len(),
        }));
    }
    let mut link_rows = Vec::new();
    for link in patcher.links(graph) {
        let ends = patcher.link_ends(graph, link)?;
        let index = |r: Ref| objects.iter().position(|o| *o == r);
        link_rows.push(json!({
            "sender": index(ends.sender),
            "outlet": ends.outlet,
            "receiver": index(ends.receiver),
            "inlet": ends.inlet,
        }));
    }
    Ok(json!({
        "version": graph.registry().version(),
        "fingerprint": fingerprint(&graph.snapshot())?,
        "objects": object_rows,
        "links": link_rows,
        "users": patcher.user_ids(graph)?,
    }))
}

fn cmd_inspect(config: &EngineConfig, args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let (manager, patcher) = open(config, &args.path)?;
    let summary = describe(&manager, &patcher)?;
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Patcher {} (schema {})", args.path.display().to_string().bold(), summary["version"].as_str().unwrap_or_default());
    println!("Fingerprint: {}", summary["fingerprint"].as_str().unwrap_or_default().cyan());
    let objects = summary["objects"].as_array().cloned().unwrap_or_default();
    println!("\n{} objects", objects.len().to_string().bold());
    for (i, o) in objects.iter().enumerate() {
        println!(
            "  {:>3}  {:<24} {} in / {} out  at ({}, {})",
            i.to_string().yellow(),
            o["text"].as_str().unwrap_or_default(),
            o["inlets"],
            o["outlets"],
            o["x"],
            o["y"]
        );
    }
    let links = summary["links"].as_array().cloned().unwrap_or_default();
    println!("\n{} links", links.len().to_string().bold());
    for l in &links {
        println!("  {}:{} {} {}:{}", l["sender"], l["outlet"], "→".dimmed(), l["receiver"], l["inlet"]);
    }
    Ok(())
}

fn cmd_dump(config: &EngineConfig, args: DumpArgs) -> anyhow::Result<()> {
    let (manager, _) = open(config, &args.path)?;
    println!("{}", serde_json::to_string_pretty(&manager.graph().snapshot())?);
    Ok(())
}

fn server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.server_config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("reading server config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.parse::<SocketAddr>().with_context(|| format!("bad bind address {bind}"))?;
    }
    if let Some(snapshot) = &args.snapshot {
        config.snapshot_path = Some(PathBuf::from(snapshot));
    }
    Ok(config)
}

/// The served document, denying edits that would leave dangling links.
fn patcher_server(config: &ServerConfig) -> anyhow::Result<DocumentServer> {
    let registry = patcher_registry();
    let server = match &config.snapshot_path {
        Some(path) => DocumentServer::open(registry, &config.file_tags()?, path)?,
        None => DocumentServer::new(registry),
    };
    let patcher = Patcher::new(server.graph())?;
    Ok(server.with_validator(PatcherValidator::new(patcher)))
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = server_config(&args)?;
    let server = patcher_server(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = DocumentListener::bind(config, server).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "serving");
        println!("Weave server on {}", addr.to_string().bold());
        listener
            .serve(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        println!("{} Server stopped.", "✓".green());
        Ok::<(), anyhow::Error>(())
    })
}
