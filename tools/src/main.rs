use std::fs;
use std::path::{Path, PathBuf};

use asset_manifest::{AssetTree, Release, ResourceManifest};
use clap::{ArgAction, Parser, Subcommand};
use mod_merge::{ManifestMerger, MergePlan, ReleaseSnapshot};
use tracing::Level;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_IO: i32 = 10;
const EXIT_MANIFEST: i32 = 11;
const EXIT_MERGE: i32 = 12;
const EXIT_PLAN: i32 = 13;

#[derive(Parser)]
#[command(name = "tools", version, about = "Asset manifest merge tools")]
struct Cli {
    /// Repeat for more log output on stderr.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Tree(TreeArgs),
    Merge(MergeArgs),
    Plan(PlanArgs),
}

#[derive(Parser)]
struct TreeArgs {
    #[arg(long, value_name = "JSON")]
    manifest: PathBuf,
}

#[derive(Parser)]
struct MergeArgs {
    #[arg(long, value_name = "JSON")]
    target: PathBuf,

    #[arg(long, value_name = "VERSION")]
    target_version: String,

    #[arg(long, value_name = "RES", default_value = "target")]
    target_res: String,

    /// `<json>@<client_version>@<res_version>`, highest priority first.
    #[arg(long = "source", value_name = "SPEC", required = true)]
    sources: Vec<String>,

    #[arg(long, value_name = "JSON")]
    out: Option<PathBuf>,

    #[arg(long)]
    no_zonemaps: bool,
}

#[derive(Parser)]
struct PlanArgs {
    #[command(subcommand)]
    command: PlanCommand,
}

#[derive(Subcommand)]
enum PlanCommand {
    Check {
        #[arg(value_name = "TOML")]
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let exit_code = match cli.command {
        Commands::Tree(args) => run_tree(&args),
        Commands::Merge(args) => run_merge(&args),
        Commands::Plan(args) => run_plan(args),
    };
    std::process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn run_tree(args: &TreeArgs) -> i32 {
    let manifest = match load_manifest(&args.manifest) {
        Ok(manifest) => manifest,
        Err(code) => return code,
    };
    let tree = match AssetTree::build(&manifest) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("tree build failed: {}", err);
            return EXIT_MANIFEST;
        }
    };
    print!("{}", tree.paths().render());
    if !tree.dangling().is_empty() {
        eprintln!("{} assets without a bundle", tree.dangling().len());
    }
    EXIT_SUCCESS
}

fn run_merge(args: &MergeArgs) -> i32 {
    let target = match load_snapshot(&args.target, &args.target_version, &args.target_res) {
        Ok(snapshot) => snapshot,
        Err(code) => return code,
    };
    let mut sources = Vec::with_capacity(args.sources.len());
    for spec in &args.sources {
        let mut parts = spec.splitn(3, '@');
        let (Some(path), Some(client), Some(res)) = (parts.next(), parts.next(), parts.next())
        else {
            eprintln!("source must be <json>@<client_version>@<res_version>: {}", spec);
            return EXIT_USAGE;
        };
        match load_snapshot(Path::new(path), client, res) {
            Ok(snapshot) => sources.push(snapshot),
            Err(code) => return code,
        }
    }

    let mut merger = ManifestMerger::new(&target, &sources);
    let merged = merger.merge_sources().and_then(|()| {
        if args.no_zonemaps {
            Ok(0)
        } else {
            merger.copy_zonemap_nodes()
        }
    });
    if let Err(err) = merged {
        eprintln!("merge failed ({}): {}", err.kind(), err);
        return EXIT_MERGE;
    }
    for (name, bundle) in merger.bundles() {
        println!("{} <- {}", name, sources[bundle.source].release);
    }
    println!(
        "{} bundles, {} assets merged",
        merger.bundles().count(),
        merger.overlay().leaf_count()
    );

    let manifest = match merger.build_mod() {
        Ok(manifest) => manifest,
        Err(err) => {
            eprintln!("manifest rebuild failed ({}): {}", err.kind(), err);
            return EXIT_MERGE;
        }
    };
    let Some(out) = &args.out else {
        return EXIT_SUCCESS;
    };
    let text = match manifest
        .to_document()
        .map_err(|err| err.to_string())
        .and_then(|doc| serde_json::to_string_pretty(&doc).map_err(|err| err.to_string()))
    {
        Ok(text) => text,
        Err(err) => {
            eprintln!("manifest encode failed: {}", err);
            return EXIT_MANIFEST;
        }
    };
    if let Err(err) = fs::write(out, text) {
        eprintln!("write {} failed: {}", out.display(), err);
        return EXIT_IO;
    }
    println!("wrote {}", out.display());
    EXIT_SUCCESS
}

fn run_plan(args: PlanArgs) -> i32 {
    match args.command {
        PlanCommand::Check { path } => plan_check(&path),
    }
}

fn plan_check(path: &Path) -> i32 {
    let plan = match MergePlan::load(path) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("plan load failed: {}", err);
            return EXIT_PLAN;
        }
    };
    let validation = plan.validate();
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    for error in &validation.errors {
        println!("error: {}", error);
    }
    if !validation.is_ok() {
        return EXIT_PLAN;
    }
    println!(
        "plan ok: {} ({} sources, {} aliases)",
        plan.mod_name,
        plan.sources.len(),
        plan.aliases.len()
    );
    EXIT_SUCCESS
}

fn load_manifest(path: &Path) -> Result<ResourceManifest, i32> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("read {} failed: {}", path.display(), err);
            return Err(EXIT_IO);
        }
    };
    let document = match serde_json::from_str(&text) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("{} is not json: {}", path.display(), err);
            return Err(EXIT_MANIFEST);
        }
    };
    ResourceManifest::from_document(document).map_err(|err| {
        eprintln!("{} is not a manifest: {}", path.display(), err);
        EXIT_MANIFEST
    })
}

fn load_snapshot(path: &Path, client: &str, res: &str) -> Result<ReleaseSnapshot, i32> {
    let release = Release::parse(client, res).map_err(|err| {
        eprintln!("bad release {}@{}: {}", client, res, err);
        EXIT_USAGE
    })?;
    let manifest = load_manifest(path)?;
    ReleaseSnapshot::build(release, manifest).map_err(|err| {
        eprintln!("snapshot of {} failed: {}", path.display(), err);
        EXIT_MANIFEST
    })
}
