// src/main.rs

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::info;

use modkeep::Error;
use modkeep::cache::DirMap;
use modkeep::config::Config;
use modkeep::extract::ArchiveExtractor;
use modkeep::fetch::HttpDownloader;
use modkeep::package::{DeclaredFiles, InstallReason, Package};
use modkeep::query::Query;
use modkeep::repository::{LocalRepo, RemoteRepo, Repository};
use modkeep::resolve::{CandidateChooser, FirstCandidate};
use modkeep::transaction::{AddTransaction, RemoveTransaction, UpgradeTransaction};

#[derive(Parser)]
#[command(name = "modkeep")]
#[command(author, version, about = "Package manager for game modding setups", long_about = None)]
struct Cli {
    /// Path to a config file (default: $MODKEEP_HOME/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages and their dependencies
    Install {
        /// Package queries, e.g. `skyui` or `skse>=1.7`
        #[arg(required = true)]
        queries: Vec<String>,
        /// Upgrade the named packages if already installed
        #[arg(short, long)]
        upgrade: bool,
        /// Answer yes to every prompt and pick candidates automatically
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove installed packages
    Remove {
        /// Installed package names
        #[arg(required = true)]
        names: Vec<String>,
        /// Remove exactly the named packages, skipping orphan removal and
        /// safety checks
        #[arg(long)]
        no_deps: bool,
        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Upgrade installed packages to newer repository versions
    Upgrade {
        /// Package names (upgrades everything if omitted)
        names: Vec<String>,
        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Search the repository by name and description
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// List installed packages
    List,
    /// Show details of a package
    Info {
        name: String,
    },
    /// Manage the download and source caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Generate shell completion scripts
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every cached download and extracted source
    Clear,
    /// Show how much disk the caches use
    Size,
}

/// Chooser that asks on stdin when several candidates tie
struct PromptChooser;

impl CandidateChooser for PromptChooser {
    fn choose(&self, query: &Query, mut candidates: Vec<Package>) -> modkeep::Result<Package> {
        println!("Several packages satisfy {}:", query);
        for (i, candidate) in candidates.iter().enumerate() {
            println!("  {}) {}  {}", i + 1, candidate, candidate.description);
        }
        loop {
            print!("Choose [1-{}]: ", candidates.len());
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            if let Ok(n) = line.trim().parse::<usize>() {
                if n >= 1 && n <= candidates.len() {
                    return Ok(candidates.swap_remove(n - 1));
                }
            }
            println!("Invalid choice.");
        }
    }
}

fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

/// Print the structured detail behind a resolution failure, with bridge
/// suggestions for conflicts when the repository has one.
fn explain_resolution_failure(err: &Error, remote: &RemoteRepo) {
    match err {
        Error::MissingDependencies(missing) => {
            eprintln!("Unresolved dependencies:");
            for (package, query) in missing {
                eprintln!("  {} requires {}", package, query);
            }
        }
        Error::DependencyCycle(packages) => {
            let chain: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
            eprintln!("Dependency cycle: {}", chain.join(" -> "));
        }
        Error::Conflicts(pairs) => {
            eprintln!("Conflicting packages:");
            for (a, b) in pairs {
                eprintln!("  {} conflicts with {}", a, b);
                if let Ok(bridges) = remote.find_bridges(a, b, &BTreeSet::new()) {
                    for bridge in bridges {
                        eprintln!("    hint: installing {} lets them coexist", bridge.name);
                    }
                }
            }
        }
        Error::DependencyBreak(pairs) => {
            eprintln!("Removal would break installed packages:");
            for (survivor, removed) in pairs {
                eprintln!("  {} still needs {}", survivor, removed);
            }
        }
        _ => {}
    }
}

fn cmd_install(config: &Config, queries: &[String], yes: bool) -> Result<()> {
    config.ensure_dirs()?;
    let local = LocalRepo::open(&config.local_dir)?;
    let remote = RemoteRepo::open(&config.repo_dir)?;
    let downloader = HttpDownloader::new(DirMap::open(&config.cache_dir)?)?;
    let mut source_cache = DirMap::open(&config.source_dir)?;

    let chooser: Box<dyn CandidateChooser> = if yes {
        Box::new(FirstCandidate)
    } else {
        Box::new(PromptChooser)
    };

    let mut tx = AddTransaction::new(
        &local,
        &remote,
        &downloader,
        &ArchiveExtractor,
        &DeclaredFiles,
        chooser.as_ref(),
        &mut source_cache,
        &config.install_dir,
        InstallReason::Required,
    );

    for raw in queries {
        let query: Query = raw.parse()?;
        match remote.find_package(&query, &BTreeSet::new())? {
            Some(package) => tx.add_target(package),
            None => bail!("no package in the repository matches {}", query),
        }
    }

    if let Err(e) = tx.expand() {
        explain_resolution_failure(&e, &remote);
        return Err(e.into());
    }

    if tx.installs().is_empty() {
        println!("Nothing to do; everything requested is already installed.");
        return Ok(());
    }

    println!("The following packages will be installed:");
    for package in tx.installs() {
        println!("  {}", package);
    }
    if !tx.removes().is_empty() {
        println!("The following installed versions will be replaced:");
        for package in tx.removes() {
            println!("  {}", package);
        }
    }
    if !confirm("Proceed?", yes)? {
        println!("Aborted.");
        return Ok(());
    }

    tx.prepare()?;
    tx.commit()?;
    println!("Installed {} package(s).", tx.installs().len());
    Ok(())
}

fn cmd_remove(config: &Config, names: &[String], no_deps: bool, yes: bool) -> Result<()> {
    let local = LocalRepo::open(&config.local_dir)?;
    let remote = RemoteRepo::open(&config.repo_dir)?;

    let mut tx = RemoveTransaction::new(&local, &config.install_dir, no_deps);
    for name in names {
        let query: Query = name.parse()?;
        match local.find_literal(&query)? {
            Some(package) => tx.add_target(package),
            None => bail!("{} is not installed", name),
        }
    }

    if let Err(e) = tx.expand() {
        explain_resolution_failure(&e, &remote);
        return Err(e.into());
    }

    println!("The following packages will be removed:");
    for package in tx.removes() {
        println!("  {}", package);
    }
    if !confirm("Proceed?", yes)? {
        println!("Aborted.");
        return Ok(());
    }

    tx.prepare()?;
    tx.commit()?;
    println!("Removed {} package(s).", tx.removes().len());
    Ok(())
}

fn cmd_upgrade(config: &Config, names: &[String], yes: bool) -> Result<()> {
    config.ensure_dirs()?;
    let local = LocalRepo::open(&config.local_dir)?;
    let remote = RemoteRepo::open(&config.repo_dir)?;
    let downloader = HttpDownloader::new(DirMap::open(&config.cache_dir)?)?;
    let mut source_cache = DirMap::open(&config.source_dir)?;

    let chooser: Box<dyn CandidateChooser> = if yes {
        Box::new(FirstCandidate)
    } else {
        Box::new(PromptChooser)
    };

    let mut tx = UpgradeTransaction::new(
        &local,
        &remote,
        &downloader,
        &ArchiveExtractor,
        &DeclaredFiles,
        chooser.as_ref(),
        &mut source_cache,
        &config.install_dir,
    );

    for name in names {
        match local.find_literal(&Query::exact_name(name))? {
            Some(package) => tx.add_target(package),
            None => bail!("{} is not installed", name),
        }
    }

    if let Err(e) = tx.expand() {
        explain_resolution_failure(&e, &remote);
        return Err(e.into());
    }

    if tx.installs().is_empty() {
        println!("Everything is up to date.");
        return Ok(());
    }

    println!("The following upgrades will be applied:");
    for newer in tx.installs() {
        match tx.removes().iter().find(|old| old.name == newer.name) {
            Some(old) => println!("  {} -> {}", old, newer.version),
            None => println!("  {} (new dependency)", newer),
        }
    }
    if !confirm("Proceed?", yes)? {
        println!("Aborted.");
        return Ok(());
    }

    tx.prepare()?;
    tx.commit()?;
    println!("Upgraded {} package(s).", tx.installs().len());
    Ok(())
}

fn cmd_search(config: &Config, terms: &[String]) -> Result<()> {
    let remote = RemoteRepo::open(&config.repo_dir)?;
    let local = LocalRepo::open(&config.local_dir)?;

    let results = remote.search(&terms.join(" "))?;
    if results.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for package in results {
        let installed = local
            .find_literal(&Query::exact_name(&package.name))?
            .is_some();
        let marker = if installed { " [installed]" } else { "" };
        println!("{}{}", package, marker);
        if !package.description.is_empty() {
            println!("    {}", package.description);
        }
    }
    Ok(())
}

fn cmd_list(config: &Config) -> Result<()> {
    let local = LocalRepo::open(&config.local_dir)?;
    for package in local.packages()? {
        let reason = match package.reason() {
            Some(InstallReason::Dependency) => " (dependency)",
            _ => "",
        };
        println!("{}{}", package, reason);
    }
    Ok(())
}

fn cmd_info(config: &Config, name: &str) -> Result<()> {
    let local = LocalRepo::open(&config.local_dir)?;
    let remote = RemoteRepo::open(&config.repo_dir)?;

    let query = Query::exact_name(name);
    let package = match local.find_literal(&query)? {
        Some(package) => package,
        None => match remote.find_literal(&query)? {
            Some(package) => package,
            None => bail!("no package named {}", name),
        },
    };

    println!("Name:        {}", package.name);
    println!("Version:     {}", package.version);
    if !package.description.is_empty() {
        println!("Description: {}", package.description);
    }
    if let Some(local_state) = &package.local {
        println!("Installed:   {}", local_state.install_date.format("%Y-%m-%d %H:%M"));
        println!("Reason:      {:?}", local_state.reason);
    }
    if !package.dependencies.is_empty() {
        println!("Depends:     {}", package.dependencies.join(", "));
    }
    if !package.optdepends.is_empty() {
        println!("Optional:");
        for (dep, note) in &package.optdepends {
            println!("  {}: {}", dep, note);
        }
    }
    if !package.provides.is_empty() {
        println!("Provides:    {}", package.provides.join(", "));
    }
    if !package.conflicts.is_empty() {
        println!("Conflicts:   {}", package.conflicts.join(", "));
    }
    Ok(())
}

fn cmd_cache(config: &Config, action: &CacheAction) -> Result<()> {
    let mut downloads = DirMap::open(&config.cache_dir)?;
    let mut sources = DirMap::open(&config.source_dir)?;

    match action {
        CacheAction::Clear => {
            downloads.clear()?;
            sources.clear()?;
            println!("Caches cleared.");
        }
        CacheAction::Size => {
            println!("Downloads: {}", human_bytes(downloads.disk_usage()?));
            println!("Sources:   {}", human_bytes(sources.disk_usage()?));
        }
    }
    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    info!("using install root {}", config.install_dir.display());

    match &cli.command {
        Commands::Install { queries, upgrade, yes } => {
            if *upgrade {
                cmd_upgrade(&config, queries, *yes)
            } else {
                cmd_install(&config, queries, *yes)
            }
        }
        Commands::Remove { names, no_deps, yes } => cmd_remove(&config, names, *no_deps, *yes),
        Commands::Upgrade { names, yes } => cmd_upgrade(&config, names, *yes),
        Commands::Search { terms } => cmd_search(&config, terms),
        Commands::List => cmd_list(&config),
        Commands::Info { name } => cmd_info(&config, name),
        Commands::Cache { action } => cmd_cache(&config, action),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "modkeep", &mut io::stdout());
            Ok(())
        }
    }
}
